//! Configuration — rule definitions and runtime properties.
//!
//! Both halves are plain serde data. [`RuleConfiguration`] is converted into
//! the typed, validated [`crate::rule::ShardingRule`] once at load time;
//! [`ConfigurationProperties`] is read by the router, rewriter and executor.

mod props;
mod rule;

pub use props::{ConfigurationProperties, DatabaseType};
pub use rule::{
    AlgorithmConfiguration, KeyGenerateStrategyConfiguration, RuleConfiguration,
    StrategyConfiguration, TableRuleConfiguration,
};
