//! Rule configuration — serde model of the sharding rule.
//!
//! ```json
//! {
//!   "data_sources": ["ds_0", "ds_1"],
//!   "tables": [{
//!     "logic_table": "t_order",
//!     "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
//!     "table_strategy": { "type": "standard", "sharding_column": "order_id", "algorithm": "order_mod" },
//!     "key_generate_strategy": { "column": "order_id", "generator": "snowflake" }
//!   }],
//!   "binding_tables": ["t_order, t_order_item"],
//!   "default_database_strategy": { "type": "inline", "sharding_column": "user_id",
//!                                  "algorithm_expression": "ds_${user_id % 2}" },
//!   "sharding_algorithms": { "order_mod": { "type": "MOD", "props": { "sharding-count": "2" } } },
//!   "key_generators": { "snowflake": { "type": "SNOWFLAKE" } }
//! }
//! ```

use crate::error::ShardxResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 샤딩 룰 설정 (루트)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfiguration {
    /// Every data source the rule may route to, in routing order
    pub data_sources: Vec<String>,
    pub tables: Vec<TableRuleConfiguration>,
    /// Each entry is a comma-separated group of logical table names
    pub binding_tables: Vec<String>,
    pub broadcast_tables: Vec<String>,
    pub default_database_strategy: Option<StrategyConfiguration>,
    pub default_table_strategy: Option<StrategyConfiguration>,
    pub default_key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,
    /// Named sharding algorithms referenced by strategies
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfiguration>,
    /// Named key generators referenced by key generate strategies
    pub key_generators: BTreeMap<String, AlgorithmConfiguration>,
}

impl RuleConfiguration {
    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> ShardxResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ShardxResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> ShardxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 테이블 룰 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRuleConfiguration {
    pub logic_table: String,
    /// Inline expression such as `ds_${0..1}.t_order_${0..3}`; when absent the
    /// table is assumed to exist unsharded in every data source.
    pub actual_data_nodes: Option<String>,
    pub database_strategy: Option<StrategyConfiguration>,
    pub table_strategy: Option<StrategyConfiguration>,
    pub key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,
}

/// 샤딩 전략 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfiguration {
    /// Single sharding column, named algorithm
    Standard {
        sharding_column: String,
        algorithm: String,
    },
    /// Several sharding columns (comma-separated), named complex algorithm
    Complex {
        sharding_columns: String,
        algorithm: String,
    },
    /// Values supplied out-of-band, named hint algorithm
    Hint { algorithm: String },
    /// Expression template over a single column
    Inline {
        sharding_column: String,
        algorithm_expression: String,
    },
    /// No sharding: every candidate
    None,
}

/// 키 생성 전략 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerateStrategyConfiguration {
    pub column: String,
    pub generator: String,
}

/// 알고리즘 설정 (type + props)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfiguration {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
}

impl AlgorithmConfiguration {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            props: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_prop(mut self, key: &str, value: &str) -> Self {
        self.props.insert(key.to_string(), value.to_string());
        self
    }
}
