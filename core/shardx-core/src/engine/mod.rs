//! Sharding Engine Module

pub mod execution;
pub mod parallel;
pub mod sharding_engine;

#[cfg(test)]
mod sharding_engine_tests;

pub use execution::{ConnectionMode, ExecutionGroup, ExecutionUnit, group_execution_units};
pub use parallel::{ParallelExecutor, StatementExecutor};
pub use sharding_engine::{ExecutionContext, ShardingEngine};
