//! Table rule — one logical table and its physical data nodes.

use crate::error::{ShardxError, ShardxResult};
use crate::keygen::KeyGenerator;
use crate::rule::strategy::ShardingStrategy;
use std::fmt;
use std::sync::Arc;

/// One physical `(data source, actual table)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: &str, table: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            table: table.to_string(),
        }
    }

    /// Parse `ds_0.t_order_0`.
    pub fn parse(text: &str) -> ShardxResult<Self> {
        match text.trim().split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(ds, table))
            }
            _ => Err(ShardxError::config(format!(
                "invalid data node '{text}', expected '<data_source>.<table>'"
            ))),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// Key column plus the shared generator that fills it.
#[derive(Debug, Clone)]
pub struct KeyGenerateStrategy {
    pub column: String,
    pub generator: Arc<KeyGenerator>,
}

/// Logical table → data nodes, with the strategies used to pick among them.
#[derive(Debug, Clone)]
pub struct TableRule {
    logic_table: String,
    actual_data_nodes: Vec<DataNode>,
    data_source_names: Vec<String>,
    database_strategy: ShardingStrategy,
    table_strategy: ShardingStrategy,
    key_generate_strategy: Option<KeyGenerateStrategy>,
}

impl TableRule {
    pub fn new(
        logic_table: &str,
        actual_data_nodes: Vec<DataNode>,
        database_strategy: ShardingStrategy,
        table_strategy: ShardingStrategy,
    ) -> ShardxResult<Self> {
        if actual_data_nodes.is_empty() {
            return Err(ShardxError::config(format!(
                "table '{logic_table}' has no actual data nodes"
            )));
        }
        let mut data_source_names: Vec<String> = Vec::new();
        for (i, node) in actual_data_nodes.iter().enumerate() {
            if actual_data_nodes[..i].contains(node) {
                return Err(ShardxError::config(format!(
                    "table '{logic_table}' lists data node '{node}' twice"
                )));
            }
            if !data_source_names.contains(&node.data_source) {
                data_source_names.push(node.data_source.clone());
            }
        }
        Ok(Self {
            logic_table: logic_table.to_string(),
            actual_data_nodes,
            data_source_names,
            database_strategy,
            table_strategy,
            key_generate_strategy: None,
        })
    }

    pub fn with_key_generate_strategy(mut self, strategy: KeyGenerateStrategy) -> Self {
        self.key_generate_strategy = Some(strategy);
        self
    }

    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn actual_data_nodes(&self) -> &[DataNode] {
        &self.actual_data_nodes
    }

    /// Data sources in first-occurrence order.
    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    /// Actual tables that live in `data_source`, in node order.
    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .map(|n| n.table.clone())
            .collect()
    }

    /// Position of `node` in the data node list (binding tables share ordinals).
    pub fn ordinal_of(&self, node: &DataNode) -> Option<usize> {
        self.actual_data_nodes.iter().position(|n| n == node)
    }

    pub fn node_at(&self, ordinal: usize) -> Option<&DataNode> {
        self.actual_data_nodes.get(ordinal)
    }

    pub fn database_strategy(&self) -> &ShardingStrategy {
        &self.database_strategy
    }

    pub fn table_strategy(&self) -> &ShardingStrategy {
        &self.table_strategy
    }

    pub fn key_generate_strategy(&self) -> Option<&KeyGenerateStrategy> {
        self.key_generate_strategy.as_ref()
    }

    /// Whether `column` feeds either strategy.
    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.database_strategy
            .sharding_columns()
            .into_iter()
            .chain(self.table_strategy.sharding_columns())
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}
