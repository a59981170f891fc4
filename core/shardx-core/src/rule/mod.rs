//! Sharding rule — the immutable, validated model every pipeline stage reads.
//!
//! [`ShardingRule::new`] is the only place configuration is interpreted.
//! Everything that can be wrong with a configuration (unknown algorithm
//! types, dangling names, malformed inline expressions, misaligned binding
//! tables) is reported there, never during routing.

pub mod algorithm;
pub mod catalog;
pub mod inline;
pub mod strategy;
pub mod table_rule;

pub use algorithm::{RangeValue, ShardingAlgorithm};
pub use catalog::SchemaCatalog;
pub use strategy::ShardingStrategy;
pub use table_rule::{DataNode, KeyGenerateStrategy, TableRule};

use crate::config::{KeyGenerateStrategyConfiguration, RuleConfiguration, StrategyConfiguration};
use crate::error::{ShardxError, ShardxResult};
use crate::keygen::KeyGenerator;
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_source_names: Vec<String>,
    table_rules: Vec<TableRule>,
    // lower-cased logic table → index into table_rules
    table_index: AHashMap<String, usize>,
    binding_groups: Vec<Vec<String>>,
    binding_index: AHashMap<String, usize>,
    broadcast_tables: AHashSet<String>,
}

impl ShardingRule {
    pub fn new(config: &RuleConfiguration) -> ShardxResult<Self> {
        if config.data_sources.is_empty() {
            return Err(ShardxError::config("at least one data source is required"));
        }
        let mut data_source_names: Vec<String> = Vec::new();
        for ds in &config.data_sources {
            let ds = ds.trim();
            if ds.is_empty() || data_source_names.iter().any(|d| d == ds) {
                return Err(ShardxError::config(format!(
                    "data source name '{ds}' is empty or duplicated"
                )));
            }
            data_source_names.push(ds.to_string());
        }

        let algorithms = config
            .sharding_algorithms
            .iter()
            .map(|(name, c)| Ok((name.clone(), ShardingAlgorithm::from_config(name, c)?)))
            .collect::<ShardxResult<BTreeMap<_, _>>>()?;
        let generators = config
            .key_generators
            .iter()
            .map(|(name, c)| Ok((name.clone(), Arc::new(KeyGenerator::from_config(name, c)?))))
            .collect::<ShardxResult<BTreeMap<_, _>>>()?;

        let resolve = |strategy: &Option<StrategyConfiguration>| -> ShardxResult<Option<ShardingStrategy>> {
            strategy
                .as_ref()
                .map(|s| ShardingStrategy::from_config(s, &algorithms))
                .transpose()
        };
        let default_database = resolve(&config.default_database_strategy)?;
        let default_table = resolve(&config.default_table_strategy)?;
        let resolve_key = |key: &KeyGenerateStrategyConfiguration| -> ShardxResult<KeyGenerateStrategy> {
            let generator = generators.get(&key.generator).ok_or_else(|| {
                ShardxError::config(format!("key generator '{}' is not defined", key.generator))
            })?;
            if key.column.trim().is_empty() {
                return Err(ShardxError::config("key generate column must not be empty"));
            }
            Ok(KeyGenerateStrategy {
                column: key.column.trim().to_string(),
                generator: Arc::clone(generator),
            })
        };
        let default_key = config
            .default_key_generate_strategy
            .as_ref()
            .map(&resolve_key)
            .transpose()?;

        let mut table_rules = Vec::with_capacity(config.tables.len());
        let mut table_index = AHashMap::new();
        for table in &config.tables {
            let logic = table.logic_table.trim();
            if logic.is_empty() {
                return Err(ShardxError::config("logic table name must not be empty"));
            }
            let key = logic.to_ascii_lowercase();
            if table_index.contains_key(&key) {
                return Err(ShardxError::config(format!(
                    "table '{logic}' is configured twice"
                )));
            }
            let nodes = match &table.actual_data_nodes {
                Some(expression) => inline::expand(expression)?
                    .iter()
                    .map(|n| DataNode::parse(n))
                    .collect::<ShardxResult<Vec<_>>>()?,
                None => data_source_names
                    .iter()
                    .map(|ds| DataNode::new(ds, logic))
                    .collect(),
            };
            if let Some(node) = nodes
                .iter()
                .find(|n| !data_source_names.contains(&n.data_source))
            {
                return Err(ShardxError::config(format!(
                    "data node '{node}' of table '{logic}' refers to an undeclared data source"
                )));
            }
            let database_strategy = match resolve(&table.database_strategy)? {
                Some(s) => s,
                None => default_database.clone().unwrap_or(ShardingStrategy::None),
            };
            let table_strategy = match resolve(&table.table_strategy)? {
                Some(s) => s,
                None => default_table.clone().unwrap_or(ShardingStrategy::None),
            };
            let mut rule = TableRule::new(logic, nodes, database_strategy, table_strategy)?;
            let key_strategy = match &table.key_generate_strategy {
                Some(k) => Some(resolve_key(k)?),
                None => default_key.clone(),
            };
            if let Some(k) = key_strategy {
                rule = rule.with_key_generate_strategy(k);
            }
            table_index.insert(key, table_rules.len());
            table_rules.push(rule);
        }

        let mut broadcast_tables = AHashSet::new();
        for name in &config.broadcast_tables {
            let key = name.trim().to_ascii_lowercase();
            if table_index.contains_key(&key) {
                return Err(ShardxError::config(format!(
                    "table '{name}' cannot be both sharded and broadcast"
                )));
            }
            broadcast_tables.insert(key);
        }

        let mut binding_groups = Vec::new();
        let mut binding_index = AHashMap::new();
        for group in &config.binding_tables {
            let members: Vec<String> = group
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if members.len() < 2 {
                return Err(ShardxError::config(format!(
                    "binding group '{group}' needs at least two tables"
                )));
            }
            for member in &members {
                if !table_index.contains_key(member) {
                    return Err(ShardxError::config(format!(
                        "binding table '{member}' has no table rule"
                    )));
                }
                if binding_index.insert(member.clone(), binding_groups.len()).is_some() {
                    return Err(ShardxError::config(format!(
                        "table '{member}' belongs to more than one binding group"
                    )));
                }
            }
            let primary = &table_rules[table_index[&members[0]]];
            for member in &members[1..] {
                check_binding_alignment(primary, &table_rules[table_index[member]])?;
            }
            binding_groups.push(members);
        }

        debug!(
            data_sources = data_source_names.len(),
            tables = table_rules.len(),
            binding_groups = binding_groups.len(),
            broadcast_tables = broadcast_tables.len(),
            "sharding rule loaded"
        );
        Ok(Self {
            data_source_names,
            table_rules,
            table_index,
            binding_groups,
            binding_index,
            broadcast_tables,
        })
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn table_rules(&self) -> &[TableRule] {
        &self.table_rules
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_index
            .get(&logic_table.to_ascii_lowercase())
            .map(|i| &self.table_rules[*i])
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .contains(&logic_table.to_ascii_lowercase())
    }

    pub fn binding_group_of(&self, logic_table: &str) -> Option<usize> {
        self.binding_index
            .get(&logic_table.to_ascii_lowercase())
            .copied()
    }

    pub fn binding_groups(&self) -> &[Vec<String>] {
        &self.binding_groups
    }

    /// Whether both tables belong to the same binding group.
    pub fn is_binding_pair(&self, left: &str, right: &str) -> bool {
        matches!(
            (self.binding_group_of(left), self.binding_group_of(right)),
            (Some(a), Some(b)) if a == b
        )
    }

    pub fn find_key_generate_strategy(&self, logic_table: &str) -> Option<&KeyGenerateStrategy> {
        self.find_table_rule(logic_table)
            .and_then(TableRule::key_generate_strategy)
    }
}

fn check_binding_alignment(primary: &TableRule, member: &TableRule) -> ShardxResult<()> {
    let left = primary.actual_data_nodes();
    let right = member.actual_data_nodes();
    let mismatch = |reason: String| ShardxError::BindingTableMismatch {
        left: primary.logic_table().to_string(),
        right: member.logic_table().to_string(),
        reason,
    };
    if left.len() != right.len() {
        return Err(mismatch(format!(
            "{} vs {} data nodes",
            left.len(),
            right.len()
        )));
    }
    for (ordinal, (l, r)) in left.iter().zip(right).enumerate() {
        if l.data_source != r.data_source {
            return Err(mismatch(format!(
                "ordinal {ordinal} maps to '{}' and '{}'",
                l.data_source, r.data_source
            )));
        }
    }
    Ok(())
}
