//! Execution units and connection grouping.
//!
//! The rewrite engine emits one [`ExecutionUnit`] per route unit. Before the
//! external executor runs them, units are grouped per data source and split
//! over at most `max_connections_size_per_query` connections:
//!
//! - enough connections for one unit each → [`ConnectionMode::MemoryStrictly`]
//!   (every unit streams on its own connection);
//! - fewer connections than units → [`ConnectionMode::ConnectionStrictly`]
//!   (units share a connection and run one after another).

use crate::value::ScalarValue;

/// Rewritten SQL for one data source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub data_source_name: String,
    pub sql: String,
    pub parameters: Vec<ScalarValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    MemoryStrictly,
    ConnectionStrictly,
}

/// Units of one data source, split into connection groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionGroup {
    pub data_source_name: String,
    pub connection_mode: ConnectionMode,
    /// One entry per connection, each running its units in order
    pub connections: Vec<Vec<ExecutionUnit>>,
}

impl ExecutionGroup {
    pub fn unit_count(&self) -> usize {
        self.connections.iter().map(Vec::len).sum()
    }
}

/// Index-based grouping shared by [`group_execution_units`] and the executor.
pub(crate) struct IndexGroup {
    pub data_source_name: String,
    pub connection_mode: ConnectionMode,
    pub connections: Vec<Vec<usize>>,
}

pub(crate) fn group_indexes(units: &[ExecutionUnit], max_connections: usize) -> Vec<IndexGroup> {
    let max_connections = max_connections.max(1);
    let mut by_source: Vec<(String, Vec<usize>)> = Vec::new();
    for (index, unit) in units.iter().enumerate() {
        match by_source
            .iter_mut()
            .find(|(ds, _)| *ds == unit.data_source_name)
        {
            Some((_, indexes)) => indexes.push(index),
            None => by_source.push((unit.data_source_name.clone(), vec![index])),
        }
    }
    by_source
        .into_iter()
        .map(|(data_source_name, indexes)| {
            let connection_mode = if max_connections < indexes.len() {
                ConnectionMode::ConnectionStrictly
            } else {
                ConnectionMode::MemoryStrictly
            };
            let per_connection = indexes.len().div_ceil(max_connections);
            IndexGroup {
                data_source_name,
                connection_mode,
                connections: indexes.chunks(per_connection).map(<[usize]>::to_vec).collect(),
            }
        })
        .collect()
}

/// Group units by data source, in first-appearance order.
pub fn group_execution_units(units: Vec<ExecutionUnit>, max_connections: usize) -> Vec<ExecutionGroup> {
    let groups = group_indexes(&units, max_connections);
    let mut slots: Vec<Option<ExecutionUnit>> = units.into_iter().map(Some).collect();
    groups
        .into_iter()
        .map(|group| ExecutionGroup {
            data_source_name: group.data_source_name,
            connection_mode: group.connection_mode,
            connections: group
                .connections
                .into_iter()
                .map(|connection| {
                    connection
                        .into_iter()
                        .filter_map(|index| slots.get_mut(index).and_then(Option::take))
                        .collect()
                })
                .collect(),
        })
        .collect()
}
