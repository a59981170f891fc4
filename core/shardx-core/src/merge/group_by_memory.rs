//! Grouped merge in memory.
//!
//! Used when shard rows do not arrive in group order (GROUP BY and ORDER BY
//! differ, or aggregation without GROUP BY). Every stream is drained into one
//! accumulator set per group, the streams are closed, and the combined rows
//! are sorted by the ORDER BY.

use crate::error::ShardxResult;
use crate::merge::MergedResult;
use crate::merge::aggregation::{AggregationUnit, new_units};
use crate::merge::compare::{compare_rows, group_key};
use crate::merge::stream::ShardStreams;
use crate::sql::context::{AggregationColumn, OrderByColumn};
use crate::value::{Row, ScalarValue};
use ahash::AHashMap;
use std::collections::VecDeque;
use tracing::debug;

struct GroupState {
    template: Row,
    units: Vec<AggregationUnit>,
}

pub struct GroupByMemoryMergedResult {
    rows: VecDeque<Row>,
    current: Option<Row>,
}

impl GroupByMemoryMergedResult {
    /// `column_count` is the width of a shard row; it shapes the single row
    /// an aggregation without GROUP BY returns when every shard is empty.
    pub fn new(
        mut streams: ShardStreams,
        group_by: &[OrderByColumn],
        order_by: &[OrderByColumn],
        aggregations: &[AggregationColumn],
        column_count: usize,
    ) -> ShardxResult<Self> {
        let mut positions: AHashMap<Vec<u8>, usize> = AHashMap::new();
        let mut groups: Vec<GroupState> = Vec::new();
        for stream in 0..streams.len() {
            while let Some(row) = streams.next_row(stream)? {
                let key = group_key(&row, group_by);
                let position = match positions.get(&key) {
                    Some(position) => *position,
                    None => {
                        positions.insert(key, groups.len());
                        groups.push(GroupState {
                            template: row.clone(),
                            units: new_units(aggregations),
                        });
                        groups.len() - 1
                    }
                };
                for unit in &mut groups[position].units {
                    unit.accumulate(&row)?;
                }
            }
        }
        streams.close_all();

        if groups.is_empty() && group_by.is_empty() && !aggregations.is_empty() {
            groups.push(GroupState {
                template: vec![ScalarValue::Null; column_count],
                units: new_units(aggregations),
            });
        }
        debug!(groups = groups.len(), "grouped in memory");

        let mut rows: Vec<Row> = groups
            .into_iter()
            .map(|group| {
                let mut row = group.template;
                for unit in &group.units {
                    unit.write_into(&mut row);
                }
                row
            })
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, order_by));
        Ok(Self {
            rows: rows.into(),
            current: None,
        })
    }
}

impl MergedResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> ShardxResult<bool> {
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.rows.clear();
        self.current = None;
    }
}
