//! Grouped merge over streams already sorted by the group key.
//!
//! Rows are pulled through the ordered k-way merge; consecutive rows with the
//! same key form one group. Only the first row of the next group is held back.

use crate::error::ShardxResult;
use crate::merge::MergedResult;
use crate::merge::aggregation::new_units;
use crate::merge::compare::same_group;
use crate::merge::order_by::OrderedMerger;
use crate::merge::stream::ShardStreams;
use crate::sql::context::{AggregationColumn, OrderByColumn};
use crate::value::Row;

pub struct GroupByStreamMergedResult {
    merger: OrderedMerger,
    group_by: Vec<OrderByColumn>,
    aggregations: Vec<AggregationColumn>,
    pending: Option<Row>,
    current: Option<Row>,
}

impl GroupByStreamMergedResult {
    pub fn new(
        streams: ShardStreams,
        order_by: &[OrderByColumn],
        group_by: &[OrderByColumn],
        aggregations: &[AggregationColumn],
    ) -> ShardxResult<Self> {
        let mut merger = OrderedMerger::new(streams, order_by)?;
        let pending = merger.next_row()?;
        Ok(Self {
            merger,
            group_by: group_by.to_vec(),
            aggregations: aggregations.to_vec(),
            pending,
            current: None,
        })
    }
}

impl MergedResult for GroupByStreamMergedResult {
    fn next(&mut self) -> ShardxResult<bool> {
        let Some(first) = self.pending.take() else {
            self.current = None;
            return Ok(false);
        };
        let mut units = new_units(&self.aggregations);
        for unit in &mut units {
            unit.accumulate(&first)?;
        }
        loop {
            match self.merger.next_row()? {
                Some(row) if same_group(&first, &row, &self.group_by) => {
                    for unit in &mut units {
                        unit.accumulate(&row)?;
                    }
                }
                next => {
                    self.pending = next;
                    break;
                }
            }
        }
        let mut merged = first;
        for unit in &units {
            unit.write_into(&mut merged);
        }
        self.current = Some(merged);
        Ok(true)
    }

    fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.pending = None;
        self.current = None;
        self.merger.close();
    }
}
