//! Aggregation accumulators for grouped merges.
//!
//! Each shard returns partial aggregates; combining them is per function:
//! SUM and COUNT add up, MIN/MAX keep the extreme, AVG is rebuilt from the
//! derived SUM/COUNT pair (`sum / count`, NULL when the count is zero).

use crate::error::{ShardxError, ShardxResult};
use crate::sql::context::AggregationColumn;
use crate::sql::statement::AggregationType;
use crate::value::ScalarValue;
use std::cmp::Ordering;

/// NULL-skipping addition; integers stay integral until they overflow.
fn add(left: Option<ScalarValue>, right: &ScalarValue) -> ShardxResult<Option<ScalarValue>> {
    if right.is_null() {
        return Ok(left);
    }
    let Some(left) = left else {
        return Ok(Some(right.clone()));
    };
    if let (ScalarValue::Int64(a), ScalarValue::Int64(b)) = (&left, right)
        && let Some(sum) = a.checked_add(*b)
    {
        return Ok(Some(ScalarValue::Int64(sum)));
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Some(ScalarValue::Float64(a + b))),
        _ => Err(ShardxError::MergeState(format!(
            "cannot add non-numeric aggregate values {left} and {right}"
        ))),
    }
}

fn extreme(current: Option<ScalarValue>, value: &ScalarValue, keep: Ordering) -> Option<ScalarValue> {
    if value.is_null() {
        return current;
    }
    match current {
        Some(c) if c.compare(value) != keep.reverse() => Some(c),
        _ => Some(value.clone()),
    }
}

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Option<ScalarValue>),
    Count(Option<ScalarValue>),
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    Avg {
        count: Option<ScalarValue>,
        sum: Option<ScalarValue>,
    },
}

/// One aggregation column of one group.
#[derive(Debug, Clone)]
pub struct AggregationUnit {
    column: AggregationColumn,
    accumulator: Accumulator,
}

impl AggregationUnit {
    pub fn new(column: AggregationColumn) -> Self {
        let accumulator = match column.kind {
            AggregationType::Sum => Accumulator::Sum(None),
            AggregationType::Count => Accumulator::Count(None),
            AggregationType::Min => Accumulator::Min(None),
            AggregationType::Max => Accumulator::Max(None),
            AggregationType::Avg => Accumulator::Avg {
                count: None,
                sum: None,
            },
        };
        Self { column, accumulator }
    }

    pub fn accumulate(&mut self, row: &[ScalarValue]) -> ShardxResult<()> {
        let read = |index: usize| {
            row.get(index).ok_or(ShardxError::ColumnIndexOutOfRange {
                index,
                count: row.len(),
            })
        };
        self.accumulator = match std::mem::replace(&mut self.accumulator, Accumulator::Sum(None)) {
            Accumulator::Sum(total) => Accumulator::Sum(add(total, read(self.column.index)?)?),
            Accumulator::Count(total) => Accumulator::Count(add(total, read(self.column.index)?)?),
            Accumulator::Min(current) => {
                Accumulator::Min(extreme(current, read(self.column.index)?, Ordering::Less))
            }
            Accumulator::Max(current) => {
                Accumulator::Max(extreme(current, read(self.column.index)?, Ordering::Greater))
            }
            Accumulator::Avg { count, sum } => {
                let (count_index, sum_index) = self.column.avg_derived.ok_or_else(|| {
                    ShardxError::MergeState("AVG without derived COUNT/SUM columns".to_string())
                })?;
                Accumulator::Avg {
                    count: add(count, read(count_index)?)?,
                    sum: add(sum, read(sum_index)?)?,
                }
            }
        };
        Ok(())
    }

    /// Combined value of this aggregation.
    pub fn result(&self) -> ScalarValue {
        match &self.accumulator {
            Accumulator::Count(total) => total.clone().unwrap_or(ScalarValue::Int64(0)),
            Accumulator::Sum(value) | Accumulator::Min(value) | Accumulator::Max(value) => {
                value.clone().unwrap_or(ScalarValue::Null)
            }
            Accumulator::Avg { count, sum } => {
                match (
                    count.as_ref().and_then(ScalarValue::as_f64),
                    sum.as_ref().and_then(ScalarValue::as_f64),
                ) {
                    (Some(count), Some(sum)) if count != 0.0 => ScalarValue::Float64(sum / count),
                    _ => ScalarValue::Null,
                }
            }
        }
    }

    /// Write the combined value, and for AVG the combined derived pair, into `row`.
    pub fn write_into(&self, row: &mut [ScalarValue]) {
        if let Some(slot) = row.get_mut(self.column.index) {
            *slot = self.result();
        }
        if let (Accumulator::Avg { count, sum }, Some((count_index, sum_index))) =
            (&self.accumulator, self.column.avg_derived)
        {
            if let Some(slot) = row.get_mut(count_index) {
                *slot = count.clone().unwrap_or(ScalarValue::Int64(0));
            }
            if let Some(slot) = row.get_mut(sum_index) {
                *slot = sum.clone().unwrap_or(ScalarValue::Null);
            }
        }
    }
}

/// Fresh accumulators for every aggregation column.
pub fn new_units(columns: &[AggregationColumn]) -> Vec<AggregationUnit> {
    columns.iter().copied().map(AggregationUnit::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(kind: AggregationType, index: usize, avg_derived: Option<(usize, usize)>) -> AggregationUnit {
        AggregationUnit::new(AggregationColumn {
            kind,
            index,
            avg_derived,
        })
    }

    #[test]
    fn test_avg_from_derived_pair() {
        // AVG, COUNT, SUM
        let mut avg = unit(AggregationType::Avg, 0, Some((1, 2)));
        avg.accumulate(&[ScalarValue::Float64(5.0), ScalarValue::Int64(2), ScalarValue::Int64(10)])
            .unwrap();
        avg.accumulate(&[ScalarValue::Float64(6.67), ScalarValue::Int64(3), ScalarValue::Int64(20)])
            .unwrap();
        assert_eq!(avg.result(), ScalarValue::Float64(6.0));
        let mut row = vec![ScalarValue::Null, ScalarValue::Null, ScalarValue::Null];
        avg.write_into(&mut row);
        assert_eq!(
            row,
            vec![ScalarValue::Float64(6.0), ScalarValue::Int64(5), ScalarValue::Int64(30)]
        );
    }

    #[test]
    fn test_avg_with_zero_count_is_null() {
        let mut avg = unit(AggregationType::Avg, 0, Some((1, 2)));
        avg.accumulate(&[ScalarValue::Null, ScalarValue::Int64(0), ScalarValue::Null])
            .unwrap();
        assert_eq!(avg.result(), ScalarValue::Null);
    }

    #[test]
    fn test_sum_count_min_max() {
        let rows = [
            vec![ScalarValue::Int64(4), ScalarValue::Int64(1)],
            vec![ScalarValue::Null, ScalarValue::Int64(9)],
            vec![ScalarValue::Float64(1.5), ScalarValue::Int64(-2)],
        ];
        let mut sum = unit(AggregationType::Sum, 0, None);
        let mut count = unit(AggregationType::Count, 1, None);
        let mut min = unit(AggregationType::Min, 1, None);
        let mut max = unit(AggregationType::Max, 1, None);
        for row in &rows {
            for u in [&mut sum, &mut count, &mut min, &mut max] {
                u.accumulate(row).unwrap();
            }
        }
        assert_eq!(sum.result(), ScalarValue::Float64(5.5));
        assert_eq!(count.result(), ScalarValue::Int64(8));
        assert_eq!(min.result(), ScalarValue::Int64(-2));
        assert_eq!(max.result(), ScalarValue::Int64(9));
    }

    #[test]
    fn test_empty_group_defaults() {
        assert_eq!(unit(AggregationType::Count, 0, None).result(), ScalarValue::Int64(0));
        assert_eq!(unit(AggregationType::Max, 0, None).result(), ScalarValue::Null);
    }

    #[test]
    fn test_non_numeric_sum_fails() {
        let mut sum = unit(AggregationType::Sum, 0, None);
        sum.accumulate(&[ScalarValue::from("a")]).unwrap();
        assert!(sum.accumulate(&[ScalarValue::from("b")]).is_err());
    }
}
