//! Result merge — N shard row streams in, one logical cursor out.
//!
//! # 병합 전략
//!
//! | 문장 형태 | 전략 |
//! |---|---|
//! | 단일 유닛 / ORDER BY·GROUP BY 없음 | [`TransparentMergedResult`] |
//! | ORDER BY 만 | [`OrderByStreamMergedResult`] (k-way 스트리밍) |
//! | GROUP BY = ORDER BY | [`GroupByStreamMergedResult`] |
//! | 그 외 GROUP BY / 집계 | [`GroupByMemoryMergedResult`] |
//! | LIMIT / OFFSET | [`LimitDecoratorMergedResult`] 로 감싸기 |
//!
//! The outermost result hides derived columns: [`MergedResult::get`] only
//! reaches the columns the client selected.

pub mod aggregation;
pub mod compare;
pub mod group_by;
pub mod group_by_memory;
pub mod limit;
pub mod order_by;
pub mod stream;
pub mod transparent;


pub use group_by::GroupByStreamMergedResult;
pub use group_by_memory::GroupByMemoryMergedResult;
pub use limit::LimitDecoratorMergedResult;
pub use order_by::OrderByStreamMergedResult;
pub use stream::{MemoryRowStream, RowStream, ShardStreams};
pub use transparent::TransparentMergedResult;

use crate::error::{ShardxError, ShardxResult};
use crate::sql::context::SelectStatementContext;
use crate::sql::statement::StatementKind;
use crate::value::{Row, ScalarValue};
use tracing::debug;

/// Cursor over the merged rows.
pub trait MergedResult: Send {
    /// Advance to the next row; `false` at the end.
    fn next(&mut self) -> ShardxResult<bool>;

    /// Row the cursor is on, including derived columns.
    fn current_row(&self) -> Option<&Row>;

    /// Close every still-open shard stream. Further `next` calls return `false`.
    fn close(&mut self);

    /// Value of column `index` (0-based) of the current row.
    fn get(&self, index: usize) -> ShardxResult<&ScalarValue> {
        let row = self
            .current_row()
            .ok_or_else(|| ShardxError::MergeState("cursor is not on a row".to_string()))?;
        row.get(index).ok_or(ShardxError::ColumnIndexOutOfRange {
            index,
            count: row.len(),
        })
    }
}

/// Limits column access to the client-visible columns.
struct VisibleColumnsMergedResult {
    inner: Box<dyn MergedResult>,
    visible: usize,
}

impl MergedResult for VisibleColumnsMergedResult {
    fn next(&mut self) -> ShardxResult<bool> {
        self.inner.next()
    }

    fn current_row(&self) -> Option<&Row> {
        self.inner.current_row()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn get(&self, index: usize) -> ShardxResult<&ScalarValue> {
        if index >= self.visible {
            return Err(ShardxError::ColumnIndexOutOfRange {
                index,
                count: self.visible,
            });
        }
        self.inner.get(index)
    }
}

/// Picks the merge strategy from the statement shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// `select_context` is `None` for single-unit routes and non-SELECT
    /// statements; those streams are passed through unchanged.
    pub fn merge(
        &self,
        kind: StatementKind,
        select_context: Option<&SelectStatementContext>,
        streams: Vec<Box<dyn RowStream>>,
    ) -> ShardxResult<Box<dyn MergedResult>> {
        let streams = ShardStreams::new(streams);
        let context = match select_context {
            Some(context) if kind == StatementKind::Select => context,
            _ => {
                debug!(streams = streams.len(), "merge: transparent");
                return Ok(Box::new(TransparentMergedResult::new(streams)));
            }
        };

        let merged: Box<dyn MergedResult> = if context.has_group_by_or_aggregation() {
            if context.is_same_group_by_and_order_by() {
                debug!(streams = streams.len(), "merge: group by (stream)");
                Box::new(GroupByStreamMergedResult::new(
                    streams,
                    context.order_by(),
                    context.group_by(),
                    context.aggregations(),
                )?)
            } else {
                debug!(streams = streams.len(), "merge: group by (memory)");
                let width = context.visible_column_count() + context.derived_projections().len();
                Box::new(GroupByMemoryMergedResult::new(
                    streams,
                    context.group_by(),
                    context.order_by(),
                    context.aggregations(),
                    width,
                )?)
            }
        } else if !context.order_by().is_empty() {
            debug!(streams = streams.len(), "merge: order by");
            Box::new(OrderByStreamMergedResult::new(streams, context.order_by())?)
        } else {
            debug!(streams = streams.len(), "merge: transparent");
            Box::new(TransparentMergedResult::new(streams))
        };

        let merged = match context.pagination() {
            Some(pagination) => {
                Box::new(LimitDecoratorMergedResult::new(merged, *pagination)) as Box<dyn MergedResult>
            }
            None => merged,
        };
        Ok(Box::new(VisibleColumnsMergedResult {
            inner: merged,
            visible: context.visible_column_count(),
        }))
    }
}
