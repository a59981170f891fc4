//! Pagination decorator.

use crate::error::ShardxResult;
use crate::merge::MergedResult;
use crate::sql::context::Pagination;
use crate::value::Row;
use tracing::trace;

/// Skips `offset` merged rows, yields up to `row_count`, then closes the
/// wrapped result so no shard keeps fetching.
pub struct LimitDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    offset: u64,
    row_count: Option<u64>,
    skipped: bool,
    returned: u64,
    finished: bool,
}

impl LimitDecoratorMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, pagination: Pagination) -> Self {
        Self {
            inner,
            offset: pagination.offset,
            row_count: pagination.row_count,
            skipped: false,
            returned: 0,
            finished: false,
        }
    }

    /// Step the inner result; an error or the end finishes the window.
    fn advance(&mut self) -> ShardxResult<bool> {
        match self.inner.next() {
            Ok(true) => Ok(true),
            Ok(false) => Ok(self.finish()),
            Err(err) => {
                self.finish();
                Err(err)
            }
        }
    }

    fn finish(&mut self) -> bool {
        if !self.finished {
            self.finished = true;
            self.inner.close();
        }
        false
    }
}

impl MergedResult for LimitDecoratorMergedResult {
    fn next(&mut self) -> ShardxResult<bool> {
        if self.finished {
            return Ok(false);
        }
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.offset {
                if !self.advance()? {
                    return Ok(false);
                }
            }
            trace!(offset = self.offset, "pagination offset skipped");
        }
        if self.row_count.is_some_and(|limit| self.returned >= limit) {
            return Ok(self.finish());
        }
        if !self.advance()? {
            return Ok(false);
        }
        self.returned += 1;
        Ok(true)
    }

    fn current_row(&self) -> Option<&Row> {
        if self.finished {
            None
        } else {
            self.inner.current_row()
        }
    }

    fn close(&mut self) {
        self.finish();
    }
}
