//! Streaming k-way merge over shard streams sorted by the same ORDER BY.
//!
//! The queue holds at most one row per stream. `next()` pops the smallest
//! row and, on the following call, refills from the stream it came from.

use crate::error::ShardxResult;
use crate::merge::MergedResult;
use crate::merge::compare::compare_rows;
use crate::merge::stream::ShardStreams;
use crate::sql::context::OrderByColumn;
use crate::value::Row;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

struct QueueEntry {
    row: Row,
    stream: usize,
    columns: Arc<[OrderByColumn]>,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; equal rows keep unit order
        compare_rows(&self.row, &other.row, &self.columns)
            .then(self.stream.cmp(&other.stream))
            .reverse()
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

/// Row source shared by the ORDER BY and the sorted GROUP BY merges.
pub(crate) struct OrderedMerger {
    streams: ShardStreams,
    queue: BinaryHeap<QueueEntry>,
    columns: Arc<[OrderByColumn]>,
    refill: Option<usize>,
    /// Set once any stream fails; buffered sibling rows are discarded
    failed: bool,
}

impl OrderedMerger {
    pub(crate) fn new(mut streams: ShardStreams, columns: &[OrderByColumn]) -> ShardxResult<Self> {
        let columns: Arc<[OrderByColumn]> = Arc::from(columns);
        let mut queue = BinaryHeap::with_capacity(streams.len());
        for stream in 0..streams.len() {
            if let Some(row) = streams.next_row(stream)? {
                queue.push(QueueEntry {
                    row,
                    stream,
                    columns: Arc::clone(&columns),
                });
            }
        }
        Ok(Self {
            streams,
            queue,
            columns,
            refill: None,
            failed: false,
        })
    }

    pub(crate) fn next_row(&mut self) -> ShardxResult<Option<Row>> {
        if self.failed {
            return Ok(None);
        }
        if let Some(stream) = self.refill.take()
            && let Some(row) = self.pull(stream)?
        {
            self.queue.push(QueueEntry {
                row,
                stream,
                columns: Arc::clone(&self.columns),
            });
        }
        match self.queue.pop() {
            Some(entry) => {
                self.refill = Some(entry.stream);
                Ok(Some(entry.row))
            }
            None => Ok(None),
        }
    }

    fn pull(&mut self, stream: usize) -> ShardxResult<Option<Row>> {
        self.streams.next_row(stream).inspect_err(|_| {
            self.failed = true;
            self.queue.clear();
        })
    }

    pub(crate) fn close(&mut self) {
        self.queue.clear();
        self.refill = None;
        self.streams.close_all();
    }
}

pub struct OrderByStreamMergedResult {
    merger: OrderedMerger,
    current: Option<Row>,
}

impl OrderByStreamMergedResult {
    pub fn new(streams: ShardStreams, order_by: &[OrderByColumn]) -> ShardxResult<Self> {
        Ok(Self {
            merger: OrderedMerger::new(streams, order_by)?,
            current: None,
        })
    }
}

impl MergedResult for OrderByStreamMergedResult {
    fn next(&mut self) -> ShardxResult<bool> {
        self.current = self.merger.next_row()?;
        Ok(self.current.is_some())
    }

    fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.current = None;
        self.merger.close();
    }
}
