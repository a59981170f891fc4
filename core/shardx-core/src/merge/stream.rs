//! Row streams — one per execution unit — and their ownership.
//!
//! A [`RowStream`] is whatever the execution layer hands back for one unit.
//! The merge engine never touches a stream directly; it goes through
//! [`ShardStreams`], which guarantees that each stream is closed exactly once:
//! on exhaustion, on the first error (every sibling too), on an explicit
//! close, or on drop.

use crate::error::{ShardxError, ShardxResult};
use crate::value::Row;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{trace, warn};

/// Cursor over the rows of one physical execution.
pub trait RowStream: Send {
    /// Next row, or `None` at end of stream.
    fn next_row(&mut self) -> ShardxResult<Option<Row>>;

    /// Release the underlying resources. Called at most once by the merge engine.
    fn close(&mut self);
}

struct ShardStream {
    inner: Box<dyn RowStream>,
    open: bool,
}

/// Owner of all streams of one merge.
pub struct ShardStreams {
    streams: Vec<ShardStream>,
}

impl ShardStreams {
    pub fn new(streams: Vec<Box<dyn RowStream>>) -> Self {
        Self {
            streams: streams
                .into_iter()
                .map(|inner| ShardStream { inner, open: true })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.streams.iter().filter(|s| s.open).count()
    }

    /// Pull from stream `index`. An exhausted stream is closed and reads as
    /// `None` from then on; an error closes every stream before it is returned.
    pub fn next_row(&mut self, index: usize) -> ShardxResult<Option<Row>> {
        let Some(stream) = self.streams.get_mut(index) else {
            return Err(ShardxError::MergeState(format!("no stream at position {index}")));
        };
        if !stream.open {
            return Ok(None);
        }
        match stream.inner.next_row() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                trace!(stream = index, "stream exhausted");
                self.close(index);
                Ok(None)
            }
            Err(err) => {
                warn!(stream = index, error = %err, "stream failed, closing all streams");
                self.close_all();
                Err(err)
            }
        }
    }

    pub fn close(&mut self, index: usize) {
        if let Some(stream) = self.streams.get_mut(index)
            && stream.open
        {
            stream.open = false;
            stream.inner.close();
        }
    }

    pub fn close_all(&mut self) {
        for index in 0..self.streams.len() {
            self.close(index);
        }
    }
}

impl Drop for ShardStreams {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// In-memory stream over prepared rows.
///
/// Counts `close` calls through a shared counter and can be told to fail
/// after a number of rows, which is what the merge tests build on.
pub struct MemoryRowStream {
    data_source: String,
    rows: VecDeque<Row>,
    fail_after: Option<(usize, String)>,
    served: usize,
    closes: Arc<AtomicUsize>,
}

impl MemoryRowStream {
    pub fn new(data_source: &str, rows: Vec<Row>) -> Self {
        Self {
            data_source: data_source.to_string(),
            rows: rows.into(),
            fail_after: None,
            served: 0,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail with a stream error once `rows` rows have been served.
    pub fn failing_after(mut self, rows: usize, message: &str) -> Self {
        self.fail_after = Some((rows, message.to_string()));
        self
    }

    /// Shared count of `close` calls on this stream.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

impl RowStream for MemoryRowStream {
    fn next_row(&mut self) -> ShardxResult<Option<Row>> {
        if let Some((limit, message)) = &self.fail_after
            && self.served >= *limit
        {
            return Err(ShardxError::Stream {
                data_source: self.data_source.clone(),
                message: message.clone(),
            });
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.served += 1;
        }
        Ok(row)
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarValue;

    fn rows(values: &[i64]) -> Vec<Row> {
        values.iter().map(|v| vec![ScalarValue::Int64(*v)]).collect()
    }

    #[test]
    fn test_exhausted_stream_closed_once() {
        let stream = MemoryRowStream::new("ds_0", rows(&[1]));
        let closes = stream.close_counter();
        let mut streams = ShardStreams::new(vec![Box::new(stream)]);
        assert!(streams.next_row(0).unwrap().is_some());
        assert!(streams.next_row(0).unwrap().is_none());
        assert!(streams.next_row(0).unwrap().is_none());
        streams.close_all();
        drop(streams);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_closes_siblings() {
        let good = MemoryRowStream::new("ds_0", rows(&[1, 2]));
        let bad = MemoryRowStream::new("ds_1", rows(&[3])).failing_after(0, "connection reset");
        let (good_closes, bad_closes) = (good.close_counter(), bad.close_counter());
        let mut streams = ShardStreams::new(vec![Box::new(good), Box::new(bad)]);
        let err = streams.next_row(1).unwrap_err();
        assert!(matches!(err, ShardxError::Stream { ref data_source, .. } if data_source == "ds_1"));
        assert_eq!(streams.open_count(), 0);
        drop(streams);
        assert_eq!(good_closes.load(Ordering::SeqCst), 1);
        assert_eq!(bad_closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_open_streams() {
        let stream = MemoryRowStream::new("ds_0", rows(&[1, 2, 3]));
        let closes = stream.close_counter();
        {
            let mut streams = ShardStreams::new(vec![Box::new(stream)]);
            streams.next_row(0).unwrap();
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_index() {
        let mut streams = ShardStreams::new(Vec::new());
        assert!(streams.is_empty());
        assert!(matches!(streams.next_row(0), Err(ShardxError::MergeState(_))));
    }
}
