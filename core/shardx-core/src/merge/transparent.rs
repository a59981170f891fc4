//! Transparent merge — streams concatenated in unit order.

use crate::error::ShardxResult;
use crate::merge::MergedResult;
use crate::merge::stream::ShardStreams;
use crate::value::Row;

pub struct TransparentMergedResult {
    streams: ShardStreams,
    position: usize,
    current: Option<Row>,
}

impl TransparentMergedResult {
    pub fn new(streams: ShardStreams) -> Self {
        Self {
            streams,
            position: 0,
            current: None,
        }
    }
}

impl MergedResult for TransparentMergedResult {
    fn next(&mut self) -> ShardxResult<bool> {
        while self.position < self.streams.len() {
            let pulled = self.streams.next_row(self.position).inspect_err(|_| {
                self.current = None;
                self.position = self.streams.len();
            });
            if let Some(row) = pulled? {
                self.current = Some(row);
                return Ok(true);
            }
            self.position += 1;
        }
        self.current = None;
        Ok(false)
    }

    fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.current = None;
        self.position = self.streams.len();
        self.streams.close_all();
    }
}
