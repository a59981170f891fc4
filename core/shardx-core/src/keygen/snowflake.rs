//! Snowflake key generator.
//!
//! ```text
//! 1 bit sign | 41 bits millis since epoch | 10 bits worker id | 12 bits sequence
//! ```

use crate::error::{ShardxError, ShardxResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// 2016-11-01T00:00:00Z
pub const EPOCH_MILLIS: i64 = 1_477_958_400_000;

const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;

pub const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
pub const DEFAULT_MAX_TOLERATE_MILLIS: i64 = 10;
pub const DEFAULT_MAX_VIBRATION_OFFSET: i64 = 1;

/// Millisecond clock, swappable in tests.
pub trait Clock: Send + Sync {
    fn current_millis(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct State {
    last_millis: i64,
    sequence: i64,
    sequence_offset: i64,
}

pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    max_tolerate_millis: i64,
    max_vibration_offset: i64,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl fmt::Debug for SnowflakeKeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeKeyGenerator")
            .field("worker_id", &self.worker_id)
            .field("max_tolerate_millis", &self.max_tolerate_millis)
            .field("max_vibration_offset", &self.max_vibration_offset)
            .finish()
    }
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: i64, max_tolerate_millis: i64, max_vibration_offset: i64) -> ShardxResult<Self> {
        Self::with_clock(
            worker_id,
            max_tolerate_millis,
            max_vibration_offset,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        worker_id: i64,
        max_tolerate_millis: i64,
        max_vibration_offset: i64,
        clock: Arc<dyn Clock>,
    ) -> ShardxResult<Self> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(ShardxError::config(format!(
                "snowflake worker-id must be within 0..={MAX_WORKER_ID}, got {worker_id}"
            )));
        }
        if max_tolerate_millis < 0 {
            return Err(ShardxError::config(
                "max-tolerate-time-difference-milliseconds must not be negative",
            ));
        }
        if !(0..=SEQUENCE_MASK).contains(&max_vibration_offset) {
            return Err(ShardxError::config(format!(
                "max-vibration-offset must be within 0..={SEQUENCE_MASK}"
            )));
        }
        Ok(Self {
            worker_id,
            max_tolerate_millis,
            max_vibration_offset,
            clock,
            state: Mutex::new(State {
                last_millis: 0,
                sequence: 0,
                sequence_offset: -1,
            }),
        })
    }

    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    pub fn next_key(&self) -> ShardxResult<i64> {
        let mut state = self.state.lock();
        let mut current = self.clock.current_millis();
        if state.last_millis > current {
            let difference = state.last_millis - current;
            if difference > self.max_tolerate_millis {
                return Err(ShardxError::KeyGeneration(format!(
                    "clock moved backwards: last {}ms, now {current}ms",
                    state.last_millis
                )));
            }
            warn!(difference, "clock moved backwards, waiting");
            thread::sleep(Duration::from_millis(difference as u64));
            current = self.clock.current_millis();
        }
        if state.last_millis == current {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                current = self.wait_until_after(current);
            }
        } else {
            // alternate the starting sequence so low-traffic keys are not all even
            state.sequence_offset = if state.sequence_offset >= self.max_vibration_offset {
                0
            } else {
                state.sequence_offset + 1
            };
            state.sequence = state.sequence_offset;
        }
        state.last_millis = current;
        Ok(((current - EPOCH_MILLIS) << TIMESTAMP_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | state.sequence)
    }

    fn wait_until_after(&self, last: i64) -> i64 {
        let mut current = self.clock.current_millis();
        while current <= last {
            thread::yield_now();
            current = self.clock.current_millis();
        }
        current
    }
}

/// Split a key into `(millis since unix epoch, worker id, sequence)`.
pub fn decompose(key: i64) -> (i64, i64, i64) {
    (
        (key >> TIMESTAMP_SHIFT) + EPOCH_MILLIS,
        (key >> WORKER_ID_SHIFT) & MAX_WORKER_ID,
        key & SEQUENCE_MASK,
    )
}
