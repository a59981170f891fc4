//! Parallel executor — Rayon-based fan-out of execution units.
//!
//! Physical execution is supplied by the caller through [`StatementExecutor`].
//! Each connection group runs on one pool task, its units one after another,
//! so a data source never sees more than `max_connections_size_per_query`
//! concurrent statements from one query.

use crate::engine::execution::{ExecutionUnit, group_indexes};
use crate::error::{ShardxError, ShardxResult};
use crate::merge::RowStream;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs one rewritten statement against its data source.
pub trait StatementExecutor: Sync {
    fn execute(&self, unit: &ExecutionUnit) -> ShardxResult<Box<dyn RowStream>>;
}

impl<F> StatementExecutor for F
where
    F: Fn(&ExecutionUnit) -> ShardxResult<Box<dyn RowStream>> + Sync,
{
    fn execute(&self, unit: &ExecutionUnit) -> ShardxResult<Box<dyn RowStream>> {
        self(unit)
    }
}

pub struct ParallelExecutor {
    thread_pool: Arc<rayon::ThreadPool>,
    max_connections: usize,
}

impl ParallelExecutor {
    /// Pool of `num_threads` workers, `max_connections` connections per data source.
    pub fn new(num_threads: usize, max_connections: usize) -> ShardxResult<Self> {
        if num_threads == 0 {
            return Err(ShardxError::InvalidArguments(
                "thread count must be greater than 0".to_string(),
            ));
        }
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("shardx-exec-{i}"))
            .build()
            .map_err(|e| ShardxError::InvalidArguments(format!("failed to create thread pool: {e}")))?;
        Ok(Self {
            thread_pool: Arc::new(thread_pool),
            max_connections: max_connections.max(1),
        })
    }

    /// One worker per logical CPU, capped at 16.
    pub fn new_auto(max_connections: usize) -> ShardxResult<Self> {
        Self::new(num_cpus::get().clamp(1, 16), max_connections)
    }

    pub fn thread_count(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Execute every unit and return the streams in unit order.
    ///
    /// On failure every stream that was opened is closed and the error of the
    /// earliest failing unit is returned.
    pub fn execute_all(
        &self,
        units: &[ExecutionUnit],
        executor: &dyn StatementExecutor,
    ) -> ShardxResult<Vec<Box<dyn RowStream>>> {
        let connections: Vec<Vec<usize>> = group_indexes(units, self.max_connections)
            .into_iter()
            .flat_map(|group| group.connections)
            .collect();
        debug!(
            units = units.len(),
            connections = connections.len(),
            "executing units"
        );

        let results: Vec<Vec<(usize, ShardxResult<Box<dyn RowStream>>)>> =
            self.thread_pool.install(|| {
                connections
                    .par_iter()
                    .map(|connection| {
                        connection
                            .iter()
                            .map(|&index| (index, executor.execute(&units[index])))
                            .collect()
                    })
                    .collect()
            });

        let mut slots: Vec<Option<ShardxResult<Box<dyn RowStream>>>> =
            (0..units.len()).map(|_| None).collect();
        for (index, result) in results.into_iter().flatten() {
            slots[index] = Some(result);
        }

        let mut streams = Vec::with_capacity(units.len());
        let mut first_error = None;
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(stream)) => streams.push(stream),
                Some(Err(err)) => {
                    warn!(data_source = %units[index].data_source_name, error = %err, "execution failed");
                    first_error.get_or_insert(err);
                }
                None => {
                    first_error.get_or_insert(ShardxError::MergeState(format!(
                        "execution unit {index} was never scheduled"
                    )));
                }
            }
        }
        if let Some(err) = first_error {
            for stream in &mut streams {
                stream.close();
            }
            return Err(err);
        }
        Ok(streams)
    }
}
