//! Execution context: worker pool, task scheduling and retry.
//!
//! Design principles:
//! - One rayon pool per context, shared by every dataset created from it
//! - Shuffle map sides are prepared before result tasks are scheduled, so no
//!   task ever blocks on a parallel computation of its own
//! - A panicking task is replayed from lineage up to `max_task_attempts` times

use crate::dataset::{Dataset, Lineage};
use crate::error::{panic_message, EngineError, Result};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::Data;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default number of attempts for a task before the job fails.
pub const DEFAULT_MAX_TASK_ATTEMPTS: u32 = 4;

/// Engine configuration (plain data)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads in the pool. 0 lets rayon pick (one per core).
    pub worker_threads: usize,
    /// Attempts per task before the job fails.
    pub max_task_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_task_attempts: DEFAULT_MAX_TASK_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// Config with a fixed number of worker threads.
    pub fn with_threads(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            ..Default::default()
        }
    }
}

/// Handle to the worker pool. Clone is cheap and shares state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    pool: rayon::ThreadPool,
    config: EngineConfig,
    next_id: AtomicU64,
    metrics: EngineMetrics,
}

impl Context {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|idx| format!("landchange-worker-{}", idx));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder.build()?;
        debug!(
            "Engine context started with {} worker threads",
            pool.current_num_threads()
        );
        Ok(Self {
            inner: Arc::new(ContextInner {
                pool,
                config,
                next_id: AtomicU64::new(0),
                metrics: EngineMetrics::new(),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn worker_threads(&self) -> usize {
        self.inner.pool.current_num_threads()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub(crate) fn counters(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    pub(crate) fn next_node_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Distribute `items` over `partitions` contiguous slices.
    ///
    /// Partition `i` holds `items[i*len/n .. (i+1)*len/n]`; a partition count of
    /// zero is treated as one.
    pub fn parallelize<T: Data>(&self, items: Vec<T>, partitions: usize) -> Dataset<T> {
        Dataset::from_source(self.clone(), items, partitions.max(1))
    }

    /// Run every partition of `dataset` in parallel, preserving partition order.
    pub(crate) fn run_job<T: Data>(&self, dataset: &Dataset<T>) -> Result<Vec<Vec<T>>> {
        let start = Instant::now();
        let mut prepared = HashSet::new();
        prepare_lineage(dataset.lineage(), &mut prepared)?;

        let partitions = self.run_tasks(dataset)?;
        debug!(
            metrics = ?self.metrics(),
            "Job '{}' finished {} partitions in {:?}",
            dataset.name(),
            partitions.len(),
            start.elapsed()
        );
        Ok(partitions)
    }

    /// Compute all partitions of `dataset` on the pool without preparing lineage.
    pub(crate) fn run_tasks<T: Data>(&self, dataset: &Dataset<T>) -> Result<Vec<Vec<T>>> {
        let count = dataset.num_partitions();
        self.inner.pool.install(|| {
            (0..count)
                .into_par_iter()
                .map(|partition| self.run_task(dataset, partition))
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Compute one partition, replaying it from lineage if it panics.
    pub(crate) fn run_task<T: Data>(&self, dataset: &Dataset<T>, partition: usize) -> Result<Vec<T>> {
        let attempts = self.inner.config.max_task_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            self.inner.metrics.inc_tasks_run();
            match catch_unwind(AssertUnwindSafe(|| dataset.compute_partition(partition))) {
                Ok(result) => return result,
                Err(payload) => {
                    last_failure = panic_message(payload.as_ref());
                    warn!(
                        dataset = %dataset.name(),
                        partition,
                        attempt,
                        "Task panicked: {}",
                        last_failure
                    );
                    if attempt < attempts {
                        self.inner.metrics.inc_task_retries();
                    }
                }
            }
        }

        Err(EngineError::TaskFailed {
            dataset: dataset.name(),
            partition,
            attempts,
            message: last_failure,
        })
    }
}

/// Prepare shuffle dependencies bottom-up, each node at most once per job.
fn prepare_lineage(node: &Arc<dyn Lineage>, prepared: &mut HashSet<u64>) -> Result<()> {
    if !prepared.insert(node.meta().id()) {
        return Ok(());
    }
    for parent in node.pending_parents() {
        prepare_lineage(&parent, prepared)?;
    }
    node.prepare()
}
