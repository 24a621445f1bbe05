//! Engine Metrics Module
//!
//! In-memory counters describing how much work a [`Context`](crate::Context)
//! has scheduled. All fields are atomic for thread-safe access.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct EngineMetrics {
    pub tasks_run: AtomicU64,
    pub task_retries: AtomicU64,
    pub partitions_computed: AtomicU64,
    pub cache_hits: AtomicU64,
    pub shuffles: AtomicU64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub const fn new() -> Self {
        Self {
            tasks_run: AtomicU64::new(0),
            task_retries: AtomicU64::new(0),
            partitions_computed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            shuffles: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_tasks_run(&self) {
        self.tasks_run.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_task_retries(&self) {
        self.task_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_partitions_computed(&self) {
        self.partitions_computed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_shuffles(&self) {
        self.shuffles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_run: self.tasks_run.load(Ordering::Relaxed),
            task_retries: self.task_retries.load(Ordering::Relaxed),
            partitions_computed: self.partitions_computed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            shuffles: self.shuffles.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_run: u64,
    pub task_retries: u64,
    pub partitions_computed: u64,
    pub cache_hits: u64,
    pub shuffles: u64,
}
