//! Lazy partitioned datasets with lineage-based recomputation.
//!
//! # Model
//!
//! - [`Context::parallelize`] turns a finite collection into a [`Dataset`]
//! - `map`, `filter`, `flat_map`, `map_partitions`, `repartition`,
//!   `cartesian` and `persist` build lineage without computing anything
//! - `collect`, `collect_partitions` and `count` run one task per partition on
//!   the context's rayon pool
//!
//! # Fault tolerance
//!
//! Stage functions must be deterministic. A task that panics is replayed from
//! its lineage; cached partitions that are evicted are recomputed the same way
//! and yield identical records.

pub mod context;
pub mod dataset;
pub mod error;
pub mod metrics;

pub use context::{Context, EngineConfig, DEFAULT_MAX_TASK_ATTEMPTS};
pub use dataset::Dataset;
pub use error::{panic_message, EngineError, Result};
pub use metrics::{EngineMetrics, MetricsSnapshot};

/// Records that can flow through a [`Dataset`].
pub trait Data: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Data for T {}
