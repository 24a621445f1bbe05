//! Engine error types

use std::any::Any;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    #[error("Partition {partition} out of range for '{dataset}' ({partitions} partitions)")]
    PartitionOutOfRange {
        dataset: String,
        partition: usize,
        partitions: usize,
    },

    #[error("Task for partition {partition} of '{dataset}' failed after {attempts} attempts: {message}")]
    TaskFailed {
        dataset: String,
        partition: usize,
        attempts: u32,
        message: String,
    },
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
