//! Scheduler errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::grid::RangeError;

/// Errors surfaced synchronously by the breeder.
///
/// Failures inside a task never appear here; they end the task `DEAD` and are
/// reported through its status.
#[derive(Debug, Error)]
pub enum SeedError {
    /// The requested operation is not one of seed, reseed or truncate.
    #[error("Unsupported job type: {0}")]
    UnsupportedJobType(String),

    /// The job was created by a different breeder.
    #[error("Job {job_id} was not created by this breeder")]
    ForeignJob { job_id: u64 },

    /// The job's tasks have already been submitted.
    #[error("Job {job_id} has already been dispatched")]
    AlreadyDispatched { job_id: u64 },

    /// No layer with this name is known to the dispatcher.
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// The requested tile range is malformed.
    #[error("Invalid tile range: {0}")]
    Range(#[from] RangeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors from the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool no longer accepts work.
    #[error("Worker pool has been shut down")]
    ShutDown,

    /// A worker thread could not be started.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
