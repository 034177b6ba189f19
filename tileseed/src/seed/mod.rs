//! Job and task scheduling.
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!  SeedRequest ────► │          TileBreeder         │
//!                    │  RwLock { registry, jobs }   │
//!                    └──────┬───────────────┬───────┘
//!                create_job │               │ dispatch_job
//!                           ▼               ▼
//!                    ┌────────────┐   ┌────────────┐
//!                    │    Job     │   │ WorkerPool │
//!                    │  tasks[N]  │   │ seed-worker│
//!                    │  iterator  │◄──┤    -0..n   │
//!                    └────────────┘   └────────────┘
//! ```
//!
//! A job owns a fixed array of [`Task`]s and one shared work iterator. The
//! breeder assigns task ids at dispatch, submits each task to the pool and
//! tracks it in an ordered registry until a drain pass sees it finished.
//! Termination is cooperative: a task observes the request at its next safe
//! point and ends `DEAD`.

mod breeder;
mod error;
#[cfg(test)]
mod fixtures;
mod job;
mod pool;
mod request;
mod state;
mod status;
mod task;

pub use breeder::TileBreeder;
pub use error::{PoolError, SeedError};
pub use job::{Job, JobKind, SeedJob};
pub use pool::{TaskHandle, WorkerPool};
pub use request::{SeedRequest, DEFAULT_FORMAT, DEFAULT_GRID_SET};
pub use state::{TaskState, TaskType};
pub use status::{JobStatus, TaskStatus};
pub use task::Task;
