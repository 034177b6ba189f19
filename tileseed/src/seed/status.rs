//! Point-in-time status snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{TaskState, TaskType};

/// Snapshot of one task's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    /// Assigned at dispatch; `None` until then.
    pub task_id: Option<u64>,
    pub job_id: u64,
    pub layer: String,
    pub state: TaskState,
    pub tiles_done: u64,
    /// `-1` while unknown.
    pub tiles_total: i64,
    /// Estimated seconds remaining, `-1` while unknown.
    pub time_remaining: i64,
    /// Why the task ended `DEAD`, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TaskStatus {
    pub fn state_code(&self) -> i64 {
        self.state.state_code()
    }

    /// Legacy `[tiles_done, tiles_total, time_remaining, task_id, state_code]`.
    ///
    /// An unassigned task id is reported as `-1`.
    pub fn as_tuple(&self) -> [i64; 5] {
        [
            i64::try_from(self.tiles_done).unwrap_or(i64::MAX),
            self.tiles_total,
            self.time_remaining,
            self.task_id
                .and_then(|id| i64::try_from(id).ok())
                .unwrap_or(-1),
            self.state_code(),
        ]
    }
}

/// Snapshot of a job and all of its tasks.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: u64,
    pub layer: String,
    pub task_type: TaskType,
    pub state: TaskState,
    /// Wall-clock time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    pub tasks: Vec<TaskStatus>,
}

impl JobStatus {
    pub fn tiles_done(&self) -> u64 {
        self.tasks.iter().map(|t| t.tiles_done).sum()
    }
}
