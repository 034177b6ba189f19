//! Tasks: one worker's share of a job.
//!
//! A task owns its lifecycle state and progress counters. Counters are
//! written only by the worker running the task and read by anyone taking a
//! status snapshot.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::job::SeedJob;
use super::{Job, JobKind, TaskState, TaskStatus};
use crate::grid::TileRequest;
use crate::layer::StorageBroker;

/// Granularity of termination checks while waiting to retry.
const RETRY_POLL: Duration = Duration::from_millis(10);

/// Reason a task stopped early.
#[derive(Debug)]
enum Interruption {
    Terminated,
    Failed(String),
}

impl Interruption {
    fn into_reason(self) -> String {
        match self {
            Self::Terminated => "terminated".to_string(),
            Self::Failed(reason) => reason,
        }
    }
}

/// One thread's contribution to a [`Job`].
pub struct Task {
    job_id: u64,
    layer: String,
    /// 0 until dispatched.
    id: AtomicU64,
    state: AtomicU8,
    tiles_done: AtomicU64,
    tiles_total: AtomicI64,
    time_remaining: AtomicI64,
    cancellation: CancellationToken,
    termination_requests: AtomicU32,
    failure: Mutex<Option<String>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    disposed: AtomicBool,
}

impl Task {
    pub(crate) fn new(job_id: u64, layer: impl Into<String>) -> Self {
        Self {
            job_id,
            layer: layer.into(),
            id: AtomicU64::new(0),
            state: AtomicU8::new(TaskState::Unset as u8),
            tiles_done: AtomicU64::new(0),
            tiles_total: AtomicI64::new(-1),
            time_remaining: AtomicI64::new(-1),
            cancellation: CancellationToken::new(),
            termination_requests: AtomicU32::new(0),
            failure: Mutex::new(None),
            finished_at: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Identity assigned at dispatch.
    pub fn id(&self) -> Option<u64> {
        match self.id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn layer_name(&self) -> &str {
        &self.layer
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(TaskState::Unset)
    }

    pub fn tiles_done(&self) -> u64 {
        self.tiles_done.load(Ordering::Relaxed)
    }

    /// Expected tiles for this task, `-1` while unknown.
    pub fn tiles_total(&self) -> i64 {
        self.tiles_total.load(Ordering::Relaxed)
    }

    /// Estimated seconds remaining, `-1` while unknown.
    pub fn time_remaining(&self) -> i64 {
        self.time_remaining.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        *self.finished_at.lock()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn is_termination_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Termination requests this task has accepted.
    pub fn termination_requests(&self) -> u32 {
        self.termination_requests.load(Ordering::Acquire)
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            task_id: self.id(),
            job_id: self.job_id,
            layer: self.layer.clone(),
            state: self.state(),
            tiles_done: self.tiles_done(),
            tiles_total: self.tiles_total(),
            time_remaining: self.time_remaining(),
            failure: self.failure(),
        }
    }

    /// Requests cooperative termination.
    ///
    /// Finished tasks ignore the request and return `false`. A task that has
    /// not started goes straight to `DEAD`; a running task stops at its next
    /// safe point.
    pub fn terminate(&self) -> bool {
        let state = self.state();
        if state.is_terminal() {
            return false;
        }

        self.termination_requests.fetch_add(1, Ordering::AcqRel);
        self.cancellation.cancel();
        tracing::info!(
            job_id = self.job_id,
            task_id = self.id(),
            state = %state,
            "Task termination requested"
        );

        if [TaskState::Unset, TaskState::Ready]
            .into_iter()
            .any(|from| self.transition(from, TaskState::Dead))
        {
            self.set_failure("terminated before running".to_string());
            self.dispose();
        }
        true
    }

    /// Releases the task's resources. Runs once; later calls are no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.time_remaining.store(0, Ordering::Relaxed);
        *self.finished_at.lock() = Some(Utc::now());
        tracing::debug!(
            job_id = self.job_id,
            task_id = self.id(),
            state = %self.state(),
            tiles_done = self.tiles_done(),
            "Task disposed"
        );
    }

    /// Assigns the dispatch identity and moves `UNSET` to `READY`.
    pub(crate) fn schedule(&self, id: u64) -> bool {
        self.id.store(id, Ordering::Release);
        self.transition(TaskState::Unset, TaskState::Ready)
    }

    /// Runs the task on the current thread. Panics end the task `DEAD`.
    ///
    /// A task that was not runnable and is still pending is left untouched.
    pub(crate) fn execute(&self, job: &Job) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.run(job))) {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                job_id = self.job_id,
                task_id = self.id(),
                panic = %message,
                "Task panicked"
            );
            self.mark_dead(format!("panicked: {}", message));
        }
        if self.state().is_terminal() {
            self.dispose();
        }
    }

    /// Ends a task that will never reach a worker.
    pub(crate) fn abandon(&self, reason: String) {
        self.mark_dead(reason);
        if self.state().is_terminal() {
            self.dispose();
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn run(&self, job: &Job) {
        if !self.transition(TaskState::Ready, TaskState::Running) {
            tracing::debug!(
                job_id = self.job_id,
                task_id = self.id(),
                state = %self.state(),
                "Task not runnable, skipping"
            );
            return;
        }
        tracing::debug!(job_id = self.job_id, task_id = self.id(), "Task running");

        let result = match job.kind() {
            JobKind::Truncate { storage } => self.truncate(job, storage.as_ref()),
            JobKind::Seed(seed) => self.seed(job, seed),
        }
        .and_then(|()| self.update_filters(job));

        match result {
            Ok(()) => {
                if self.transition(TaskState::Running, TaskState::Done) {
                    tracing::debug!(
                        job_id = self.job_id,
                        task_id = self.id(),
                        tiles_done = self.tiles_done(),
                        "Task done"
                    );
                }
            }
            Err(interruption) => self.mark_dead(interruption.into_reason()),
        }
    }

    fn seed(&self, job: &Job, seed: &SeedJob) -> Result<(), Interruption> {
        let threads = job.thread_count().max(1) as u64;
        let total = job.range().tile_count() / threads;
        self.tiles_total
            .store(i64::try_from(total).unwrap_or(i64::MAX), Ordering::Relaxed);

        let try_cache = !seed.reseed();
        let started = Instant::now();

        loop {
            if self.cancellation.is_cancelled() {
                return Err(Interruption::Terminated);
            }
            let Some(request) = job.next_location() else {
                break;
            };

            self.seed_with_retries(job, seed, &request, try_cache)?;

            self.tiles_done
                .fetch_add(job.tiles_for(&request), Ordering::Relaxed);
            self.update_estimate(started);
        }
        Ok(())
    }

    /// Renders one meta-tile, retrying per the job's policy.
    ///
    /// A tile that exhausts its retries is skipped.
    fn seed_with_retries(
        &self,
        job: &Job,
        seed: &SeedJob,
        request: &TileRequest,
        try_cache: bool,
    ) -> Result<(), Interruption> {
        let policy = seed.config();
        let mut retries = 0;

        loop {
            let err = match job.layer().seed_tile(request, try_cache) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            let failures = seed.record_failure();

            if policy.tile_failure_retry_count == 0 {
                return Err(Interruption::Failed(format!(
                    "failed to seed {}: {}",
                    request, err
                )));
            }
            if failures >= policy.total_failures_before_aborting {
                tracing::error!(
                    job_id = self.job_id,
                    task_id = self.id(),
                    failures,
                    limit = policy.total_failures_before_aborting,
                    "Too many tile failures, aborting task"
                );
                return Err(Interruption::Failed(format!(
                    "too many failures ({}), last: {}",
                    failures, err
                )));
            }
            if retries >= policy.tile_failure_retry_count {
                tracing::warn!(
                    job_id = self.job_id,
                    task_id = self.id(),
                    request = %request,
                    error = %err,
                    retryable = err.is_retryable,
                    "Giving up on tile after {} retries",
                    retries
                );
                return Ok(());
            }

            retries += 1;
            tracing::warn!(
                job_id = self.job_id,
                task_id = self.id(),
                request = %request,
                error = %err,
                retryable = err.is_retryable,
                retry = retries,
                "Tile failed, retrying"
            );
            if self.wait_for_retry(policy.tile_failure_retry_wait) {
                return Err(Interruption::Terminated);
            }
        }
    }

    fn truncate(&self, job: &Job, storage: &dyn StorageBroker) -> Result<(), Interruption> {
        let total = job.range().tile_count();
        self.tiles_total
            .store(i64::try_from(total).unwrap_or(i64::MAX), Ordering::Relaxed);

        if self.cancellation.is_cancelled() {
            return Err(Interruption::Terminated);
        }
        let deleted = storage
            .delete_range(job.range())
            .map_err(|e| Interruption::Failed(e.to_string()))?;
        self.tiles_done.store(deleted, Ordering::Relaxed);
        tracing::info!(
            job_id = self.job_id,
            task_id = self.id(),
            layer = %self.layer,
            deleted,
            "Truncated tile range"
        );
        Ok(())
    }

    fn update_filters(&self, job: &Job) -> Result<(), Interruption> {
        if !job.filter_update() {
            return Ok(());
        }
        job.layer()
            .update_request_filters(job.range())
            .map_err(|e| Interruption::Failed(format!("request filter update failed: {}", e)))
    }

    /// Sleeps for `wait`; returns true if termination was requested meanwhile.
    fn wait_for_retry(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            if self.cancellation.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(RETRY_POLL));
        }
    }

    fn update_estimate(&self, started: Instant) {
        let done = self.tiles_done();
        let total = self.tiles_total();
        if done == 0 || total < 0 {
            return;
        }
        let remaining = (total as u64).saturating_sub(done);
        let secs = started.elapsed().as_secs_f64() / done as f64 * remaining as f64;
        self.time_remaining
            .store(secs.round() as i64, Ordering::Relaxed);
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            tracing::trace!(job_id = self.job_id, task_id = self.id(), %from, %to, "Task state change");
        }
        moved
    }

    /// Moves any non-terminal state to `DEAD`, recording `reason`.
    fn mark_dead(&self, reason: String) {
        loop {
            let current = self.state();
            if current.is_terminal() {
                return;
            }
            if self.transition(current, TaskState::Dead) {
                tracing::warn!(
                    job_id = self.job_id,
                    task_id = self.id(),
                    reason = %reason,
                    "Task dead"
                );
                self.set_failure(reason);
                return;
            }
        }
    }

    fn set_failure(&self, reason: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(reason);
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("job_id", &self.job_id)
            .field("layer", &self.layer)
            .field("state", &self.state())
            .field("tiles_done", &self.tiles_done())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
