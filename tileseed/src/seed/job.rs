//! Jobs: a fixed set of tasks sharing one work iterator.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{JobStatus, Task, TaskState, TaskType};
use crate::config::SeedConfig;
use crate::grid::{LocationSource, TileRange, TileRequest};
use crate::layer::{StorageBroker, TileLayer};

/// Kind-specific job data.
pub enum JobKind {
    /// Single-task purge of the range from storage.
    Truncate { storage: Arc<dyn StorageBroker> },
    /// Rendering of the range, shared by one or more tasks.
    Seed(SeedJob),
}

impl fmt::Debug for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncate { .. } => f.write_str("Truncate"),
            Self::Seed(seed) => f.debug_tuple("Seed").field(seed).finish(),
        }
    }
}

/// Retry policy and failure accounting of a seed or reseed job.
#[derive(Debug)]
pub struct SeedJob {
    reseed: bool,
    config: SeedConfig,
    failures: AtomicU64,
}

impl SeedJob {
    pub fn new(reseed: bool, config: SeedConfig) -> Self {
        Self {
            reseed,
            config,
            failures: AtomicU64::new(0),
        }
    }

    /// Reseed overwrites cached tiles; seed leaves them alone.
    pub fn reseed(&self) -> bool {
        self.reseed
    }

    pub fn config(&self) -> &SeedConfig {
        &self.config
    }

    /// Tile failures recorded by all tasks of the job.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Records one failure and returns the new total.
    pub(crate) fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Everything needed to assemble a [`Job`].
pub(crate) struct JobParts {
    pub id: u64,
    pub breeder_id: u64,
    pub layer: Arc<dyn TileLayer>,
    pub range: TileRange,
    pub source: Box<dyn LocationSource>,
    pub kind: JobKind,
    pub thread_count: usize,
    pub filter_update: bool,
}

/// A unit of scheduling.
///
/// The task array is fixed at creation. Tasks exist (in state `UNSET`, with
/// no id) until the breeder dispatches the job.
pub struct Job {
    id: u64,
    breeder_id: u64,
    layer: Arc<dyn TileLayer>,
    range: TileRange,
    source: Box<dyn LocationSource>,
    kind: JobKind,
    tasks: Vec<Arc<Task>>,
    filter_update: bool,
    dispatched: AtomicBool,
    created_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(parts: JobParts) -> Self {
        let count = match parts.kind {
            JobKind::Truncate { .. } => 1,
            JobKind::Seed(_) => parts.thread_count.max(1),
        };
        let tasks = (0..count)
            .map(|_| Arc::new(Task::new(parts.id, parts.layer.name())))
            .collect();

        Self {
            id: parts.id,
            breeder_id: parts.breeder_id,
            layer: parts.layer,
            range: parts.range,
            source: parts.source,
            kind: parts.kind,
            tasks,
            filter_update: parts.filter_update,
            dispatched: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identity of the breeder that created this job.
    pub fn breeder_id(&self) -> u64 {
        self.breeder_id
    }

    pub fn layer(&self) -> &Arc<dyn TileLayer> {
        &self.layer
    }

    pub fn range(&self) -> &TileRange {
        &self.range
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn task_type(&self) -> TaskType {
        match &self.kind {
            JobKind::Truncate { .. } => TaskType::Truncate,
            JobKind::Seed(seed) if seed.reseed() => TaskType::Reseed,
            JobKind::Seed(_) => TaskType::Seed,
        }
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn thread_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether successful tasks refresh the layer's request filters.
    pub fn filter_update(&self) -> bool {
        self.filter_update
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::Acquire)
    }

    /// Marks the job dispatched; false if it already was.
    pub(crate) fn mark_dispatched(&self) -> bool {
        !self.dispatched.swap(true, Ordering::AcqRel)
    }

    /// Tile failures shared across the job's tasks (always 0 for truncate).
    pub fn failures(&self) -> u64 {
        match &self.kind {
            JobKind::Seed(seed) => seed.failures(),
            JobKind::Truncate { .. } => 0,
        }
    }

    /// Draws the next unit of work, or `None` once the range is exhausted.
    pub fn next_location(&self) -> Option<TileRequest> {
        self.source.draw_next().map(TileRequest::from)
    }

    /// Real tiles covered by the meta-tile at `request`.
    pub fn tiles_for(&self, request: &TileRequest) -> u64 {
        self.source.tiles_for_location(&request.location())
    }

    /// Aggregated state of all tasks.
    pub fn state(&self) -> TaskState {
        TaskState::aggregate(self.tasks.iter().map(|t| t.state()))
    }

    pub fn status(&self) -> JobStatus {
        let tasks: Vec<_> = self.tasks.iter().map(|t| t.status()).collect();
        JobStatus {
            job_id: self.id,
            layer: self.layer.name().to_string(),
            task_type: self.task_type(),
            state: TaskState::aggregate(tasks.iter().map(|t| t.state)),
            timestamp: Utc::now(),
            tasks,
        }
    }

    /// Requests termination of every task that has not finished.
    pub fn terminate(&self) {
        let requested = self.tasks.iter().filter(|t| t.terminate()).count();
        tracing::info!(job_id = self.id, tasks = requested, "Job termination requested");
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("breeder_id", &self.breeder_id)
            .field("layer", &self.layer.name())
            .field("task_type", &self.task_type())
            .field("tasks", &self.tasks.len())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridLocation;
    use crate::seed::fixtures::{self, ScriptedSource};
    use proptest::prelude::*;
    use TaskState::*;

    fn job_with_states(states: &[TaskState]) -> Job {
        let job = fixtures::scripted_job(states.len(), Vec::new());
        for (task, state) in job.tasks().iter().zip(states) {
            task.force_state(*state);
        }
        job
    }

    fn dominant(states: &[TaskState]) -> TaskState {
        if states.contains(&Dead) {
            Dead
        } else if states.contains(&Running) {
            Running
        } else if states.contains(&Done) {
            Done
        } else {
            Ready
        }
    }

    #[test]
    fn test_single_task_state() {
        assert_eq!(job_with_states(&[Unset]).state(), Ready);
        assert_eq!(job_with_states(&[Ready]).state(), Ready);
        assert_eq!(job_with_states(&[Running]).state(), Running);
        assert_eq!(job_with_states(&[Done]).state(), Done);
        assert_eq!(job_with_states(&[Dead]).state(), Dead);
    }

    #[test]
    fn test_two_task_states() {
        for a in TaskState::ALL {
            for b in TaskState::ALL {
                let job = job_with_states(&[a, b]);
                assert_eq!(job.state(), dominant(&[a, b]), "{a} + {b}");
            }
        }
    }

    #[test]
    fn test_documented_combinations() {
        assert_eq!(job_with_states(&[Done, Unset]).state(), Done);
        assert_eq!(job_with_states(&[Running, Dead]).state(), Dead);
        assert_eq!(job_with_states(&[Ready, Unset]).state(), Ready);
    }

    #[test]
    fn test_next_location_exhaustion() {
        let locations = vec![
            GridLocation::new(1, 2, 3),
            GridLocation::new(4, 5, 6),
            GridLocation::new(7, 8, 9),
        ];
        let job = fixtures::scripted_job(1, locations.clone());

        for expected in &locations {
            let request = job.next_location().unwrap();
            assert_eq!(request.x(), expected.x);
            assert_eq!(request.y(), expected.y);
            assert_eq!(request.zoom(), expected.zoom);
        }
        for _ in 0..5 {
            assert!(job.next_location().is_none());
        }
    }

    #[test]
    fn test_terminate_single_task() {
        for state in TaskState::ALL {
            let job = job_with_states(&[state]);
            job.terminate();
            let expected = u32::from(!state.is_terminal());
            assert_eq!(job.tasks()[0].termination_requests(), expected, "{state}");
        }
    }

    #[test]
    fn test_terminate_task_pairs() {
        for a in TaskState::ALL {
            for b in TaskState::ALL {
                let job = job_with_states(&[a, b]);
                job.terminate();
                for (task, state) in job.tasks().iter().zip([a, b]) {
                    let expected = u32::from(!state.is_terminal());
                    assert_eq!(task.termination_requests(), expected, "{a} + {b}");
                }
            }
        }
    }

    #[test]
    fn test_terminate_leaves_finished_tasks_alone() {
        let job = job_with_states(&[Done, Running, Dead]);
        job.terminate();
        assert_eq!(job.tasks()[0].state(), Done);
        assert!(job.tasks()[1].is_termination_requested());
        assert_eq!(job.tasks()[2].failure(), None);
    }

    #[test]
    fn test_status_snapshot() {
        let job = job_with_states(&[Running, Done, Unset]);
        let before = Utc::now();
        let status = job.status();

        let skew = (status.timestamp - before).num_milliseconds().abs();
        assert!(skew < 100, "timestamp off by {skew}ms");

        let expected: Vec<_> = job.tasks().iter().map(|t| t.status()).collect();
        assert_eq!(status.tasks.len(), expected.len());
        for task in &expected {
            assert!(status.tasks.contains(task));
        }
        assert_eq!(status.state, Running);
        assert_eq!(status.job_id, job.id());
    }

    #[test]
    fn test_task_type_follows_kind() {
        let seed = fixtures::scripted_job(2, Vec::new());
        assert_eq!(seed.task_type(), TaskType::Seed);
        assert_eq!(seed.thread_count(), 2);

        let truncate = fixtures::truncate_job(fixtures::small_range());
        assert_eq!(truncate.task_type(), TaskType::Truncate);
        assert_eq!(truncate.thread_count(), 1);
    }

    #[test]
    fn test_mark_dispatched_once() {
        let job = fixtures::scripted_job(1, Vec::new());
        assert!(!job.is_dispatched());
        assert!(job.mark_dispatched());
        assert!(!job.mark_dispatched());
        assert!(job.is_dispatched());
    }

    #[test]
    fn test_tasks_share_job_identity() {
        let job = fixtures::scripted_job(3, Vec::new());
        for task in job.tasks() {
            assert_eq!(task.job_id(), job.id());
            assert_eq!(task.id(), None);
            assert_eq!(task.state(), Unset);
        }
    }

    #[test]
    fn test_scripted_source_is_shared() {
        let source = ScriptedSource::new(vec![GridLocation::new(0, 0, 0)]);
        assert!(source.draw_next().is_some());
        assert!(source.draw_next().is_none());
    }

    fn any_state() -> impl Strategy<Value = TaskState> {
        prop::sample::select(TaskState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_job_state_is_dominant(states in prop::collection::vec(any_state(), 1..6)) {
            let job = job_with_states(&states);
            prop_assert_eq!(job.state(), dominant(&states));
        }
    }
}
