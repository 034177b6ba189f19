//! The breeder: job factory, dispatcher and registry of in-flight tasks.
//!
//! ```text
//!  create_job ──► Job (tasks UNSET, registered in `jobs`)
//!                  │
//!  dispatch_job ───┴─► write lock ─► per task: id, READY, pool.submit,
//!                                    registry.insert(id → task, handle)
//!
//!  status queries ──► read lock ─► snapshot ─► unlock ─► drain()
//!  drain          ──► write lock ─► pool.purge(), drop completed entries
//! ```
//!
//! One `RwLock` guards both the registry and the job collection. It is
//! never held while a task executes.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::job::{JobParts, SeedJob};
use super::pool::{TaskHandle, WorkerPool};
use super::{
    Job, JobKind, JobStatus, PoolError, SeedError, SeedRequest, Task, TaskState, TaskStatus,
    TaskType,
};
use crate::config::{BreederConfig, ConfigLookup, SeedConfig};
use crate::grid::{TileRange, TileRangeIterator};
use crate::layer::{LayerDispatcher, StorageBroker, TileLayer};

/// Source of breeder identities, used to reject foreign jobs.
static BREEDER_IDS: AtomicU64 = AtomicU64::new(1);

const FIRST_TASK_ID: u64 = 1;
const FIRST_JOB_ID: u64 = 0;

struct SubmittedTask {
    task: Arc<Task>,
    handle: TaskHandle,
}

#[derive(Default)]
struct BreederState {
    registry: BTreeMap<u64, SubmittedTask>,
    jobs: Vec<Arc<Job>>,
}

/// Creates jobs, runs their tasks on a worker pool and tracks them.
pub struct TileBreeder {
    id: u64,
    config: SeedConfig,
    pool: WorkerPool,
    layers: Arc<dyn LayerDispatcher>,
    storage: Arc<dyn StorageBroker>,
    state: RwLock<BreederState>,
    next_task_id: AtomicU64,
    next_job_id: AtomicU64,
}

impl TileBreeder {
    /// Builds a breeder and starts its worker pool.
    pub fn new(
        config: BreederConfig,
        layers: Arc<dyn LayerDispatcher>,
        storage: Arc<dyn StorageBroker>,
    ) -> Result<Self, SeedError> {
        let pool = WorkerPool::new(config.pool)?;
        let id = BREEDER_IDS.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            breeder_id = id,
            threads = pool.core_size(),
            retry_count = config.seed.tile_failure_retry_count,
            retry_wait_ms = config.seed.tile_failure_retry_wait.as_millis() as u64,
            abort_limit = config.seed.total_failures_before_aborting,
            "Tile breeder started"
        );

        Ok(Self {
            id,
            config: config.seed,
            pool,
            layers,
            storage,
            state: RwLock::new(BreederState::default()),
            next_task_id: AtomicU64::new(FIRST_TASK_ID),
            next_job_id: AtomicU64::new(FIRST_JOB_ID),
        })
    }

    /// Resolves configuration from `lookup`, then builds the breeder.
    ///
    /// # Errors
    ///
    /// Any invalid configuration value is fatal.
    pub fn from_lookup(
        lookup: &dyn ConfigLookup,
        layers: Arc<dyn LayerDispatcher>,
        storage: Arc<dyn StorageBroker>,
    ) -> Result<Self, SeedError> {
        Self::new(BreederConfig::resolve(lookup)?, layers, storage)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Retry policy copied into every seed and reseed job.
    pub fn seed_config(&self) -> &SeedConfig {
        &self.config
    }

    /// Worker count; sizes legacy fixed-width status tables.
    pub fn pool_core_size(&self) -> usize {
        self.pool.core_size()
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Creates and registers a job without dispatching it.
    ///
    /// Truncate jobs and non-positive thread counts get a single task.
    pub fn create_job(
        &self,
        range: TileRange,
        layer: Arc<dyn TileLayer>,
        task_type: TaskType,
        thread_count: i64,
        filter_update: bool,
    ) -> Arc<Job> {
        let threads = match task_type {
            TaskType::Truncate => 1,
            _ if thread_count < 1 => 1,
            _ => usize::try_from(thread_count).unwrap_or(usize::MAX),
        };
        if i64::try_from(threads).ok() != Some(thread_count) {
            tracing::trace!(requested = thread_count, threads, "Normalized thread count");
        }

        let kind = match task_type {
            TaskType::Truncate => JobKind::Truncate {
                storage: Arc::clone(&self.storage),
            },
            TaskType::Seed => JobKind::Seed(SeedJob::new(false, self.config)),
            TaskType::Reseed => JobKind::Seed(SeedJob::new(true, self.config)),
        };

        let source = Box::new(TileRangeIterator::new(range.clone(), layer.meta_tiling()));
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let job = Arc::new(Job::new(JobParts {
            id,
            breeder_id: self.id,
            layer,
            range,
            source,
            kind,
            thread_count: threads,
            filter_update,
        }));

        self.state.write().jobs.push(Arc::clone(&job));
        tracing::debug!(
            job_id = id,
            layer = job.layer().name(),
            task_type = %task_type,
            threads = job.thread_count(),
            tiles = job.range().tile_count(),
            "Created job"
        );
        job
    }

    /// Submits every task of `job` to the worker pool.
    ///
    /// Blocks while the pool's queue is full.
    ///
    /// # Errors
    ///
    /// Rejects jobs created by another breeder, jobs already dispatched and
    /// dispatches after [`shutdown`](Self::shutdown), with no side effects.
    /// If the pool stops accepting work part way through, the tasks that
    /// were not queued end `DEAD`.
    pub fn dispatch_job(&self, job: &Arc<Job>) -> Result<(), SeedError> {
        if job.breeder_id() != self.id {
            return Err(SeedError::ForeignJob { job_id: job.id() });
        }

        let mut state = self.state.write();
        if job.is_dispatched() {
            return Err(SeedError::AlreadyDispatched { job_id: job.id() });
        }
        if self.pool.is_shut_down() {
            return Err(PoolError::ShutDown.into());
        }
        job.mark_dispatched();

        let mut task_ids = Vec::with_capacity(job.tasks().len());
        for (index, task) in job.tasks().iter().enumerate() {
            let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
            task.schedule(task_id);

            let submitted = {
                let job = Arc::clone(job);
                let task = Arc::clone(task);
                self.pool.submit(move || task.execute(&job))
            };
            let handle = match submitted {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(
                        job_id = job.id(),
                        queued = index,
                        error = %err,
                        "Pool rejected task, abandoning the rest of the job"
                    );
                    for unqueued in &job.tasks()[index..] {
                        unqueued.abandon(format!("not dispatched: {}", err));
                    }
                    return Err(err.into());
                }
            };
            state.registry.insert(
                task_id,
                SubmittedTask {
                    task: Arc::clone(task),
                    handle,
                },
            );
            task_ids.push(task_id);
        }
        drop(state);

        tracing::info!(
            job_id = job.id(),
            layer = job.layer().name(),
            task_type = %job.task_type(),
            task_ids = ?task_ids,
            "Dispatched job"
        );
        Ok(())
    }

    /// Resolves, creates and dispatches a job in one step.
    pub fn seed(&self, request: &SeedRequest) -> Result<Arc<Job>, SeedError> {
        let layer = self.find_tile_layer(&request.layer)?;
        let range = request.tile_range()?;
        let job = self.create_job(
            range,
            layer,
            request.task_type,
            request.threads,
            request.filter_update,
        );
        self.dispatch_job(&job)?;
        Ok(job)
    }

    /// Every job created by this breeder, oldest first.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.state.read().jobs.clone()
    }

    pub fn job(&self, id: u64) -> Option<Arc<Job>> {
        self.state.read().jobs.iter().find(|j| j.id() == id).cloned()
    }

    // =========================================================================
    // Layers
    // =========================================================================

    pub fn find_tile_layer(&self, name: &str) -> Result<Arc<dyn TileLayer>, SeedError> {
        self.layers
            .layer(name)
            .ok_or_else(|| SeedError::UnknownLayer(name.to_string()))
    }

    pub fn layers(&self) -> Vec<Arc<dyn TileLayer>> {
        self.layers.layers()
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Legacy status tuples of registered tasks, in task id order.
    ///
    /// See [`TaskStatus::as_tuple`].
    pub fn status_list(&self, layer: Option<&str>) -> Vec<[i64; 5]> {
        self.task_status_list(layer)
            .iter()
            .map(TaskStatus::as_tuple)
            .collect()
    }

    /// Status of every registered task, in task id order.
    pub fn task_status_list(&self, layer: Option<&str>) -> Vec<TaskStatus> {
        let statuses = {
            let state = self.state.read();
            state
                .registry
                .values()
                .filter(|s| layer_matches(&s.task, layer))
                .map(|s| s.task.status())
                .collect()
        };
        self.drain();
        statuses
    }

    /// Status of every job ever created, oldest first.
    pub fn job_status_list(&self, layer: Option<&str>) -> Vec<JobStatus> {
        let jobs: Vec<_> = {
            let state = self.state.read();
            state
                .jobs
                .iter()
                .filter(|j| layer.map_or(true, |l| j.layer().name() == l))
                .cloned()
                .collect()
        };
        let statuses = jobs.iter().map(|j| j.status()).collect();
        self.drain();
        statuses
    }

    /// Removes completed entries from the registry, returning how many.
    pub fn drain(&self) -> usize {
        let mut state = self.state.write();
        let purged = self.pool.purge();
        let before = state.registry.len();
        state.registry.retain(|_, s| !s.handle.is_done());
        let removed = before - state.registry.len();
        drop(state);

        if removed > 0 || purged > 0 {
            tracing::debug!(removed, purged, "Drained task registry");
        }
        removed
    }

    /// Registered tasks currently in any of `states`.
    pub fn filter_tasks(&self, states: &[TaskState]) -> Vec<Arc<Task>> {
        self.state
            .read()
            .registry
            .values()
            .filter(|s| states.contains(&s.task.state()))
            .map(|s| Arc::clone(&s.task))
            .collect()
    }

    pub fn running_tasks(&self) -> Vec<Arc<Task>> {
        self.drain();
        self.filter_tasks(&[TaskState::Running])
    }

    pub fn pending_tasks(&self) -> Vec<Arc<Task>> {
        self.drain();
        self.filter_tasks(&[TaskState::Ready, TaskState::Unset])
    }

    pub fn running_and_pending_tasks(&self) -> Vec<Arc<Task>> {
        self.drain();
        self.filter_tasks(&[TaskState::Ready, TaskState::Unset, TaskState::Running])
    }

    /// Entries currently held in the registry, drained or not.
    pub fn registered_tasks(&self) -> usize {
        self.state.read().registry.len()
    }

    // =========================================================================
    // Termination
    // =========================================================================

    /// Forgets the task and asks it to stop. Returns whether it was registered.
    pub fn terminate_task(&self, task_id: u64) -> bool {
        let removed = self.state.write().registry.remove(&task_id);
        match removed {
            Some(submitted) => {
                submitted.handle.cancel();
                submitted.task.terminate();
                true
            }
            None => {
                tracing::debug!(task_id, "Termination requested for unknown task");
                false
            }
        }
    }

    /// Terminates every registered task, optionally only those of `layer`.
    pub fn terminate_all(&self, layer: Option<&str>) -> usize {
        let removed: Vec<SubmittedTask> = {
            let mut state = self.state.write();
            let ids: Vec<u64> = state
                .registry
                .iter()
                .filter(|(_, s)| layer_matches(&s.task, layer))
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| state.registry.remove(id))
                .collect()
        };

        for submitted in &removed {
            submitted.handle.cancel();
            submitted.task.terminate();
        }
        tracing::info!(layer, tasks = removed.len(), "Terminated tasks");
        removed.len()
    }

    /// Terminates all tasks and joins the worker pool.
    pub fn shutdown(&self) {
        if self.pool.is_shut_down() {
            return;
        }
        self.terminate_all(None);
        self.pool.shutdown();
        tracing::info!(breeder_id = self.id, "Tile breeder shut down");
    }
}

impl Drop for TileBreeder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TileBreeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileBreeder")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}

fn layer_matches(task: &Task, layer: Option<&str>) -> bool {
    layer.map_or(true, |l| task.layer_name() == l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::layer::{FailureMode, MemoryLayer, MemoryLayerDispatcher, MemoryStorage};
    use crate::seed::fixtures;
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn breeder_with(layer: Arc<MemoryLayer>) -> TileBreeder {
        let dispatcher = Arc::new(MemoryLayerDispatcher::new());
        let storage: Arc<dyn StorageBroker> = layer.storage().clone();
        dispatcher.add(layer);
        let config = BreederConfig {
            seed: SeedConfig::default(),
            pool: PoolConfig::new(4, 64),
        };
        TileBreeder::new(config, dispatcher, storage).unwrap()
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn test_truncate_always_single_task() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let breeder = breeder_with(layer.clone());
        for threads in [-3, 0, 1, 8] {
            let job = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Truncate, threads, false);
            assert_eq!(job.tasks().len(), 1);
        }
    }

    #[test]
    fn test_seed_thread_count() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let breeder = breeder_with(layer.clone());

        let job = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Seed, 5, false);
        assert_eq!(job.tasks().len(), 5);
        let job = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Reseed, 0, false);
        assert_eq!(job.tasks().len(), 1);
        assert_eq!(job.task_type(), TaskType::Reseed);
    }

    #[test]
    fn test_created_job_is_registered_but_not_dispatched() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let breeder = breeder_with(layer.clone());

        let job = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Seed, 2, false);

        assert_eq!(breeder.jobs().len(), 1);
        assert!(breeder.job(job.id()).is_some());
        assert_eq!(breeder.registered_tasks(), 0);
        assert!(job.tasks().iter().all(|t| t.state() == TaskState::Unset && t.id().is_none()));
        assert_eq!(job.breeder_id(), breeder.id());
    }

    #[test]
    fn test_identities_increase() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let breeder = breeder_with(layer.clone());

        let first = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Seed, 2, false);
        let second = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Seed, 3, false);
        assert_eq!(first.id(), 0);
        assert_eq!(second.id(), 1);

        // Dispatch order, not creation order, decides task ids.
        breeder.dispatch_job(&second).unwrap();
        breeder.dispatch_job(&first).unwrap();

        let second_ids: Vec<_> = second.tasks().iter().filter_map(|t| t.id()).collect();
        let first_ids: Vec<_> = first.tasks().iter().filter_map(|t| t.id()).collect();
        assert_eq!(second_ids, vec![1, 2, 3]);
        assert_eq!(first_ids, vec![4, 5]);
    }

    #[test]
    fn test_dispatch_foreign_job_rejected() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let ours = breeder_with(layer.clone());
        let theirs = breeder_with(layer.clone());

        let job = theirs.create_job(fixtures::small_range(), layer.clone(), TaskType::Seed, 2, false);
        let err = ours.dispatch_job(&job).unwrap_err();

        assert!(matches!(err, SeedError::ForeignJob { job_id } if job_id == job.id()));
        assert_eq!(ours.registered_tasks(), 0);
        assert!(!job.is_dispatched());
        assert!(job.tasks().iter().all(|t| t.state() == TaskState::Unset));
    }

    #[test]
    fn test_dispatch_twice_rejected() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let breeder = breeder_with(layer.clone());
        let job = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Seed, 1, false);

        breeder.dispatch_job(&job).unwrap();
        assert!(matches!(
            breeder.dispatch_job(&job),
            Err(SeedError::AlreadyDispatched { .. })
        ));
    }

    #[test]
    fn test_dispatch_after_shutdown_leaves_job_untouched() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let breeder = breeder_with(layer.clone());
        let job = breeder.create_job(fixtures::small_range(), layer.clone(), TaskType::Seed, 2, false);

        breeder.shutdown();
        let err = breeder.dispatch_job(&job).unwrap_err();

        assert!(matches!(err, SeedError::Pool(PoolError::ShutDown)));
        assert!(!job.is_dispatched());
        assert!(job.tasks().iter().all(|t| t.state() == TaskState::Unset && t.id().is_none()));
        assert_eq!(breeder.registered_tasks(), 0);

        // Still refused for the same reason, not as a second dispatch
        assert!(matches!(
            breeder.dispatch_job(&job),
            Err(SeedError::Pool(PoolError::ShutDown))
        ));
        assert_eq!(layer.renders(), 0);
    }

    #[test]
    fn test_seed_completes_and_drains() {
        let layer = fixtures::memory_layer(FailureMode::Never);
        let breeder = breeder_with(layer.clone());

        let request = SeedRequest::new("roads", TaskType::Seed)
            .with_zooms(0, 4)
            .with_threads(3);
        let job = breeder.seed(&request).unwrap();

        assert!(wait_until(|| job.state() == TaskState::Done));
        assert_eq!(layer.storage().len() as u64, job.range().tile_count());

        // Handles finish just after task state; keep draining until empty.
        assert!(wait_until(|| {
            breeder.drain();
            breeder.registered_tasks() == 0
        }));
        assert!(breeder.task_status_list(None).is_empty());
        assert_eq!(breeder.job_status_list(None)[0].state, TaskState::Done);
    }

    #[test]
    fn test_seed_unknown_layer() {
        let breeder = breeder_with(fixtures::memory_layer(FailureMode::Never));
        let err = breeder
            .seed(&SeedRequest::new("rivers", TaskType::Seed))
            .unwrap_err();

        assert!(matches!(err, SeedError::UnknownLayer(name) if name == "rivers"));
        assert!(breeder.jobs().is_empty());
    }

    #[test]
    fn test_terminate_unknown_task() {
        let breeder = breeder_with(fixtures::memory_layer(FailureMode::Never));
        assert!(!breeder.terminate_task(42));
    }

    #[test]
    fn test_status_filtered_by_layer() {
        let storage = Arc::new(MemoryStorage::new());
        let roads = Arc::new(
            MemoryLayer::new("roads", Default::default(), storage.clone())
                .with_latency(Duration::from_millis(20)),
        );
        let rivers = Arc::new(
            MemoryLayer::new("rivers", Default::default(), storage.clone())
                .with_latency(Duration::from_millis(20)),
        );
        let dispatcher = Arc::new(MemoryLayerDispatcher::new());
        dispatcher.add(roads);
        dispatcher.add(rivers);
        let breeder = TileBreeder::new(
            BreederConfig {
                seed: SeedConfig::default(),
                pool: PoolConfig::new(4, 16),
            },
            dispatcher,
            storage,
        )
        .unwrap();

        let a = breeder
            .seed(&SeedRequest::new("roads", TaskType::Seed).with_zooms(0, 6).with_threads(2))
            .unwrap();
        let b = breeder
            .seed(&SeedRequest::new("rivers", TaskType::Seed).with_zooms(0, 6))
            .unwrap();

        let roads_only = breeder.task_status_list(Some("roads"));
        assert_eq!(roads_only.len(), 2);
        assert!(roads_only.iter().all(|s| s.layer == "roads"));
        assert_eq!(breeder.status_list(None).len(), 3);
        assert_eq!(breeder.job_status_list(Some("rivers")).len(), 1);

        assert_eq!(breeder.terminate_all(Some("roads")), 2);
        assert!(wait_until(|| a.state() == TaskState::Dead));
        assert_eq!(breeder.registered_tasks(), 1);

        b.terminate();
        assert!(wait_until(|| b.state() == TaskState::Dead));
        breeder.shutdown();
    }

    #[test]
    fn test_pool_core_size() {
        let breeder = breeder_with(fixtures::memory_layer(FailureMode::Never));
        assert_eq!(breeder.pool_core_size(), 4);
    }
}
