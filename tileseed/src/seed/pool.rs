//! Bounded worker pool.
//!
//! A fixed set of named threads consume a FIFO queue of boxed closures.
//!
//! ```text
//!  submit() ──► [ queue (capacity N) ] ──► seed-worker-0
//!     ▲                                ──► seed-worker-1
//!     │ blocks while full              ──► ...
//! ```
//!
//! Every submission yields a [`TaskHandle`]. A handle can cancel its entry
//! only while it is still queued; cancelled entries are skipped by workers
//! and removed by [`WorkerPool::purge`].

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::PoolError;
use crate::config::PoolConfig;

type Work = Box<dyn FnOnce() + Send + 'static>;

const QUEUED: u8 = 0;
const STARTED: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

struct HandleInner {
    status: AtomicU8,
    lock: Mutex<()>,
    done: Condvar,
}

/// Completion handle for a submitted closure.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                status: AtomicU8::new(QUEUED),
                lock: Mutex::new(()),
                done: Condvar::new(),
            }),
        }
    }

    /// True once the closure has returned (or panicked), or was cancelled.
    pub fn is_done(&self) -> bool {
        matches!(self.inner.status.load(Ordering::Acquire), FINISHED | CANCELLED)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.status.load(Ordering::Acquire) == CANCELLED
    }

    /// Cancels the entry if no worker has picked it up yet.
    ///
    /// Returns `false` once the closure has started.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .inner
            .status
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.notify();
        }
        cancelled
    }

    /// Blocks until the handle is done or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_done() {
            if self.inner.done.wait_until(&mut guard, deadline).timed_out() {
                return self.is_done();
            }
        }
        true
    }

    fn start(&self) -> bool {
        self.inner
            .status
            .compare_exchange(QUEUED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.inner.status.store(FINISHED, Ordering::Release);
        self.notify();
    }

    fn notify(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.done.notify_all();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Entry {
    work: Work,
    handle: TaskHandle,
}

struct Queue {
    entries: VecDeque<Entry>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

/// Fixed-size thread pool with a bounded queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    core_size: usize,
}

impl WorkerPool {
    /// Starts `config.core_size` workers.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let core_size = config.core_size.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                entries: VecDeque::new(),
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: config.queue_capacity.max(1),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(core_size)),
            core_size,
        };

        for i in 0..core_size {
            let shared = Arc::clone(&pool.shared);
            let worker = thread::Builder::new()
                .name(format!("seed-worker-{}", i))
                .spawn(move || Self::worker_loop(shared))
                .map_err(PoolError::Spawn)?;
            pool.workers.lock().push(worker);
        }

        tracing::debug!(
            threads = core_size,
            queue_capacity = pool.shared.capacity,
            "Started worker pool"
        );
        Ok(pool)
    }

    pub fn core_size(&self) -> usize {
        self.core_size
    }

    /// Entries waiting for a worker, including cancelled ones not yet purged.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().entries.len()
    }

    /// Queues `work`, blocking while the queue is full.
    pub fn submit<F>(&self, work: F) -> Result<TaskHandle, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        while queue.entries.len() >= self.shared.capacity && !queue.shutdown {
            self.shared.not_full.wait(&mut queue);
        }
        if queue.shutdown {
            return Err(PoolError::ShutDown);
        }

        let handle = TaskHandle::new();
        queue.entries.push_back(Entry {
            work: Box::new(work),
            handle: handle.clone(),
        });
        self.shared.not_empty.notify_one();
        Ok(handle)
    }

    /// Removes cancelled entries from the queue, returning how many.
    pub fn purge(&self) -> usize {
        let mut queue = self.shared.queue.lock();
        let before = queue.entries.len();
        queue.entries.retain(|e| !e.handle.is_cancelled());
        let removed = before - queue.entries.len();
        if removed > 0 {
            self.shared.not_full.notify_all();
        }
        removed
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.lock().shutdown
    }

    /// Stops accepting work and joins the workers once the queue is empty.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        if workers.is_empty() {
            return;
        }
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Worker thread terminated abnormally");
            }
        }
        tracing::debug!("Worker pool shut down");
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let entry = {
                let mut queue = shared.queue.lock();
                loop {
                    if let Some(entry) = queue.entries.pop_front() {
                        shared.not_full.notify_one();
                        break entry;
                    }
                    if queue.shutdown {
                        return;
                    }
                    shared.not_empty.wait(&mut queue);
                }
            };

            if !entry.handle.start() {
                continue;
            }
            if panic::catch_unwind(AssertUnwindSafe(entry.work)).is_err() {
                tracing::error!(
                    worker = thread::current().name().unwrap_or("unnamed"),
                    "Submitted work panicked"
                );
            }
            entry.handle.finish();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("core_size", &self.core_size)
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}
