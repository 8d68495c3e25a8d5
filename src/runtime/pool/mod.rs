//! Bounded-growth worker pool
//!
//! Jobs run on between zero and `max_workers` OS threads. Jobs beyond what the
//! live workers can take wait in an unbounded FIFO queue, so `execute` never
//! rejects work while the pool is open. A worker that sees no job for
//! `idle_timeout` retires, which lets an unused pool shrink back to zero
//! threads.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use taskpool::runtime::pool::{PoolSettings, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolSettings {
//!     max_workers: 2,
//!     idle_timeout: Duration::from_secs(1),
//!     ..PoolSettings::default()
//! });
//! pool.execute(Box::new(|| println!("hello from a worker"))).unwrap();
//! pool.shutdown();
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

/// A unit of work the pool can run.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Upper bound on concurrently live worker threads.
    pub max_workers: usize,
    /// How long a worker waits for a job before retiring.
    pub idle_timeout: Duration,
    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            idle_timeout: Duration::from_secs(120),
            thread_name: "taskpool-worker".to_string(),
        }
    }
}

/// Pool errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool no longer accepts jobs.
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Worker threads currently alive.
    pub live_workers: usize,
    /// Live workers waiting for a job.
    pub idle_workers: usize,
    /// Jobs waiting in the queue.
    pub queued_jobs: usize,
    /// Jobs run to completion since the pool was created.
    pub completed_jobs: usize,
}

/// Worker bookkeeping, guarded by one lock.
///
/// Jobs are enqueued while this lock is held, so a worker that checks the
/// queue under the same lock before retiring can never strand a job.
struct PoolState {
    sender: Option<Sender<Job>>,
    live: usize,
    idle: usize,
    next_worker: usize,
    handles: HashMap<usize, thread::JoinHandle<()>>,
}

struct PoolShared {
    settings: PoolSettings,
    receiver: Receiver<Job>,
    state: Mutex<PoolState>,
    completed: AtomicUsize,
}

/// Worker pool with lazy thread creation and idle retirement.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("settings", &self.shared.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool. No threads are started until the first job arrives.
    pub fn new(settings: PoolSettings) -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            shared: Arc::new(PoolShared {
                settings,
                receiver,
                state: Mutex::new(PoolState {
                    sender: Some(sender),
                    live: 0,
                    idle: 0,
                    next_worker: 0,
                    handles: HashMap::new(),
                }),
                completed: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the pool settings.
    #[inline]
    pub fn settings(&self) -> &PoolSettings {
        &self.shared.settings
    }

    /// Queue a job, starting a new worker if every live worker is busy and
    /// the pool is below `max_workers`.
    pub fn execute(
        &self,
        job: Job,
    ) -> Result<(), PoolError> {
        let mut state = self.shared.state.lock();
        let sender = state.sender.as_ref().ok_or(PoolError::ShutDown)?;
        sender.send(job).map_err(|_| PoolError::ShutDown)?;

        let queued = self.shared.receiver.len();
        if queued > state.idle && state.live < self.shared.settings.max_workers {
            if let Err(err) = Self::spawn_worker(&self.shared, &mut state) {
                // The job stays queued; the next execute retries the spawn.
                warn!(
                    "failed to start worker ({} live, {} queued): {}",
                    state.live, queued, err
                );
            }
        }
        Ok(())
    }

    /// Start one worker thread. Called with the state lock held.
    fn spawn_worker(
        shared: &Arc<PoolShared>,
        state: &mut PoolState,
    ) -> std::io::Result<()> {
        let worker_id = state.next_worker;
        let worker_shared = Arc::clone(shared);
        let handle = thread::Builder::new()
            .name(format!("{}-{}", shared.settings.thread_name, worker_id))
            .spawn(move || Self::worker_loop(worker_id, &worker_shared))?;

        state.next_worker += 1;
        state.live += 1;
        state.handles.insert(worker_id, handle);
        debug!("worker {} started ({} live)", worker_id, state.live);
        Ok(())
    }

    /// Worker thread main loop.
    fn worker_loop(
        worker_id: usize,
        shared: &Arc<PoolShared>,
    ) {
        loop {
            shared.state.lock().idle += 1;
            let received = shared.receiver.recv_timeout(shared.settings.idle_timeout);

            let mut state = shared.state.lock();
            state.idle -= 1;
            match received {
                Ok(job) => {
                    // Counted as idle while dequeuing, so `execute` may have
                    // skipped a spawn the remaining queue needs.
                    if state.sender.is_some()
                        && shared.receiver.len() > state.idle
                        && state.live < shared.settings.max_workers
                    {
                        if let Err(err) = Self::spawn_worker(shared, &mut state) {
                            warn!("failed to start worker: {}", err);
                        }
                    }
                    drop(state);
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("job panicked on worker {}", worker_id);
                    }
                    shared.completed.fetch_add(1, Ordering::SeqCst);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !shared.receiver.is_empty() {
                        continue;
                    }
                    state.live -= 1;
                    state.handles.remove(&worker_id);
                    debug!("worker {} retired after idle timeout", worker_id);
                    return;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    state.live -= 1;
                    debug!("worker {} exiting, pool shut down", worker_id);
                    return;
                }
            }
        }
    }

    /// Get a snapshot of pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            live_workers: state.live,
            idle_workers: state.idle,
            queued_jobs: self.shared.receiver.len(),
            completed_jobs: self.shared.completed.load(Ordering::SeqCst),
        }
    }

    /// Check if the pool has been shut down.
    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().sender.is_none()
    }

    /// Stop accepting jobs, let the workers drain the queue, and join them.
    ///
    /// Safe to call more than once and from a worker thread; a worker never
    /// joins itself.
    pub fn shutdown(&self) {
        let handles = {
            let mut state = self.shared.state.lock();
            if state.sender.take().is_none() {
                return;
            }
            std::mem::take(&mut state.handles)
        };

        let current = thread::current().id();
        for (worker_id, handle) in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker {} panicked during shutdown", worker_id);
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests;
