//! Background task registry
//!
//! [`TaskRegistry`] assigns each submitted unit of work an id, runs it on a
//! [`WorkerPool`] off the caller's thread and tracks it from running to
//! finished. Finished tasks are kept for polling until `max_finished` newer
//! completions push them out, oldest completion first.
//!
//! All bookkeeping lives in one [`TaskBook`](book::TaskBook) behind one
//! mutex; no work runs and no thread starts while it is held.
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//! use taskpool::runtime::registry::{TaskOutcome, TaskRegistry};
//!
//! let registry: TaskRegistry<&'static str> = TaskRegistry::new();
//! let task = registry
//!     .submit(|| anyhow::Ok(()), "compact", "dataset-a", Some(7))
//!     .unwrap();
//!
//! assert!(task.wait(Duration::from_secs(5)));
//! assert_eq!(task.outcome(), TaskOutcome::Succeeded);
//! assert!(registry.get_running(task.id()).is_none());
//! ```

mod book;
pub mod error;
pub mod summary;
pub mod task;

pub use error::{ContractViolation, RegistryError};
pub use summary::TaskSummary;
pub use task::{Task, TaskId, TaskIdParseError, TaskOutcome, TaskState, UnitOfWork};

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::runtime::pool::{PoolSettings, PoolStats, WorkerPool};
use crate::util::config::{ConfigError, RegistryConfig};

use book::TaskBook;
use task::CompletionSink;

/// State shared between the registry and its tasks.
struct RegistryCore<C> {
    book: Mutex<TaskBook<C>>,
}

impl<C: Send + Sync> CompletionSink<C> for RegistryCore<C> {
    fn finished(
        &self,
        task: &Arc<Task<C>>,
    ) {
        let result = self.book.lock().complete(task.id());
        match result {
            Ok(Some(evicted)) => {
                debug!("Task : {} : evicted from finished tasks", evicted.id())
            }
            Ok(None) => {}
            Err(violation) => {
                error!("{}", violation);
                panic!("{}", violation);
            }
        }
    }
}

/// Registry of background tasks.
///
/// Owned explicitly by the server and shared by reference; independent
/// instances do not interact. `C` is the opaque context carried by each task.
pub struct TaskRegistry<C = ()> {
    pool: WorkerPool,
    core: Arc<RegistryCore<C>>,
    config: RegistryConfig,
}

impl<C> std::fmt::Debug for TaskRegistry<C> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let book = self.core.book.lock();
        f.debug_struct("TaskRegistry")
            .field("running", &book.running_len())
            .field("finished", &book.finished_len())
            .field("pool", &self.pool)
            .finish()
    }
}

impl<C: Send + Sync + 'static> TaskRegistry<C> {
    /// Create a registry with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::build(RegistryConfig::default())
    }

    /// Create a registry with a custom configuration.
    pub fn with_config(config: RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RegistryConfig) -> Self {
        let pool = WorkerPool::new(PoolSettings {
            max_workers: config.pool.max_workers,
            idle_timeout: config.idle_timeout(),
            thread_name: config.pool.thread_name.clone(),
        });
        let core = Arc::new(RegistryCore {
            book: Mutex::new(TaskBook::new(config.tasks.max_finished)),
        });
        Self { pool, core, config }
    }

    /// Submit work to run in the background.
    ///
    /// Returns the task handle immediately; the work never runs on the
    /// calling thread. Fails only after [`shutdown`](Self::shutdown).
    pub fn submit<W: UnitOfWork>(
        &self,
        work: W,
        display_name: impl Into<String>,
        context: C,
        request_id: Option<u64>,
    ) -> Result<Arc<Task<C>>, RegistryError> {
        if self.pool.is_shut_down() {
            return Err(RegistryError::ShutDown);
        }
        let owner = Arc::downgrade(&self.core) as Weak<dyn CompletionSink<C>>;

        // Registered before it is queued, so its completion always finds it
        // running. The pool may start a thread, which happens outside the
        // registry lock.
        let task = {
            let mut book = self.core.book.lock();
            let id = book.allocate_id();
            let task = Arc::new(Task::new(
                id,
                display_name.into(),
                context,
                request_id,
                Box::new(work),
                owner,
            ));
            if let Err(violation) = book.insert_running(Arc::clone(&task)) {
                drop(book);
                error!("{}", violation);
                panic!("{}", violation);
            }
            task
        };

        let job_task = Arc::clone(&task);
        if self.pool.execute(Box::new(move || job_task.run())).is_err() {
            // Lost a race with shutdown.
            self.core.book.lock().withdraw(task.id());
            return Err(RegistryError::ShutDown);
        }

        info!("Task : {} : {}", task.id(), task.display_name());
        Ok(task)
    }

    /// Snapshot of every known task: running ones in submission order, then
    /// finished ones in completion order.
    pub fn list(&self) -> Vec<Arc<Task<C>>> {
        self.core.book.lock().snapshot()
    }

    /// Look up a task in any state.
    pub fn get(
        &self,
        id: TaskId,
    ) -> Option<Arc<Task<C>>> {
        self.core.book.lock().get(id)
    }

    /// Look up a task only if it is still running.
    pub fn get_running(
        &self,
        id: TaskId,
    ) -> Option<Arc<Task<C>>> {
        self.core.book.lock().get_running(id)
    }

    /// Serializable snapshot of every known task, in [`list`](Self::list)
    /// order.
    pub fn summaries(&self) -> Vec<TaskSummary<C>>
    where
        C: Clone,
    {
        self.list().iter().map(|task| task.summary()).collect()
    }

    pub fn running_count(&self) -> usize {
        self.core.book.lock().running_len()
    }

    pub fn finished_count(&self) -> usize {
        self.core.book.lock().finished_len()
    }

    /// Finished task ids, oldest completion first.
    pub fn finished_order(&self) -> Vec<TaskId> {
        self.core.book.lock().finished_order()
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get worker pool statistics.
    #[inline]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Check if the registry has been shut down.
    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }

    /// Stop accepting tasks and wait for queued and running ones to finish.
    pub fn shutdown(&self) {
        if self.pool.is_shut_down() {
            return;
        }
        info!("Task registry shutting down ({} running)", self.running_count());
        self.pool.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        self.core.book.lock().check_invariants()
    }
}

impl<C> Drop for TaskRegistry<C> {
    /// Queued and running tasks finish before the registry goes away.
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

impl<C: Send + Sync + 'static> Default for TaskRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
