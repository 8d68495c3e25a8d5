//! Task definitions for the registry.
//!
//! A [`Task`] wraps one unit of submitted work together with its identity,
//! metadata and observable lifecycle. It is created by
//! [`TaskRegistry::submit`](super::TaskRegistry::submit), run once by a pool
//! worker, and reports its completion back to the registry exactly once.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::summary::TaskSummary;

/// Unique task identifier.
///
/// Allocated by the registry from a counter starting at 1; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl From<TaskId> for u64 {
    fn from(val: TaskId) -> Self {
        val.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a valid task id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid task id: {input:?}")]
pub struct TaskIdParseError {
    input: String,
}

impl FromStr for TaskId {
    type Err = TaskIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| TaskIdParseError {
                input: s.to_string(),
            })
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Submitted and not yet completed (queued or executing).
    Running,
    /// Work has returned and the outcome is recorded.
    Finished,
}

/// Result of running a task's work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "cause")]
pub enum TaskOutcome {
    /// The work has not finished.
    Pending,
    /// The work returned successfully.
    Succeeded,
    /// The work returned an error or panicked.
    Failed(String),
}

impl TaskOutcome {
    /// `Some(true)` on success, `Some(false)` on failure, `None` while pending.
    pub fn success(&self) -> Option<bool> {
        match self {
            TaskOutcome::Pending => None,
            TaskOutcome::Succeeded => Some(true),
            TaskOutcome::Failed(_) => Some(false),
        }
    }

    /// Get the failure cause, if any.
    pub fn failure(&self) -> Option<&str> {
        match self {
            TaskOutcome::Failed(cause) => Some(cause),
            _ => None,
        }
    }
}

/// A unit of work that can be submitted to the registry.
///
/// Implemented for every `FnOnce() -> Result<(), E>` closure whose error
/// converts into [`anyhow::Error`].
pub trait UnitOfWork: Send + 'static {
    /// Run the work.
    fn run(self: Box<Self>) -> anyhow::Result<()>;
}

impl<F, E> UnitOfWork for F
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Into<anyhow::Error>,
{
    fn run(self: Box<Self>) -> anyhow::Result<()> {
        (*self)().map_err(Into::into)
    }
}

/// Receiver of task completion notifications.
pub(crate) trait CompletionSink<C>: Send + Sync {
    /// Called exactly once per task, after its outcome is recorded.
    fn finished(
        &self,
        task: &Arc<Task<C>>,
    );
}

/// Mutable part of a task, written only by the executing worker.
#[derive(Debug, Clone)]
struct TaskRecord {
    state: TaskState,
    outcome: TaskOutcome,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    /// Set once the owning registry has been notified.
    settled: bool,
}

/// A submitted task.
pub struct Task<C> {
    /// Unique task ID.
    id: TaskId,
    /// Human-readable label.
    display_name: String,
    /// Opaque reference to the originating service or dataset.
    context: C,
    /// Id of the request that submitted the task.
    request_id: Option<u64>,
    /// Submission time.
    submitted_at: DateTime<Utc>,
    /// The work, taken when the task runs.
    work: Mutex<Option<Box<dyn UnitOfWork>>>,
    record: Mutex<TaskRecord>,
    done: Condvar,
    owner: Weak<dyn CompletionSink<C>>,
}

impl<C: std::fmt::Debug> std::fmt::Debug for Task<C> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let record = self.record.lock();
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("context", &self.context)
            .field("request_id", &self.request_id)
            .field("state", &record.state)
            .field("outcome", &record.outcome)
            .finish()
    }
}

impl<C> Task<C> {
    /// Create a task in the running state.
    pub(crate) fn new(
        id: TaskId,
        display_name: String,
        context: C,
        request_id: Option<u64>,
        work: Box<dyn UnitOfWork>,
        owner: Weak<dyn CompletionSink<C>>,
    ) -> Self {
        Self {
            id,
            display_name,
            context,
            request_id,
            submitted_at: Utc::now(),
            work: Mutex::new(Some(work)),
            record: Mutex::new(TaskRecord {
                state: TaskState::Running,
                outcome: TaskOutcome::Pending,
                started_at: None,
                finished_at: None,
                settled: false,
            }),
            done: Condvar::new(),
            owner,
        }
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the display name.
    #[inline]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Get the context the task was submitted with.
    #[inline]
    pub fn context(&self) -> &C {
        &self.context
    }

    #[inline]
    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    #[inline]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// When a worker began executing the work; `None` while queued.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.record.lock().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.record.lock().finished_at
    }

    /// Get the current state.
    pub fn state(&self) -> TaskState {
        self.record.lock().state
    }

    /// Get the current outcome.
    pub fn outcome(&self) -> TaskOutcome {
        self.record.lock().outcome.clone()
    }

    /// Check if the task is finished.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    /// Block until the registry has recorded this task as finished, or the
    /// timeout elapses. Returns `true` if the task settled in time.
    ///
    /// A timeout too large to express as a deadline (such as
    /// [`Duration::MAX`]) waits without limit.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut record = self.record.lock();
        while !record.settled {
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut record, deadline).timed_out() {
                        return record.settled;
                    }
                }
                None => self.done.wait(&mut record),
            }
        }
        true
    }

    /// Run the work, record the outcome and notify the owner.
    ///
    /// Failures and panics inside the work are captured as
    /// [`TaskOutcome::Failed`]; they never reach the calling worker. Running a
    /// task twice is a contract violation and panics.
    pub(crate) fn run(self: &Arc<Self>) {
        let Some(work) = self.work.lock().take() else {
            error!("Task : {} : executed more than once", self.id);
            panic!("task {} executed more than once", self.id);
        };

        self.record.lock().started_at = Some(Utc::now());
        debug!("Task : {} : started", self.id);

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work.run())) {
            Ok(Ok(())) => TaskOutcome::Succeeded,
            Ok(Err(err)) => TaskOutcome::Failed(format!("{err:#}")),
            Err(payload) => TaskOutcome::Failed(format!("panicked: {}", panic_message(&*payload))),
        };
        match &outcome {
            TaskOutcome::Failed(cause) => warn!("Task : {} : failed: {}", self.id, cause),
            _ => debug!("Task : {} : finished", self.id),
        }

        {
            let mut record = self.record.lock();
            record.outcome = outcome;
            record.finished_at = Some(Utc::now());
            record.state = TaskState::Finished;
        }

        // Waiters are released even if the owner panics.
        let _settle = Settle(Arc::as_ref(self));
        match self.owner.upgrade() {
            Some(owner) => owner.finished(self),
            None => debug!("Task : {} : registry dropped before completion", self.id),
        }
    }
}

/// Marks a task settled and wakes its waiters when dropped.
struct Settle<'a, C>(&'a Task<C>);

impl<C> Drop for Settle<'_, C> {
    fn drop(&mut self) {
        self.0.record.lock().settled = true;
        self.0.done.notify_all();
    }
}

impl<C: Clone> Task<C> {
    /// Get a serializable snapshot of the task.
    pub fn summary(&self) -> TaskSummary<C> {
        let record = self.record.lock().clone();
        TaskSummary {
            task_id: self.id,
            display_name: self.display_name.clone(),
            context: self.context.clone(),
            request_id: self.request_id,
            state: record.state,
            submitted: self.submitted_at,
            started: record.started_at,
            finished: record.finished_at,
            success: record.outcome.success(),
            error: record.outcome.failure().map(str::to_string),
        }
    }
}

/// Render a panic payload as text.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
