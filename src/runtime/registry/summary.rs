//! Serializable task snapshots for status surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{TaskId, TaskState};

/// Read-only snapshot of a task, as reported to pollers.
///
/// Serializes to camelCase JSON; `started`, `finished`, `success` and `error`
/// are omitted until they are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary<C> {
    pub task_id: TaskId,
    /// Display name.
    #[serde(rename = "task")]
    pub display_name: String,
    pub context: C,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub state: TaskState,
    pub submitted: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    /// `None` while the task is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Failure cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
