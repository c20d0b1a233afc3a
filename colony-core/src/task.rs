//! Task entity and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Default priority assigned when a task is created without one.
pub const DEFAULT_TASK_PRIORITY: i32 = 5;

// ============================================================================
// TASK STATUS
// ============================================================================

/// Lifecycle status of a task.
///
/// Transitions: pending -> assigned -> (in_progress) -> completed | failed.
/// Assignment is the only transition requiring compare-and-set semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, TaskStatusParseError> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(TaskStatusParseError(s.to_string())),
        }
    }

    /// True for completed/failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid task status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid task status: {}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ============================================================================
// TASK ENTITY
// ============================================================================

/// A unit of work tracked by the persistent store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store-generated unique identifier (uuid-v7 string).
    pub task_id: String,
    pub status: TaskStatus,
    /// Assigned agent; set only by assignment.
    pub agent_id: Option<String>,
    /// Higher = more urgent.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: JsonValue,
    pub result: Option<JsonValue>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a task.
///
/// `task_id` is normally left `None` (the store generates one); the migrator
/// sets it to preserve legacy identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub task_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub agent_id: Option<String>,
    pub priority: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: Option<JsonValue>,
    pub result: Option<JsonValue>,
}

impl NewTask {
    /// A pending task with the given priority and empty metadata.
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    /// Resolve this request into a full task row, filling defaults.
    pub fn into_task(self) -> Task {
        let now = Utc::now();
        Task {
            task_id: self.task_id.unwrap_or_else(crate::new_id),
            status: self.status.unwrap_or_default(),
            agent_id: self.agent_id,
            priority: self.priority.unwrap_or(DEFAULT_TASK_PRIORITY),
            created_at: self.created_at.unwrap_or(now),
            started_at: self.started_at,
            completed_at: self.completed_at,
            metadata: self
                .metadata
                .unwrap_or_else(|| JsonValue::Object(serde_json::Map::new())),
            result: self.result,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Assigned,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_db_str(status.as_db_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Assigned.is_terminal());
    }

    #[test]
    fn test_new_task_defaults() {
        let task = NewTask::default().into_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, DEFAULT_TASK_PRIORITY);
        assert!(task.agent_id.is_none());
        assert!(!task.task_id.is_empty());
    }

    #[test]
    fn test_new_task_preserves_explicit_id() {
        let task = NewTask {
            task_id: Some("legacy-42".to_string()),
            ..Default::default()
        }
        .into_task();
        assert_eq!(task.task_id, "legacy-42");
    }
}
