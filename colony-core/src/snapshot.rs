//! System snapshot and checkpoint types.
//!
//! Both are append-only, persistent-only entities: snapshots for trend
//! analysis, checkpoints for recoverability (e.g., pre-migration state).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Point-in-time aggregate over current agent/task state.
///
/// Computed by a single aggregating write; never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub total_agents: i64,
    pub active_agents: i64,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub failed_tasks: i64,
    pub average_context_usage: f64,
    /// completed / (completed + failed); 1.0 when no terminal tasks exist.
    pub quality_score: f64,
    pub metadata: JsonValue,
}

/// A named, arbitrary JSON payload persisted for recoverability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub checkpoint_name: String,
    pub timestamp: DateTime<Utc>,
    pub data: JsonValue,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time.
    pub fn new(name: impl Into<String>, data: JsonValue) -> Self {
        Self {
            id: crate::new_id(),
            checkpoint_name: name.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_new() {
        let cp = Checkpoint::new("pre_migration", serde_json::json!({"agents": 3}));
        assert_eq!(cp.checkpoint_name, "pre_migration");
        assert_eq!(cp.data["agents"], 3);
        assert!(!cp.id.is_empty());
    }
}
