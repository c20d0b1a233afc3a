//! Agent entity and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// AGENT STATUS
// ============================================================================

/// Lifecycle status of an agent.
///
/// Agents are never hard-deleted; "removal" is a transition to `Offline`
/// plus cache eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered and available for task assignment
    #[default]
    Idle,
    /// Currently executing a task
    Busy,
    /// Not participating; excluded from active-agent queries
    Offline,
}

impl AgentStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AgentStatusParseError> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "busy" => Ok(AgentStatus::Busy),
            "offline" => Ok(AgentStatus::Offline),
            _ => Err(AgentStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AgentStatus {
    type Err = AgentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid agent status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatusParseError(pub String);

impl fmt::Display for AgentStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent status: {}", self.0)
    }
}

impl std::error::Error for AgentStatusParseError {}

// ============================================================================
// AGENT ENTITY
// ============================================================================

/// A registered agent.
///
/// Owned by the persistent store; a denormalized copy lives in the ephemeral
/// store under `agent:state:{agent_id}` with a bounded TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable unique identifier supplied at registration.
    pub agent_id: String,
    pub status: AgentStatus,
    /// Task this agent is currently working on, if any. When set, the
    /// referenced task's `agent_id` must equal this agent's `agent_id`.
    pub current_task_id: Option<String>,
    /// Fraction of the agent's context window in use, 0.0..=1.0.
    pub context_usage: f64,
    pub last_activity: DateTime<Utc>,
    pub capabilities: Vec<String>,
    /// Arbitrary key -> number map (latency, success rate, ...).
    pub performance_metrics: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Create a freshly registered agent with default state.
    pub fn new(agent_id: impl Into<String>, capabilities: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Idle,
            current_task_id: None,
            context_usage: 0.0,
            last_activity: now,
            capabilities,
            performance_metrics: JsonValue::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for an agent.
///
/// Any field left `None` retains its previous value (coalesce-style update,
/// not a full overwrite).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub status: Option<AgentStatus>,
    pub current_task_id: Option<String>,
    pub context_usage: Option<f64>,
    pub last_activity: Option<DateTime<Utc>>,
    pub capabilities: Option<Vec<String>>,
    pub performance_metrics: Option<JsonValue>,
}

impl AgentUpdate {
    /// An update that only sets the status.
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// True if no field is set (a no-op update).
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.current_task_id.is_none()
            && self.context_usage.is_none()
            && self.last_activity.is_none()
            && self.capabilities.is_none()
            && self.performance_metrics.is_none()
    }

    /// Apply this partial update to an agent in place.
    ///
    /// This is the single definition of coalesce semantics; both the
    /// in-memory backend and cache refreshes use it so that all stores agree
    /// on what a partial update means.
    pub fn apply_to(&self, agent: &mut Agent) {
        if let Some(status) = self.status {
            agent.status = status;
        }
        if let Some(task_id) = &self.current_task_id {
            agent.current_task_id = Some(task_id.clone());
        }
        if let Some(usage) = self.context_usage {
            agent.context_usage = usage;
        }
        if let Some(activity) = self.last_activity {
            agent.last_activity = activity;
        }
        if let Some(caps) = &self.capabilities {
            agent.capabilities = caps.clone();
        }
        if let Some(metrics) = &self.performance_metrics {
            agent.performance_metrics = metrics.clone();
        }
        agent.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [AgentStatus::Idle, AgentStatus::Busy, AgentStatus::Offline] {
            assert_eq!(AgentStatus::from_db_str(status.as_db_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_status_parse_error() {
        let err = AgentStatus::from_db_str("sleeping").unwrap_err();
        assert_eq!(err.0, "sleeping");
    }

    #[test]
    fn test_update_apply_coalesces() {
        let mut agent = Agent::new("agent-1", vec!["search".to_string()]);
        let before_caps = agent.capabilities.clone();

        let update = AgentUpdate {
            status: Some(AgentStatus::Busy),
            context_usage: Some(0.4),
            ..Default::default()
        };
        update.apply_to(&mut agent);

        assert_eq!(agent.status, AgentStatus::Busy);
        assert_eq!(agent.context_usage, 0.4);
        // Omitted fields retain their previous values
        assert_eq!(agent.capabilities, before_caps);
        assert!(agent.current_task_id.is_none());
    }

    #[test]
    fn test_empty_update() {
        assert!(AgentUpdate::default().is_empty());
        assert!(!AgentUpdate::status(AgentStatus::Idle).is_empty());
    }
}
