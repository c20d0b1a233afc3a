//! State distribution policy.
//!
//! A static table mapping each logical operation class to {store, consistency
//! level, TTL, key pattern}, plus the cache-key builders and stream names the
//! ephemeral store exposes. Collaborators interoperate through these exact
//! key conventions, so the builders here are the only place keys are formed.

use std::time::Duration;

// ============================================================================
// KEY & STREAM CONVENTIONS
// ============================================================================

/// Task-queue stream name.
pub const TASK_STREAM: &str = "tasks:pending";
/// Event stream name.
pub const EVENT_STREAM: &str = "events:system";

/// Consumer groups on the task-queue stream.
pub const TASK_PROCESSORS_GROUP: &str = "task_processors";
pub const PRIORITY_PROCESSORS_GROUP: &str = "priority_processors";

/// Consumer groups on the event stream.
pub const MONITORING_GROUP: &str = "monitoring";
pub const ANALYTICS_GROUP: &str = "analytics";

/// Default TTLs in seconds. These are configuration defaults, not fixed
/// constants: `RedisConfig` carries the live values.
pub const DEFAULT_AGENT_STATE_TTL_SECS: u64 = 3600;
pub const DEFAULT_TASK_CACHE_TTL_SECS: u64 = 1800;
pub const DEFAULT_COORDINATION_TTL_SECS: u64 = 300;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_METRIC_TTL_SECS: u64 = 86400;

/// Cache key for an agent's denormalized state.
pub fn agent_state_key(agent_id: &str) -> String {
    format!("agent:state:{agent_id}")
}

/// Cache key for a task's short-TTL copy.
pub fn task_cache_key(task_id: &str) -> String {
    format!("task:cache:{task_id}")
}

/// Key for in-flight coordination state.
pub fn coord_key(operation_id: &str) -> String {
    format!("coord:{operation_id}")
}

/// Key for a session blob.
pub fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// Key for a self-expiring counter.
pub fn metric_key(name: &str) -> String {
    format!("metrics:{name}")
}

// ============================================================================
// DISTRIBUTION POLICY TABLE
// ============================================================================

/// Consistency level an operation class is routed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consistency {
    /// Durably and immediately visible in the source of truth.
    Strong,
    /// Secondary views may be stale up to the TTL window.
    Eventual,
    /// Read strategy: cache first, source of truth on miss.
    CacheAside,
}

/// Which store(s) an operation class touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTarget {
    Persistent,
    Ephemeral,
    /// Persistent first, ephemeral as a dependent side effect.
    Both,
}

/// Write/read strategy applied by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Write the persistent store only; the cache is at most refreshed
    /// afterward as a best-effort side effect, never the system of record.
    DirectWrite,
    /// Write the persistent store first, then overwrite the cache entry
    /// with the freshly read full state (not the partial update).
    WriteThrough,
    /// Try the cache; on miss read the persistent store and populate the
    /// cache before returning.
    CacheAside,
    /// Ephemeral-only (streams, metrics, coordination, sessions).
    EphemeralOnly,
}

/// Every operation the orchestrator routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    RegisterAgent,
    CreateTask,
    AssignTask,
    CreateCheckpoint,
    CreateSystemSnapshot,
    UpdateAgentState,
    CacheTask,
    PublishEvent,
    IncrementMetric,
    GetAgentState,
    GetTask,
    QueueTask,
    ConsumeTasks,
    CoordinationState,
    Session,
}

/// One row of the distribution policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatePolicy {
    pub store: StoreTarget,
    pub consistency: Consistency,
    pub strategy: Strategy,
    /// Default TTL applied to any cache entry the operation writes.
    pub ttl_secs: Option<u64>,
    /// Key pattern for the ephemeral side, if any.
    pub key_pattern: Option<&'static str>,
}

impl StatePolicy {
    /// Policy TTL as a `Duration`, in the form the ephemeral store takes it.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Look up the policy row for an operation class.
pub const fn policy_for(op: OperationClass) -> StatePolicy {
    match op {
        // Strongly consistent: persistent store only, cache as side effect.
        OperationClass::RegisterAgent => StatePolicy {
            store: StoreTarget::Persistent,
            consistency: Consistency::Strong,
            strategy: Strategy::DirectWrite,
            ttl_secs: Some(DEFAULT_AGENT_STATE_TTL_SECS),
            key_pattern: Some("agent:state:{agent_id}"),
        },
        OperationClass::CreateTask | OperationClass::AssignTask => StatePolicy {
            store: StoreTarget::Persistent,
            consistency: Consistency::Strong,
            strategy: Strategy::DirectWrite,
            ttl_secs: None,
            key_pattern: Some("task:cache:{task_id}"),
        },
        OperationClass::CreateCheckpoint | OperationClass::CreateSystemSnapshot => StatePolicy {
            store: StoreTarget::Persistent,
            consistency: Consistency::Strong,
            strategy: Strategy::DirectWrite,
            ttl_secs: None,
            key_pattern: None,
        },
        // Eventually consistent: write-through to the cache.
        OperationClass::UpdateAgentState => StatePolicy {
            store: StoreTarget::Both,
            consistency: Consistency::Eventual,
            strategy: Strategy::WriteThrough,
            ttl_secs: Some(DEFAULT_AGENT_STATE_TTL_SECS),
            key_pattern: Some("agent:state:{agent_id}"),
        },
        OperationClass::CacheTask => StatePolicy {
            store: StoreTarget::Both,
            consistency: Consistency::Eventual,
            strategy: Strategy::WriteThrough,
            ttl_secs: Some(DEFAULT_TASK_CACHE_TTL_SECS),
            key_pattern: Some("task:cache:{task_id}"),
        },
        OperationClass::PublishEvent => StatePolicy {
            store: StoreTarget::Ephemeral,
            consistency: Consistency::Eventual,
            strategy: Strategy::EphemeralOnly,
            ttl_secs: None,
            key_pattern: Some("events:system"),
        },
        OperationClass::IncrementMetric => StatePolicy {
            store: StoreTarget::Ephemeral,
            consistency: Consistency::Eventual,
            strategy: Strategy::EphemeralOnly,
            ttl_secs: Some(DEFAULT_METRIC_TTL_SECS),
            key_pattern: Some("metrics:{name}"),
        },
        // Reads of agent/task state: cache-aside.
        OperationClass::GetAgentState => StatePolicy {
            store: StoreTarget::Both,
            consistency: Consistency::CacheAside,
            strategy: Strategy::CacheAside,
            ttl_secs: Some(DEFAULT_AGENT_STATE_TTL_SECS),
            key_pattern: Some("agent:state:{agent_id}"),
        },
        OperationClass::GetTask => StatePolicy {
            store: StoreTarget::Both,
            consistency: Consistency::CacheAside,
            strategy: Strategy::CacheAside,
            ttl_secs: Some(DEFAULT_TASK_CACHE_TTL_SECS),
            key_pattern: Some("task:cache:{task_id}"),
        },
        // Ephemeral-only plumbing.
        OperationClass::QueueTask | OperationClass::ConsumeTasks => StatePolicy {
            store: StoreTarget::Ephemeral,
            consistency: Consistency::Eventual,
            strategy: Strategy::EphemeralOnly,
            ttl_secs: None,
            key_pattern: Some("tasks:pending"),
        },
        OperationClass::CoordinationState => StatePolicy {
            store: StoreTarget::Ephemeral,
            consistency: Consistency::Eventual,
            strategy: Strategy::EphemeralOnly,
            ttl_secs: Some(DEFAULT_COORDINATION_TTL_SECS),
            key_pattern: Some("coord:{operation_id}"),
        },
        OperationClass::Session => StatePolicy {
            store: StoreTarget::Ephemeral,
            consistency: Consistency::Eventual,
            strategy: Strategy::EphemeralOnly,
            ttl_secs: Some(DEFAULT_SESSION_TTL_SECS),
            key_pattern: Some("session:{session_id}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(agent_state_key("a1"), "agent:state:a1");
        assert_eq!(task_cache_key("t1"), "task:cache:t1");
        assert_eq!(coord_key("op9"), "coord:op9");
        assert_eq!(session_key("s3"), "session:s3");
        assert_eq!(metric_key("assignments"), "metrics:assignments");
    }

    #[test]
    fn test_strong_operations_target_persistent_only() {
        for op in [
            OperationClass::CreateTask,
            OperationClass::AssignTask,
            OperationClass::CreateCheckpoint,
            OperationClass::CreateSystemSnapshot,
        ] {
            let policy = policy_for(op);
            assert_eq!(policy.consistency, Consistency::Strong);
            assert_eq!(policy.store, StoreTarget::Persistent);
            assert_eq!(policy.strategy, Strategy::DirectWrite);
        }
        // register_agent is strong but refreshes the agent cache key.
        let policy = policy_for(OperationClass::RegisterAgent);
        assert_eq!(policy.consistency, Consistency::Strong);
        assert_eq!(policy.key_pattern, Some("agent:state:{agent_id}"));
    }

    #[test]
    fn test_eventual_operations_write_through() {
        let policy = policy_for(OperationClass::UpdateAgentState);
        assert_eq!(policy.consistency, Consistency::Eventual);
        assert_eq!(policy.strategy, Strategy::WriteThrough);
        assert_eq!(policy.ttl_secs, Some(DEFAULT_AGENT_STATE_TTL_SECS));

        let policy = policy_for(OperationClass::CacheTask);
        assert_eq!(policy.strategy, Strategy::WriteThrough);
        assert_eq!(policy.ttl_secs, Some(DEFAULT_TASK_CACHE_TTL_SECS));
    }

    #[test]
    fn test_agent_reads_are_cache_aside() {
        let policy = policy_for(OperationClass::GetAgentState);
        assert_eq!(policy.strategy, Strategy::CacheAside);
        assert_eq!(policy.store, StoreTarget::Both);
        assert_eq!(policy.ttl_secs, Some(3600));
    }

    #[test]
    fn test_ttl_defaults() {
        assert_eq!(
            policy_for(OperationClass::CoordinationState).ttl_secs,
            Some(300)
        );
        assert_eq!(policy_for(OperationClass::Session).ttl_secs, Some(3600));
        assert_eq!(
            policy_for(OperationClass::IncrementMetric).ttl_secs,
            Some(86400)
        );
        assert_eq!(
            policy_for(OperationClass::GetTask).cache_ttl(),
            Some(Duration::from_secs(1800))
        );
    }
}
