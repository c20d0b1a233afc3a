//! Backend trait seams for the two store managers.
//!
//! The orchestrator and migrator are generic over these traits so the real
//! PostgreSQL/Redis managers and the in-memory test doubles implement the
//! state layer uniformly. All methods here are the typed surface: failures
//! propagate as `StateError`. The sentinel surface (`false`/`None`/empty)
//! lives on the concrete managers and on the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colony_core::{
    Agent, AgentUpdate, Checkpoint, CoordinationState, NewTask, StateResult, StoreHealth,
    StreamMessage, SystemSnapshot, Task, TaskStatus,
};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Durable, transactional storage for agents, tasks, snapshots, checkpoints.
#[async_trait]
pub trait PersistentBackend: Send + Sync {
    /// Idempotent upsert: re-registration updates capabilities and
    /// last_activity rather than erroring.
    async fn try_register_agent(&self, agent_id: &str, capabilities: &[String]) -> StateResult<bool>;

    async fn try_get_agent_state(&self, agent_id: &str) -> StateResult<Option<Agent>>;

    /// Coalesce-style partial update; `Ok(false)` when no row matched.
    async fn try_update_agent_state(&self, agent_id: &str, update: &AgentUpdate) -> StateResult<bool>;

    /// Agents with status idle/busy and activity within the last hour,
    /// ordered by recency.
    async fn try_get_active_agents(&self) -> StateResult<Vec<Agent>>;

    /// Insert a task and return its (possibly generated) id.
    async fn try_create_task(&self, task: NewTask) -> StateResult<String>;

    async fn try_get_task(&self, task_id: &str) -> StateResult<Option<Task>>;

    /// Ordered by priority descending, then created_at ascending. The
    /// ordering is a contract, not an implementation detail.
    async fn try_get_pending_tasks(&self, limit: i64) -> StateResult<Vec<Task>>;

    /// Atomic conditional update: succeeds only while status is pending.
    /// `Ok(false)` means another assignment won the race.
    async fn try_assign_task(&self, task_id: &str, agent_id: &str) -> StateResult<bool>;

    /// Drive in_progress/completed/failed transitions; terminal states set
    /// completed_at.
    async fn try_update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<JsonValue>,
    ) -> StateResult<bool>;

    /// Compute aggregates across current agent/task rows in one statement
    /// and insert a snapshot row.
    async fn try_create_system_snapshot(&self) -> StateResult<bool>;

    async fn try_create_checkpoint(&self, name: &str, data: JsonValue) -> StateResult<String>;

    async fn try_get_checkpoints(
        &self,
        name_prefix: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StateResult<Vec<Checkpoint>>;

    async fn try_get_recent_snapshots(&self, limit: i64) -> StateResult<Vec<SystemSnapshot>>;

    /// Insert an already-computed snapshot row, preserving its id and
    /// timestamp. Migration path only; normal snapshots aggregate live state.
    async fn try_import_snapshot(&self, snapshot: &SystemSnapshot) -> StateResult<bool>;

    /// Insert a checkpoint preserving its id and timestamp. Migration path
    /// only.
    async fn try_import_checkpoint(&self, checkpoint: &Checkpoint) -> StateResult<bool>;

    /// Apply N partial updates within a single transaction; rolled back on
    /// fatal error. Returns the summed affected-row count.
    async fn try_batch_update_agents(&self, updates: &[(String, AgentUpdate)]) -> StateResult<u64>;

    async fn try_count_agents(&self) -> StateResult<i64>;

    async fn try_count_tasks(&self) -> StateResult<i64>;

    async fn health_check(&self) -> StoreHealth;
}

/// Low-latency cache, session/coordination storage, and append streams.
#[async_trait]
pub trait EphemeralBackend: Send + Sync {
    /// Cache an agent's denormalized state under `agent:state:{id}`.
    /// `ttl = None` uses the configured default.
    async fn try_set_agent_state(&self, agent: &Agent, ttl: Option<Duration>) -> StateResult<()>;

    async fn try_get_agent_state(&self, agent_id: &str) -> StateResult<Option<Agent>>;

    async fn try_delete_agent_state(&self, agent_id: &str) -> StateResult<()>;

    async fn try_cache_task(&self, task: &Task, ttl: Option<Duration>) -> StateResult<()>;

    async fn try_get_cached_task(&self, task_id: &str) -> StateResult<Option<Task>>;

    async fn try_delete_cached_task(&self, task_id: &str) -> StateResult<()>;

    async fn try_create_session(
        &self,
        session_id: &str,
        data: &JsonValue,
        ttl: Option<Duration>,
    ) -> StateResult<()>;

    async fn try_get_session(&self, session_id: &str) -> StateResult<Option<JsonValue>>;

    /// Refresh a session's TTL; `Ok(false)` when the session no longer
    /// exists.
    async fn try_extend_session(&self, session_id: &str, ttl: Duration) -> StateResult<bool>;

    async fn try_set_coordination_state(
        &self,
        state: &CoordinationState,
        ttl: Option<Duration>,
    ) -> StateResult<()>;

    /// Expired coordination state reads back as `None` ("no prior state").
    async fn try_get_coordination_state(&self, operation_id: &str)
        -> StateResult<Option<CoordinationState>>;

    /// Append to the task-queue stream; returns the store-assigned id.
    async fn try_queue_task(&self, task: &Task) -> StateResult<String>;

    /// Read only new messages for the group, blocking up to the configured
    /// timeout when none are available.
    async fn try_consume_tasks(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>>;

    /// Mark a task-queue message processed for the group.
    async fn try_acknowledge_task(&self, group: &str, message_id: &str) -> StateResult<bool>;

    /// Append a best-effort notification to the event stream. Delivery is
    /// at-least-once; consumers must be idempotent.
    async fn try_publish_event(&self, event_type: &str, payload: &JsonValue) -> StateResult<String>;

    async fn try_consume_events(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>>;

    async fn try_acknowledge_event(&self, group: &str, message_id: &str) -> StateResult<bool>;

    /// Atomic counter with a 24h self-expiring TTL refreshed per increment.
    async fn try_increment_metric(&self, name: &str, delta: i64) -> StateResult<i64>;

    /// Pipeline N agent-state cache writes as one round trip; returns the
    /// number written.
    async fn try_batch_cache_agents(&self, agents: &[Agent], ttl: Option<Duration>)
        -> StateResult<u64>;

    async fn health_check(&self) -> StoreHealth;
}
