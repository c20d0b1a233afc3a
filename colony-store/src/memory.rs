//! In-memory backend implementations.
//!
//! Test doubles for the two store managers. They honor the same contracts as
//! the real backends (pending-task ordering, compare-and-set assignment,
//! batch atomicity, TTL expiry, per-group stream delivery) so orchestrator
//! and migration logic can be exercised without live services.
//!
//! Both expose `set_unavailable` to simulate a store outage.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use colony_core::{
    Agent, AgentStatus, AgentUpdate, Checkpoint, CoordinationState, NewTask, PoolStats,
    StateError, StateResult, StoreHealth, StreamMessage, SystemSnapshot, Task, TaskStatus,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::policy::{agent_state_key, coord_key, metric_key, session_key, task_cache_key};
use crate::traits::{EphemeralBackend, PersistentBackend};

// ============================================================================
// IN-MEMORY PERSISTENT BACKEND
// ============================================================================

#[derive(Default)]
struct PersistentState {
    agents: HashMap<String, Agent>,
    tasks: HashMap<String, Task>,
    /// Insertion order, used as the final pending-task ordering tiebreak the
    /// way a serial primary key would be.
    task_seq: HashMap<String, u64>,
    next_seq: u64,
    snapshots: Vec<SystemSnapshot>,
    checkpoints: Vec<Checkpoint>,
    unavailable: bool,
    /// When set, the next batch drops the connection after this many staged
    /// updates, before anything is committed.
    fail_after_updates: Option<u64>,
}

/// In-memory stand-in for the PostgreSQL store manager.
#[derive(Default)]
pub struct InMemoryPersistent {
    state: Mutex<PersistentState>,
}

impl InMemoryPersistent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Simulate a connection drop after `n` staged updates of the next
    /// batch, mid-transaction.
    pub fn fail_after_updates(&self, n: u64) {
        self.lock().fail_after_updates = Some(n);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PersistentState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn checked(&self) -> StateResult<std::sync::MutexGuard<'_, PersistentState>> {
        let guard = self.lock();
        if guard.unavailable {
            return Err(StateError::postgres("store unavailable"));
        }
        Ok(guard)
    }
}

#[async_trait]
impl PersistentBackend for InMemoryPersistent {
    async fn try_register_agent(
        &self,
        agent_id: &str,
        capabilities: &[String],
    ) -> StateResult<bool> {
        let mut state = self.checked()?;
        match state.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.capabilities = capabilities.to_vec();
                agent.last_activity = Utc::now();
                agent.updated_at = Utc::now();
            }
            None => {
                state.agents.insert(
                    agent_id.to_string(),
                    Agent::new(agent_id, capabilities.to_vec()),
                );
            }
        }
        Ok(true)
    }

    async fn try_get_agent_state(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        Ok(self.checked()?.agents.get(agent_id).cloned())
    }

    async fn try_update_agent_state(
        &self,
        agent_id: &str,
        update: &AgentUpdate,
    ) -> StateResult<bool> {
        let mut state = self.checked()?;
        match state.agents.get_mut(agent_id) {
            Some(agent) => {
                update.apply_to(agent);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_get_active_agents(&self) -> StateResult<Vec<Agent>> {
        let cutoff = Utc::now() - ChronoDuration::hours(1);
        let mut agents: Vec<Agent> = self
            .checked()?
            .agents
            .values()
            .filter(|a| {
                matches!(a.status, AgentStatus::Idle | AgentStatus::Busy)
                    && a.last_activity >= cutoff
            })
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(agents)
    }

    async fn try_create_task(&self, task: NewTask) -> StateResult<String> {
        let mut state = self.checked()?;
        let task = task.into_task();
        let task_id = task.task_id.clone();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.task_seq.insert(task_id.clone(), seq);
        state.tasks.insert(task_id.clone(), task);
        Ok(task_id)
    }

    async fn try_get_task(&self, task_id: &str) -> StateResult<Option<Task>> {
        Ok(self.checked()?.tasks.get(task_id).cloned())
    }

    async fn try_get_pending_tasks(&self, limit: i64) -> StateResult<Vec<Task>> {
        let state = self.checked()?;
        let mut pending: Vec<(&Task, u64)> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| (t, state.task_seq.get(&t.task_id).copied().unwrap_or(0)))
            .collect();
        pending.sort_by(|(a, a_seq), (b, b_seq)| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a_seq.cmp(b_seq))
        });
        Ok(pending
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(t, _)| t.clone())
            .collect())
    }

    async fn try_assign_task(&self, task_id: &str, agent_id: &str) -> StateResult<bool> {
        // The whole check-and-set happens under one lock, mirroring the
        // single conditional UPDATE the real store issues.
        let mut state = self.checked()?;
        match state.tasks.get_mut(task_id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Assigned;
                task.agent_id = Some(agent_id.to_string());
                task.started_at = Some(Utc::now());
                task.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn try_update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<JsonValue>,
    ) -> StateResult<bool> {
        let mut state = self.checked()?;
        match state.tasks.get_mut(task_id) {
            Some(task) => {
                task.status = status;
                if status.is_terminal() {
                    task.completed_at = Some(Utc::now());
                }
                if let Some(result) = result {
                    task.result = Some(result);
                }
                task.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_create_system_snapshot(&self) -> StateResult<bool> {
        let mut state = self.checked()?;
        let total_agents = state.agents.len() as i64;
        let active_agents = state
            .agents
            .values()
            .filter(|a| matches!(a.status, AgentStatus::Idle | AgentStatus::Busy))
            .count() as i64;
        let total_tasks = state.tasks.len() as i64;
        let completed = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .count() as i64;
        let failed = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed)
            .count() as i64;
        let average_context_usage = if state.agents.is_empty() {
            0.0
        } else {
            state.agents.values().map(|a| a.context_usage).sum::<f64>()
                / state.agents.len() as f64
        };
        let quality_score = if completed + failed == 0 {
            1.0
        } else {
            completed as f64 / (completed + failed) as f64
        };
        state.snapshots.push(SystemSnapshot {
            id: colony_core::new_id(),
            timestamp: Utc::now(),
            total_agents,
            active_agents,
            total_tasks,
            completed_tasks: completed,
            failed_tasks: failed,
            average_context_usage,
            quality_score,
            metadata: JsonValue::Object(serde_json::Map::new()),
        });
        Ok(true)
    }

    async fn try_create_checkpoint(&self, name: &str, data: JsonValue) -> StateResult<String> {
        let mut state = self.checked()?;
        let checkpoint = Checkpoint::new(name, data);
        let id = checkpoint.id.clone();
        state.checkpoints.push(checkpoint);
        Ok(id)
    }

    async fn try_get_checkpoints(
        &self,
        name_prefix: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StateResult<Vec<Checkpoint>> {
        let state = self.checked()?;
        let mut checkpoints: Vec<Checkpoint> = state
            .checkpoints
            .iter()
            .filter(|c| name_prefix.map_or(true, |p| c.checkpoint_name.starts_with(p)))
            .filter(|c| since.map_or(true, |s| c.timestamp >= s))
            .cloned()
            .collect();
        checkpoints.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        checkpoints.truncate(limit.max(0) as usize);
        Ok(checkpoints)
    }

    async fn try_get_recent_snapshots(&self, limit: i64) -> StateResult<Vec<SystemSnapshot>> {
        let state = self.checked()?;
        let mut snapshots = state.snapshots.clone();
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        snapshots.truncate(limit.max(0) as usize);
        Ok(snapshots)
    }

    async fn try_import_snapshot(&self, snapshot: &SystemSnapshot) -> StateResult<bool> {
        let mut state = self.checked()?;
        if state.snapshots.iter().any(|s| s.id == snapshot.id) {
            return Ok(false);
        }
        state.snapshots.push(snapshot.clone());
        Ok(true)
    }

    async fn try_import_checkpoint(&self, checkpoint: &Checkpoint) -> StateResult<bool> {
        let mut state = self.checked()?;
        if state.checkpoints.iter().any(|c| c.id == checkpoint.id) {
            return Ok(false);
        }
        state.checkpoints.push(checkpoint.clone());
        Ok(true)
    }

    async fn try_batch_update_agents(
        &self,
        updates: &[(String, AgentUpdate)],
    ) -> StateResult<u64> {
        // Apply against a copy and commit in one swap, so a partial batch is
        // never observable.
        let mut state = self.checked()?;
        let mut remaining = state.fail_after_updates.take();
        let mut staged = state.agents.clone();
        let mut affected = 0u64;
        for (agent_id, update) in updates {
            if remaining == Some(0) {
                return Err(StateError::postgres("connection lost mid-transaction"));
            }
            if let Some(left) = remaining.as_mut() {
                *left -= 1;
            }
            if let Some(agent) = staged.get_mut(agent_id) {
                update.apply_to(agent);
                affected += 1;
            }
        }
        state.agents = staged;
        Ok(affected)
    }

    async fn try_count_agents(&self) -> StateResult<i64> {
        Ok(self.checked()?.agents.len() as i64)
    }

    async fn try_count_tasks(&self) -> StateResult<i64> {
        Ok(self.checked()?.tasks.len() as i64)
    }

    async fn health_check(&self) -> StoreHealth {
        if self.lock().unavailable {
            StoreHealth::unreachable("memory-persistent", "store unavailable")
        } else {
            StoreHealth::connected("memory-persistent", PoolStats::default(), 0)
        }
    }
}

// ============================================================================
// IN-MEMORY EPHEMERAL BACKEND
// ============================================================================

struct Entry {
    json: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

struct StoredMessage {
    seq: u64,
    id: String,
    payload: JsonValue,
    enqueued_at: DateTime<Utc>,
    correlation_id: String,
}

#[derive(Default)]
struct GroupState {
    last_delivered_seq: u64,
    pending: Vec<String>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<StoredMessage>,
    groups: HashMap<String, GroupState>,
    next_seq: u64,
}

#[derive(Default)]
struct EphemeralState {
    kv: HashMap<String, Entry>,
    streams: HashMap<String, StreamState>,
    unavailable: bool,
}

/// In-memory stand-in for the Redis store manager.
pub struct InMemoryEphemeral {
    state: Mutex<EphemeralState>,
    default_agent_ttl: Duration,
    default_task_ttl: Duration,
    default_coord_ttl: Duration,
    default_session_ttl: Duration,
    max_len: usize,
}

impl Default for InMemoryEphemeral {
    fn default() -> Self {
        Self {
            state: Mutex::new(EphemeralState::default()),
            default_agent_ttl: Duration::from_secs(crate::policy::DEFAULT_AGENT_STATE_TTL_SECS),
            default_task_ttl: Duration::from_secs(crate::policy::DEFAULT_TASK_CACHE_TTL_SECS),
            default_coord_ttl: Duration::from_secs(crate::policy::DEFAULT_COORDINATION_TTL_SECS),
            default_session_ttl: Duration::from_secs(crate::policy::DEFAULT_SESSION_TTL_SECS),
            max_len: 10_000,
        }
    }
}

impl InMemoryEphemeral {
    pub fn new() -> Self {
        Self::default()
    }

    /// A double whose fallback TTLs are all `ttl`, so a test can tell a
    /// caller-supplied TTL apart from the backend default.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_agent_ttl: ttl,
            default_task_ttl: ttl,
            default_coord_ttl: ttl,
            default_session_ttl: ttl,
            ..Self::default()
        }
    }

    /// Simulate the store becoming unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Remaining TTL of a live entry.
    pub fn entry_ttl(&self, key: &str) -> Option<Duration> {
        self.lock()
            .kv
            .get(key)
            .filter(|entry| !entry.expired())
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EphemeralState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn checked(&self) -> StateResult<std::sync::MutexGuard<'_, EphemeralState>> {
        let guard = self.lock();
        if guard.unavailable {
            return Err(StateError::redis("store unavailable"));
        }
        Ok(guard)
    }

    fn set(&self, key: String, json: String, ttl: Duration) -> StateResult<()> {
        self.checked()?.kv.insert(
            key,
            Entry {
                json,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> StateResult<Option<String>> {
        let mut state = self.checked()?;
        match state.kv.get(key) {
            Some(entry) if entry.expired() => {
                state.kv.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.json.clone())),
            None => Ok(None),
        }
    }

    fn get_deserialized<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> StateResult<Option<T>> {
        match self.get(key)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StateError::serde(key.to_string(), e)),
            None => Ok(None),
        }
    }

    fn append(
        &self,
        stream_name: &str,
        payload: JsonValue,
        max_len: usize,
    ) -> StateResult<String> {
        let mut state = self.checked()?;
        let stream = state.streams.entry(stream_name.to_string()).or_default();
        let seq = stream.next_seq;
        stream.next_seq += 1;
        let id = format!("{}-{}", Utc::now().timestamp_millis(), seq);
        stream.entries.push(StoredMessage {
            seq,
            id: id.clone(),
            payload,
            enqueued_at: Utc::now(),
            correlation_id: colony_core::new_id(),
        });
        // Capped stream: trim oldest on overflow.
        while stream.entries.len() > max_len {
            stream.entries.remove(0);
        }
        Ok(id)
    }

    fn consume(
        &self,
        stream_name: &str,
        group: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>> {
        let mut state = self.checked()?;
        let stream = state.streams.entry(stream_name.to_string()).or_default();

        let mut delivered = Vec::new();
        let mut last_seq = stream
            .groups
            .get(group)
            .map(|g| g.last_delivered_seq)
            .unwrap_or(0);
        let group_exists = stream.groups.contains_key(group);

        // A freshly created group starts at the stream tail, matching group
        // creation at "$": only messages appended afterward are delivered.
        if !group_exists {
            let tail = stream.entries.last().map(|m| m.seq + 1).unwrap_or(0);
            stream.groups.insert(
                group.to_string(),
                GroupState {
                    last_delivered_seq: tail,
                    pending: Vec::new(),
                },
            );
            return Ok(Vec::new());
        }

        let start_seq = last_seq;
        for message in stream.entries.iter().filter(|m| m.seq >= start_seq) {
            if delivered.len() >= count {
                break;
            }
            delivered.push(StreamMessage {
                id: message.id.clone(),
                stream: stream_name.to_string(),
                payload: message.payload.clone(),
                enqueued_at: message.enqueued_at,
                correlation_id: message.correlation_id.clone(),
            });
            last_seq = message.seq + 1;
        }

        let group_state = stream.groups.get_mut(group).expect("group just ensured");
        group_state.last_delivered_seq = last_seq;
        group_state
            .pending
            .extend(delivered.iter().map(|m| m.id.clone()));
        Ok(delivered)
    }

    fn ack(&self, stream_name: &str, group: &str, message_id: &str) -> StateResult<bool> {
        let mut state = self.checked()?;
        let Some(stream) = state.streams.get_mut(stream_name) else {
            return Ok(false);
        };
        let Some(group_state) = stream.groups.get_mut(group) else {
            return Ok(false);
        };
        match group_state.pending.iter().position(|id| id == message_id) {
            Some(index) => {
                group_state.pending.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Register a consumer group at the current stream tail, the way the
    /// real backend creates groups before any consume happens.
    pub fn ensure_group(&self, stream_name: &str, group: &str) {
        let mut state = self.lock();
        let stream = state.streams.entry(stream_name.to_string()).or_default();
        let tail = stream.entries.last().map(|m| m.seq + 1).unwrap_or(0);
        stream.groups.entry(group.to_string()).or_insert(GroupState {
            last_delivered_seq: tail,
            pending: Vec::new(),
        });
    }
}

#[async_trait]
impl EphemeralBackend for InMemoryEphemeral {
    async fn try_set_agent_state(&self, agent: &Agent, ttl: Option<Duration>) -> StateResult<()> {
        let json =
            serde_json::to_string(agent).map_err(|e| StateError::serde("agent state", e))?;
        self.set(
            agent_state_key(&agent.agent_id),
            json,
            ttl.unwrap_or(self.default_agent_ttl),
        )
    }

    async fn try_get_agent_state(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        self.get_deserialized(&agent_state_key(agent_id))
    }

    async fn try_delete_agent_state(&self, agent_id: &str) -> StateResult<()> {
        self.checked()?.kv.remove(&agent_state_key(agent_id));
        Ok(())
    }

    async fn try_cache_task(&self, task: &Task, ttl: Option<Duration>) -> StateResult<()> {
        let json = serde_json::to_string(task).map_err(|e| StateError::serde("task cache", e))?;
        self.set(
            task_cache_key(&task.task_id),
            json,
            ttl.unwrap_or(self.default_task_ttl),
        )
    }

    async fn try_get_cached_task(&self, task_id: &str) -> StateResult<Option<Task>> {
        self.get_deserialized(&task_cache_key(task_id))
    }

    async fn try_delete_cached_task(&self, task_id: &str) -> StateResult<()> {
        self.checked()?.kv.remove(&task_cache_key(task_id));
        Ok(())
    }

    async fn try_create_session(
        &self,
        session_id: &str,
        data: &JsonValue,
        ttl: Option<Duration>,
    ) -> StateResult<()> {
        self.set(
            session_key(session_id),
            data.to_string(),
            ttl.unwrap_or(self.default_session_ttl),
        )
    }

    async fn try_get_session(&self, session_id: &str) -> StateResult<Option<JsonValue>> {
        self.get_deserialized(&session_key(session_id))
    }

    async fn try_extend_session(&self, session_id: &str, ttl: Duration) -> StateResult<bool> {
        let key = session_key(session_id);
        let mut state = self.checked()?;
        match state.kv.get_mut(&key) {
            Some(entry) if !entry.expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn try_set_coordination_state(
        &self,
        coordination: &CoordinationState,
        ttl: Option<Duration>,
    ) -> StateResult<()> {
        let json = serde_json::to_string(coordination)
            .map_err(|e| StateError::serde("coordination state", e))?;
        self.set(
            coord_key(&coordination.operation_id),
            json,
            ttl.unwrap_or(self.default_coord_ttl),
        )
    }

    async fn try_get_coordination_state(
        &self,
        operation_id: &str,
    ) -> StateResult<Option<CoordinationState>> {
        self.get_deserialized(&coord_key(operation_id))
    }

    async fn try_queue_task(&self, task: &Task) -> StateResult<String> {
        let payload =
            serde_json::to_value(task).map_err(|e| StateError::serde("queued task", e))?;
        self.append(crate::policy::TASK_STREAM, payload, self.max_len)
    }

    async fn try_consume_tasks(
        &self,
        group: &str,
        _consumer: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>> {
        self.consume(crate::policy::TASK_STREAM, group, count)
    }

    async fn try_acknowledge_task(&self, group: &str, message_id: &str) -> StateResult<bool> {
        self.ack(crate::policy::TASK_STREAM, group, message_id)
    }

    async fn try_publish_event(
        &self,
        event_type: &str,
        payload: &JsonValue,
    ) -> StateResult<String> {
        let envelope = serde_json::json!({
            "event_type": event_type,
            "payload": payload,
        });
        self.append(crate::policy::EVENT_STREAM, envelope, self.max_len)
    }

    async fn try_consume_events(
        &self,
        group: &str,
        _consumer: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>> {
        self.consume(crate::policy::EVENT_STREAM, group, count)
    }

    async fn try_acknowledge_event(&self, group: &str, message_id: &str) -> StateResult<bool> {
        self.ack(crate::policy::EVENT_STREAM, group, message_id)
    }

    async fn try_increment_metric(&self, name: &str, delta: i64) -> StateResult<i64> {
        let key = metric_key(name);
        let mut state = self.checked()?;
        let current = match state.kv.get(&key) {
            Some(entry) if !entry.expired() => entry.json.parse::<i64>().unwrap_or(0),
            _ => 0,
        };
        let next = current + delta;
        state.kv.insert(
            key,
            Entry {
                json: next.to_string(),
                expires_at: Some(
                    Instant::now()
                        + Duration::from_secs(crate::policy::DEFAULT_METRIC_TTL_SECS),
                ),
            },
        );
        Ok(next)
    }

    async fn try_batch_cache_agents(
        &self,
        agents: &[Agent],
        ttl: Option<Duration>,
    ) -> StateResult<u64> {
        let ttl = ttl.unwrap_or(self.default_agent_ttl);
        for agent in agents {
            let json =
                serde_json::to_string(agent).map_err(|e| StateError::serde("agent state", e))?;
            self.set(agent_state_key(&agent.agent_id), json, ttl)?;
        }
        Ok(agents.len() as u64)
    }

    async fn health_check(&self) -> StoreHealth {
        if self.lock().unavailable {
            StoreHealth::unreachable("memory-ephemeral", "store unavailable")
        } else {
            StoreHealth::connected("memory-ephemeral", PoolStats::default(), 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pending_tasks_ordered_by_priority_then_age() {
        let store = InMemoryPersistent::new();
        for priority in [3, 7, 7, 1] {
            store
                .try_create_task(NewTask::with_priority(priority))
                .await
                .unwrap();
        }

        let pending = store.try_get_pending_tasks(10).await.unwrap();
        let priorities: Vec<i32> = pending.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![7, 7, 3, 1]);
        // Equal priorities keep insertion order.
        assert!(pending[0].created_at <= pending[1].created_at);
    }

    #[tokio::test]
    async fn test_assignment_is_exclusive() {
        let store = Arc::new(InMemoryPersistent::new());
        let task_id = store.try_create_task(NewTask::default()).await.unwrap();

        let a = {
            let store = store.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move { store.try_assign_task(&task_id, "agent-a").await.unwrap() })
        };
        let b = {
            let store = store.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move { store.try_assign_task(&task_id, "agent-b").await.unwrap() })
        };

        let (won_a, won_b) = (a.await.unwrap(), b.await.unwrap());
        assert!(won_a ^ won_b, "exactly one assignment must win");

        let task = store.try_get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert!(task.agent_id.is_some());
        assert!(task.started_at.is_some());
    }

    #[tokio::test]
    async fn test_assign_requires_pending() {
        let store = InMemoryPersistent::new();
        let task_id = store.try_create_task(NewTask::default()).await.unwrap();
        assert!(store.try_assign_task(&task_id, "agent-a").await.unwrap());
        assert!(!store.try_assign_task(&task_id, "agent-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_status_sets_completed_at() {
        let store = InMemoryPersistent::new();
        let task_id = store.try_create_task(NewTask::default()).await.unwrap();
        store
            .try_update_task_status(
                &task_id,
                TaskStatus::Completed,
                Some(serde_json::json!({"out": 1})),
            )
            .await
            .unwrap();

        let task = store.try_get_task(&task_id).await.unwrap().unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(task.result.unwrap()["out"], 1);
    }

    #[tokio::test]
    async fn test_batch_update_counts_matched_rows() {
        let store = InMemoryPersistent::new();
        store.try_register_agent("a1", &[]).await.unwrap();
        store.try_register_agent("a2", &[]).await.unwrap();

        let updates = vec![
            ("a1".to_string(), AgentUpdate::status(AgentStatus::Busy)),
            ("missing".to_string(), AgentUpdate::status(AgentStatus::Busy)),
            ("a2".to_string(), AgentUpdate::status(AgentStatus::Offline)),
        ];
        let affected = store.try_batch_update_agents(&updates).await.unwrap();
        assert_eq!(affected, 2);

        let a1 = store.try_get_agent_state("a1").await.unwrap().unwrap();
        assert_eq!(a1.status, AgentStatus::Busy);
    }

    #[tokio::test]
    async fn test_batch_update_failure_commits_nothing() {
        let store = InMemoryPersistent::new();
        store.try_register_agent("a1", &[]).await.unwrap();
        store.try_register_agent("a2", &[]).await.unwrap();

        // Connection drops after the first update is staged.
        store.fail_after_updates(1);
        let updates = vec![
            ("a1".to_string(), AgentUpdate::status(AgentStatus::Busy)),
            ("a2".to_string(), AgentUpdate::status(AgentStatus::Busy)),
        ];
        let err = store.try_batch_update_agents(&updates).await.unwrap_err();
        assert!(err.is_unavailable());

        // Nothing committed, including the update staged before the drop.
        for id in ["a1", "a2"] {
            let agent = store.try_get_agent_state(id).await.unwrap().unwrap();
            assert_eq!(agent.status, AgentStatus::Idle);
        }

        // The next batch goes through untouched by the injected fault.
        assert_eq!(store.try_batch_update_agents(&updates).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_quality_score() {
        let store = InMemoryPersistent::new();
        store.try_register_agent("a1", &[]).await.unwrap();
        let t1 = store.try_create_task(NewTask::default()).await.unwrap();
        let t2 = store.try_create_task(NewTask::default()).await.unwrap();
        store
            .try_update_task_status(&t1, TaskStatus::Completed, None)
            .await
            .unwrap();
        store
            .try_update_task_status(&t2, TaskStatus::Failed, None)
            .await
            .unwrap();

        store.try_create_system_snapshot().await.unwrap();
        let snapshots = store.try_get_recent_snapshots(1).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].completed_tasks, 1);
        assert_eq!(snapshots[0].failed_tasks, 1);
        assert!((snapshots[0].quality_score - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryPersistent::new();
        store.set_unavailable(true);
        let err = store.try_count_agents().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(!store.health_check().await.connected);
    }

    #[tokio::test]
    async fn test_cache_entry_expires() {
        let store = InMemoryEphemeral::new();
        let agent = Agent::new("a1", vec![]);
        store
            .try_set_agent_state(&agent, Some(Duration::from_millis(5)))
            .await
            .unwrap();
        assert!(store.try_get_agent_state("a1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.try_get_agent_state("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extend_session_refreshes_ttl() {
        let store = InMemoryEphemeral::new();
        store
            .try_create_session("s1", &serde_json::json!({"user": "x"}), None)
            .await
            .unwrap();
        assert!(store
            .try_extend_session("s1", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .try_extend_session("gone", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_groups_consume_independently() {
        let store = InMemoryEphemeral::new();
        store.ensure_group(crate::policy::TASK_STREAM, "g1");
        store.ensure_group(crate::policy::TASK_STREAM, "g2");

        let task = NewTask::default().into_task();
        store.try_queue_task(&task).await.unwrap();

        let g1 = store.try_consume_tasks("g1", "c1", 10).await.unwrap();
        let g2 = store.try_consume_tasks("g2", "c1", 10).await.unwrap();
        assert_eq!(g1.len(), 1);
        assert_eq!(g2.len(), 1, "each group sees every message");

        // Within one group, delivery advances past consumed messages.
        let again = store.try_consume_tasks("g1", "c2", 10).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_clears_pending() {
        let store = InMemoryEphemeral::new();
        store.ensure_group(crate::policy::EVENT_STREAM, "monitoring");
        store
            .try_publish_event("agent_registered", &serde_json::json!({"agent_id": "a1"}))
            .await
            .unwrap();

        let events = store
            .try_consume_events("monitoring", "c1", 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["event_type"], "agent_registered");

        assert!(store
            .try_acknowledge_event("monitoring", &events[0].id)
            .await
            .unwrap());
        assert!(!store
            .try_acknowledge_event("monitoring", &events[0].id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_fresh_group_starts_at_tail() {
        let store = InMemoryEphemeral::new();
        let task = NewTask::default().into_task();
        store.try_queue_task(&task).await.unwrap();

        // First consume registers the group at the tail.
        let first = store.try_consume_tasks("late", "c1", 10).await.unwrap();
        assert!(first.is_empty());

        store.try_queue_task(&task).await.unwrap();
        let second = store.try_consume_tasks("late", "c1", 10).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_metric_accumulates() {
        let store = InMemoryEphemeral::new();
        assert_eq!(store.try_increment_metric("ops", 1).await.unwrap(), 1);
        assert_eq!(store.try_increment_metric("ops", 4).await.unwrap(), 5);
    }

    proptest::proptest! {
        #[test]
        fn prop_pending_order_is_priority_then_insertion(
            priorities in proptest::collection::vec(0i32..10, 1..20),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let store = InMemoryPersistent::new();
                let mut created = Vec::new();
                for priority in &priorities {
                    let id = store
                        .try_create_task(NewTask::with_priority(*priority))
                        .await
                        .unwrap();
                    created.push(id);
                }

                let pending = store
                    .try_get_pending_tasks(priorities.len() as i64)
                    .await
                    .unwrap();

                // Priority is non-increasing.
                for pair in pending.windows(2) {
                    assert!(pair[0].priority >= pair[1].priority);
                }
                // Equal priorities keep insertion order.
                let position = |id: &str| created.iter().position(|c| c == id).unwrap();
                for pair in pending.windows(2) {
                    if pair[0].priority == pair[1].priority {
                        assert!(position(&pair[0].task_id) < position(&pair[1].task_id));
                    }
                }
            });
        }
    }
}
