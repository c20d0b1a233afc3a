//! Ephemeral Store Manager
//!
//! Redis-backed cache, session, and coordination-state storage plus two
//! capped append streams (task queue and event stream) with consumer-group
//! delivery, reached through a pooled async client.
//!
//! The ephemeral store is allowed to be unavailable without being fatal to
//! the system: every operation that cannot complete returns a sentinel and
//! logs, and the orchestrator degrades to persistent-only reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colony_core::{
    Agent, CoordinationState, PoolStats, StateError, StateResult, StoreHealth, StreamMessage, Task,
};
use deadpool_redis::{Config as RedisPoolConfig, Pool, PoolConfig, Runtime};
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::or_sentinel;
use crate::policy::{
    self, agent_state_key, coord_key, metric_key, session_key, task_cache_key, EVENT_STREAM,
    TASK_STREAM,
};
use crate::traits::EphemeralBackend;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Redis client pool configuration.
///
/// The TTLs are configuration defaults (overridable via environment), not
/// fixed constants.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379/0`.
    pub url: String,
    /// Maximum pool size.
    pub max_size: usize,
    /// Bound on every command round trip (excluding stream blocking).
    pub timeout: Duration,
    /// TTL for `agent:state:{agent_id}` entries.
    pub agent_state_ttl: Duration,
    /// TTL for `task:cache:{task_id}` entries.
    pub task_cache_ttl: Duration,
    /// TTL for `coord:{operation_id}` entries.
    pub coordination_ttl: Duration,
    /// TTL for `session:{session_id}` entries.
    pub session_ttl: Duration,
    /// Self-expiry refreshed on each `metrics:{name}` increment.
    pub metric_ttl: Duration,
    /// Approximate cap on both streams; oldest entries are trimmed.
    pub stream_max_len: usize,
    /// How long a consume call blocks waiting for new messages.
    pub consume_block: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(5),
            agent_state_ttl: Duration::from_secs(policy::DEFAULT_AGENT_STATE_TTL_SECS),
            task_cache_ttl: Duration::from_secs(policy::DEFAULT_TASK_CACHE_TTL_SECS),
            coordination_ttl: Duration::from_secs(policy::DEFAULT_COORDINATION_TTL_SECS),
            session_ttl: Duration::from_secs(policy::DEFAULT_SESSION_TTL_SECS),
            metric_ttl: Duration::from_secs(policy::DEFAULT_METRIC_TTL_SECS),
            stream_max_len: 10_000,
            consume_block: Duration::from_secs(2),
        }
    }
}

impl RedisConfig {
    /// Create a configuration from `COLONY_REDIS_*` environment variables.
    pub fn from_env() -> Self {
        let secs = |var: &str, default: u64| {
            Duration::from_secs(
                std::env::var(var)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };
        Self {
            url: std::env::var("COLONY_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            max_size: std::env::var("COLONY_REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: secs("COLONY_REDIS_TIMEOUT", 5),
            agent_state_ttl: secs(
                "COLONY_REDIS_AGENT_STATE_TTL",
                policy::DEFAULT_AGENT_STATE_TTL_SECS,
            ),
            task_cache_ttl: secs(
                "COLONY_REDIS_TASK_CACHE_TTL",
                policy::DEFAULT_TASK_CACHE_TTL_SECS,
            ),
            coordination_ttl: secs(
                "COLONY_REDIS_COORDINATION_TTL",
                policy::DEFAULT_COORDINATION_TTL_SECS,
            ),
            session_ttl: secs("COLONY_REDIS_SESSION_TTL", policy::DEFAULT_SESSION_TTL_SECS),
            metric_ttl: secs("COLONY_REDIS_METRIC_TTL", policy::DEFAULT_METRIC_TTL_SECS),
            stream_max_len: std::env::var("COLONY_REDIS_STREAM_MAX_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
            consume_block: Duration::from_millis(
                std::env::var("COLONY_REDIS_CONSUME_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StateResult<Pool> {
        let mut cfg = RedisPoolConfig::from_url(self.url.clone());
        cfg.pool = Some(PoolConfig::new(self.max_size));
        cfg.create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StateError::Pool {
                store: "redis",
                reason: format!("failed to create pool: {e}"),
            })
    }
}

// ============================================================================
// EPHEMERAL STORE
// ============================================================================

fn redis_err(e: redis::RedisError) -> StateError {
    StateError::redis(e.to_string())
}

fn pool_err(e: deadpool_redis::PoolError) -> StateError {
    StateError::Pool {
        store: "redis",
        reason: e.to_string(),
    }
}

/// Ephemeral store manager over a pooled async Redis client.
pub struct EphemeralStore {
    pool: Pool,
    config: RedisConfig,
    /// Consumer groups already created (XGROUP CREATE is not idempotent;
    /// BUSYGROUP replies are tolerated but avoided where possible).
    known_groups: Mutex<HashSet<(String, String)>>,
}

impl EphemeralStore {
    /// Create a store with an existing pool.
    pub fn new(pool: Pool, config: RedisConfig) -> Self {
        Self {
            pool,
            config,
            known_groups: Mutex::new(HashSet::new()),
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: RedisConfig) -> StateResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool, config))
    }

    /// Current pool statistics for observability.
    pub fn pool_stats(&self) -> PoolStats {
        let status = self.pool.status();
        PoolStats {
            size: status.size,
            available: status.available,
            max_size: status.max_size,
        }
    }

    async fn conn(&self) -> StateResult<deadpool_redis::Connection> {
        self.pool.get().await.map_err(pool_err)
    }

    async fn timed<T, F>(&self, operation: &'static str, budget: Duration, fut: F) -> StateResult<T>
    where
        F: Future<Output = StateResult<T>>,
    {
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(StateError::Timeout {
                operation,
                timeout: budget,
            }),
        }
    }

    /// Create a consumer group on a stream if this process has not yet.
    /// MKSTREAM creates the stream too, so consumers can start before the
    /// first producer.
    async fn ensure_group(
        &self,
        conn: &mut deadpool_redis::Connection,
        stream: &str,
        group: &str,
    ) -> StateResult<()> {
        {
            let known = self.known_groups.lock().unwrap_or_else(|p| p.into_inner());
            if known.contains(&(stream.to_string(), group.to_string())) {
                return Ok(());
            }
        }

        let created: Result<String, redis::RedisError> =
            conn.xgroup_create_mkstream(stream, group, "$").await;
        match created {
            Ok(_) => {}
            // Another consumer created it first.
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(redis_err(e)),
        }

        let mut known = self.known_groups.lock().unwrap_or_else(|p| p.into_inner());
        known.insert((stream.to_string(), group.to_string()));
        Ok(())
    }

    async fn set_json(&self, key: &str, value: &JsonValue, ttl: Duration) -> StateResult<()> {
        let json = value.to_string();
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(key, json, ttl.as_secs())
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn get_json(&self, key: &str) -> StateResult<Option<JsonValue>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await.map_err(redis_err)?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StateError::serde(key.to_string(), e)),
            None => Ok(None),
        }
    }

    async fn delete_key(&self, key: &str) -> StateResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.del(key).await.map_err(redis_err)?;
        Ok(())
    }

    /// Append an entry with the standard envelope fields to a capped stream.
    async fn append_to_stream(
        &self,
        stream: &str,
        extra: &[(&str, String)],
        payload: String,
    ) -> StateResult<String> {
        let enqueued_at = Utc::now().to_rfc3339();
        let correlation_id = colony_core::new_id();

        let mut fields: Vec<(&str, String)> = vec![
            ("payload", payload),
            ("enqueued_at", enqueued_at),
            ("correlation_id", correlation_id),
        ];
        fields.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        let mut conn = self.conn().await?;
        let id: String = conn
            .xadd_maxlen(
                stream,
                StreamMaxlen::Approx(self.config.stream_max_len),
                "*",
                &fields,
            )
            .await
            .map_err(redis_err)?;
        Ok(id)
    }

    /// Read new messages for a consumer group, blocking up to the
    /// configured timeout when none are available.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>> {
        let mut conn = self.conn().await?;
        self.ensure_group(&mut conn, stream, group).await?;

        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(self.config.consume_block.as_millis() as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[">"], &options)
            .await
            .map_err(redis_err)?;

        let mut messages = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let payload: JsonValue = entry
                    .get::<String>("payload")
                    .and_then(|raw| serde_json::from_str(&raw).ok())
                    .unwrap_or(JsonValue::Null);
                let enqueued_at = entry
                    .get::<String>("enqueued_at")
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                let correlation_id = entry.get::<String>("correlation_id").unwrap_or_default();
                messages.push(StreamMessage {
                    id: entry.id.clone(),
                    stream: stream.to_string(),
                    payload,
                    enqueued_at,
                    correlation_id,
                });
            }
        }
        Ok(messages)
    }

    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> StateResult<bool> {
        let mut conn = self.conn().await?;
        let acked: i64 = conn
            .xack(stream, group, &[message_id])
            .await
            .map_err(redis_err)?;
        Ok(acked > 0)
    }
}

#[async_trait]
impl EphemeralBackend for EphemeralStore {
    async fn try_set_agent_state(&self, agent: &Agent, ttl: Option<Duration>) -> StateResult<()> {
        let ttl = ttl.unwrap_or(self.config.agent_state_ttl);
        let key = agent_state_key(&agent.agent_id);
        let value =
            serde_json::to_value(agent).map_err(|e| StateError::serde("agent state", e))?;
        self.timed("set_agent_state", self.config.timeout, self.set_json(&key, &value, ttl))
            .await
    }

    async fn try_get_agent_state(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        let key = agent_state_key(agent_id);
        let value = self
            .timed("get_agent_state", self.config.timeout, self.get_json(&key))
            .await?;
        match value {
            Some(json) => serde_json::from_value(json)
                .map(Some)
                .map_err(|e| StateError::serde(key, e)),
            None => Ok(None),
        }
    }

    async fn try_delete_agent_state(&self, agent_id: &str) -> StateResult<()> {
        let key = agent_state_key(agent_id);
        self.timed("delete_agent_state", self.config.timeout, self.delete_key(&key))
            .await
    }

    async fn try_cache_task(&self, task: &Task, ttl: Option<Duration>) -> StateResult<()> {
        let ttl = ttl.unwrap_or(self.config.task_cache_ttl);
        let key = task_cache_key(&task.task_id);
        let value = serde_json::to_value(task).map_err(|e| StateError::serde("task cache", e))?;
        self.timed("cache_task", self.config.timeout, self.set_json(&key, &value, ttl))
            .await
    }

    async fn try_get_cached_task(&self, task_id: &str) -> StateResult<Option<Task>> {
        let key = task_cache_key(task_id);
        let value = self
            .timed("get_cached_task", self.config.timeout, self.get_json(&key))
            .await?;
        match value {
            Some(json) => serde_json::from_value(json)
                .map(Some)
                .map_err(|e| StateError::serde(key, e)),
            None => Ok(None),
        }
    }

    async fn try_delete_cached_task(&self, task_id: &str) -> StateResult<()> {
        let key = task_cache_key(task_id);
        self.timed("delete_cached_task", self.config.timeout, self.delete_key(&key))
            .await
    }

    async fn try_create_session(
        &self,
        session_id: &str,
        data: &JsonValue,
        ttl: Option<Duration>,
    ) -> StateResult<()> {
        let ttl = ttl.unwrap_or(self.config.session_ttl);
        let key = session_key(session_id);
        self.timed("create_session", self.config.timeout, self.set_json(&key, data, ttl))
            .await
    }

    async fn try_get_session(&self, session_id: &str) -> StateResult<Option<JsonValue>> {
        let key = session_key(session_id);
        self.timed("get_session", self.config.timeout, self.get_json(&key))
            .await
    }

    async fn try_extend_session(&self, session_id: &str, ttl: Duration) -> StateResult<bool> {
        let key = session_key(session_id);
        self.timed("extend_session", self.config.timeout, async {
            let mut conn = self.conn().await?;
            let refreshed: i64 = conn
                .expire(&key, ttl.as_secs() as i64)
                .await
                .map_err(redis_err)?;
            Ok(refreshed == 1)
        })
        .await
    }

    async fn try_set_coordination_state(
        &self,
        state: &CoordinationState,
        ttl: Option<Duration>,
    ) -> StateResult<()> {
        let ttl = ttl.unwrap_or(self.config.coordination_ttl);
        let key = coord_key(&state.operation_id);
        let value = serde_json::to_value(state)
            .map_err(|e| StateError::serde("coordination state", e))?;
        self.timed("set_coordination_state", self.config.timeout, self.set_json(&key, &value, ttl))
            .await
    }

    async fn try_get_coordination_state(
        &self,
        operation_id: &str,
    ) -> StateResult<Option<CoordinationState>> {
        let key = coord_key(operation_id);
        let value = self
            .timed("get_coordination_state", self.config.timeout, self.get_json(&key))
            .await?;
        match value {
            Some(json) => serde_json::from_value(json)
                .map(Some)
                .map_err(|e| StateError::serde(key, e)),
            None => Ok(None),
        }
    }

    async fn try_queue_task(&self, task: &Task) -> StateResult<String> {
        let payload =
            serde_json::to_string(task).map_err(|e| StateError::serde("queued task", e))?;
        self.timed(
            "queue_task",
            self.config.timeout,
            self.append_to_stream(TASK_STREAM, &[("task_id", task.task_id.clone())], payload),
        )
        .await
    }

    async fn try_consume_tasks(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>> {
        // Budget covers the server-side block plus the round trip.
        let budget = self.config.timeout + self.config.consume_block;
        self.timed(
            "consume_tasks",
            budget,
            self.read_group(TASK_STREAM, group, consumer, count),
        )
        .await
    }

    async fn try_acknowledge_task(&self, group: &str, message_id: &str) -> StateResult<bool> {
        self.timed(
            "acknowledge_task",
            self.config.timeout,
            self.ack(TASK_STREAM, group, message_id),
        )
        .await
    }

    async fn try_publish_event(
        &self,
        event_type: &str,
        payload: &JsonValue,
    ) -> StateResult<String> {
        self.timed(
            "publish_event",
            self.config.timeout,
            self.append_to_stream(
                EVENT_STREAM,
                &[("event_type", event_type.to_string())],
                payload.to_string(),
            ),
        )
        .await
    }

    async fn try_consume_events(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StateResult<Vec<StreamMessage>> {
        let budget = self.config.timeout + self.config.consume_block;
        self.timed(
            "consume_events",
            budget,
            self.read_group(EVENT_STREAM, group, consumer, count),
        )
        .await
    }

    async fn try_acknowledge_event(&self, group: &str, message_id: &str) -> StateResult<bool> {
        self.timed(
            "acknowledge_event",
            self.config.timeout,
            self.ack(EVENT_STREAM, group, message_id),
        )
        .await
    }

    async fn try_increment_metric(&self, name: &str, delta: i64) -> StateResult<i64> {
        let key = metric_key(name);
        let ttl = self.config.metric_ttl.as_secs() as i64;
        self.timed("increment_metric", self.config.timeout, async {
            let mut conn = self.conn().await?;
            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.cmd("INCRBY").arg(&key).arg(delta);
            pipe.cmd("EXPIRE").arg(&key).arg(ttl).ignore();
            let (value,): (i64,) = pipe.query_async(&mut conn).await.map_err(redis_err)?;
            Ok(value)
        })
        .await
    }

    async fn try_batch_cache_agents(
        &self,
        agents: &[Agent],
        ttl: Option<Duration>,
    ) -> StateResult<u64> {
        if agents.is_empty() {
            return Ok(0);
        }
        let ttl = ttl.unwrap_or(self.config.agent_state_ttl).as_secs();
        self.timed("batch_cache_agents", self.config.timeout, async {
            let mut pipe = redis::pipe();
            for agent in agents {
                let json = serde_json::to_string(agent)
                    .map_err(|e| StateError::serde("agent state", e))?;
                pipe.cmd("SET")
                    .arg(agent_state_key(&agent.agent_id))
                    .arg(json)
                    .arg("EX")
                    .arg(ttl)
                    .ignore();
            }
            let mut conn = self.conn().await?;
            let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
            Ok(agents.len() as u64)
        })
        .await
    }

    async fn health_check(&self) -> StoreHealth {
        let start = Instant::now();
        let probe = self
            .timed("health_check", self.config.timeout, async {
                let mut conn = self.conn().await?;
                let _: String = redis::cmd("PING")
                    .query_async(&mut conn)
                    .await
                    .map_err(redis_err)?;
                Ok(())
            })
            .await;

        match probe {
            Ok(()) => StoreHealth::connected(
                "redis",
                self.pool_stats(),
                start.elapsed().as_millis() as i64,
            ),
            Err(e) => StoreHealth::unreachable("redis", e.to_string()),
        }
    }
}

// ============================================================================
// SENTINEL SURFACE
// ============================================================================
//
// Fire-and-forget from the caller's perspective: returns are observability
// only, and a miss is absent, never an error.

impl EphemeralStore {
    pub async fn set_agent_state(&self, agent: &Agent, ttl: Option<Duration>) -> bool {
        or_sentinel(
            "redis",
            "set_agent_state",
            self.try_set_agent_state(agent, ttl).await.map(|_| true),
            false,
        )
    }

    pub async fn get_agent_state(&self, agent_id: &str) -> Option<Agent> {
        or_sentinel(
            "redis",
            "get_agent_state",
            self.try_get_agent_state(agent_id).await,
            None,
        )
    }

    pub async fn delete_agent_state(&self, agent_id: &str) -> bool {
        or_sentinel(
            "redis",
            "delete_agent_state",
            self.try_delete_agent_state(agent_id).await.map(|_| true),
            false,
        )
    }

    pub async fn cache_task(&self, task: &Task, ttl: Option<Duration>) -> bool {
        or_sentinel(
            "redis",
            "cache_task",
            self.try_cache_task(task, ttl).await.map(|_| true),
            false,
        )
    }

    pub async fn get_cached_task(&self, task_id: &str) -> Option<Task> {
        or_sentinel(
            "redis",
            "get_cached_task",
            self.try_get_cached_task(task_id).await,
            None,
        )
    }

    pub async fn delete_cached_task(&self, task_id: &str) -> bool {
        or_sentinel(
            "redis",
            "delete_cached_task",
            self.try_delete_cached_task(task_id).await.map(|_| true),
            false,
        )
    }

    pub async fn create_session(&self, session_id: &str, data: &JsonValue) -> bool {
        or_sentinel(
            "redis",
            "create_session",
            self.try_create_session(session_id, data, None)
                .await
                .map(|_| true),
            false,
        )
    }

    pub async fn get_session(&self, session_id: &str) -> Option<JsonValue> {
        or_sentinel(
            "redis",
            "get_session",
            self.try_get_session(session_id).await,
            None,
        )
    }

    pub async fn extend_session(&self, session_id: &str, ttl: Duration) -> bool {
        or_sentinel(
            "redis",
            "extend_session",
            self.try_extend_session(session_id, ttl).await,
            false,
        )
    }

    pub async fn set_coordination_state(&self, state: &CoordinationState) -> bool {
        or_sentinel(
            "redis",
            "set_coordination_state",
            self.try_set_coordination_state(state, None)
                .await
                .map(|_| true),
            false,
        )
    }

    pub async fn get_coordination_state(&self, operation_id: &str) -> Option<CoordinationState> {
        or_sentinel(
            "redis",
            "get_coordination_state",
            self.try_get_coordination_state(operation_id).await,
            None,
        )
    }

    pub async fn queue_task(&self, task: &Task) -> Option<String> {
        or_sentinel(
            "redis",
            "queue_task",
            self.try_queue_task(task).await.map(Some),
            None,
        )
    }

    pub async fn consume_tasks(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Vec<StreamMessage> {
        or_sentinel(
            "redis",
            "consume_tasks",
            self.try_consume_tasks(group, consumer, count).await,
            Vec::new(),
        )
    }

    pub async fn acknowledge_task(&self, group: &str, message_id: &str) -> bool {
        or_sentinel(
            "redis",
            "acknowledge_task",
            self.try_acknowledge_task(group, message_id).await,
            false,
        )
    }

    pub async fn publish_event(&self, event_type: &str, payload: &JsonValue) -> Option<String> {
        or_sentinel(
            "redis",
            "publish_event",
            self.try_publish_event(event_type, payload).await.map(Some),
            None,
        )
    }

    pub async fn consume_events(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Vec<StreamMessage> {
        or_sentinel(
            "redis",
            "consume_events",
            self.try_consume_events(group, consumer, count).await,
            Vec::new(),
        )
    }

    pub async fn acknowledge_event(&self, group: &str, message_id: &str) -> bool {
        or_sentinel(
            "redis",
            "acknowledge_event",
            self.try_acknowledge_event(group, message_id).await,
            false,
        )
    }

    pub async fn increment_metric(&self, name: &str, delta: i64) -> Option<i64> {
        or_sentinel(
            "redis",
            "increment_metric",
            self.try_increment_metric(name, delta).await.map(Some),
            None,
        )
    }

    pub async fn batch_cache_agents(&self, agents: &[Agent], ttl: Option<Duration>) -> u64 {
        or_sentinel(
            "redis",
            "batch_cache_agents",
            self.try_batch_cache_agents(agents, ttl).await,
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_ttls() {
        let config = RedisConfig::default();
        assert_eq!(config.agent_state_ttl, Duration::from_secs(3600));
        assert_eq!(config.task_cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.coordination_ttl, Duration::from_secs(300));
        assert_eq!(config.metric_ttl, Duration::from_secs(86400));
        assert_eq!(config.stream_max_len, 10_000);
    }

    #[test]
    fn test_consume_budget_exceeds_block() {
        let config = RedisConfig::default();
        assert!(config.timeout + config.consume_block > config.consume_block);
    }
}
