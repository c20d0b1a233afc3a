//! Persistent Store Manager
//!
//! PostgreSQL-backed durable storage for agents, tasks, system snapshots,
//! and checkpoints, reached through a bounded deadpool-postgres pool.
//!
//! Concurrency correctness rests on database-level atomic conditional
//! updates (`try_assign_task`); no application-level locking is used.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colony_core::{
    Agent, AgentStatus, AgentUpdate, Checkpoint, NewTask, PoolStats, StateError, StateResult,
    StoreHealth, SystemSnapshot, Task, TaskStatus,
};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::or_sentinel;
use crate::traits::PersistentBackend;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// PostgreSQL connection pool configuration.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size.
    pub max_size: usize,
    /// Bound on every pool checkout + query.
    pub timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "colony".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PostgresConfig {
    /// Create a configuration from `COLONY_DB_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("COLONY_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("COLONY_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("COLONY_DB_NAME").unwrap_or_else(|_| "colony".to_string()),
            user: std::env::var("COLONY_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("COLONY_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("COLONY_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("COLONY_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StateResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(self.max_size));

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StateError::Pool {
                store: "postgres",
                reason: format!("failed to create pool: {e}"),
            })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Idempotent schema bootstrap statements.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS agents (
        agent_id TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'idle',
        current_task_id TEXT,
        context_usage DOUBLE PRECISION NOT NULL DEFAULT 0.0,
        last_activity TIMESTAMPTZ NOT NULL DEFAULT now(),
        capabilities JSONB NOT NULL DEFAULT '[]'::jsonb,
        performance_metrics JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_agents_status ON agents (status)",
    "CREATE INDEX IF NOT EXISTS idx_agents_last_activity ON agents (last_activity)",
    "CREATE TABLE IF NOT EXISTS tasks (
        task_id TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'pending',
        agent_id TEXT REFERENCES agents(agent_id),
        priority INTEGER NOT NULL DEFAULT 5,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        result JSONB,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks (priority DESC)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_agent_id ON tasks (agent_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks (created_at)",
    "CREATE TABLE IF NOT EXISTS system_snapshots (
        id TEXT PRIMARY KEY,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        total_agents BIGINT NOT NULL,
        active_agents BIGINT NOT NULL,
        total_tasks BIGINT NOT NULL,
        completed_tasks BIGINT NOT NULL,
        failed_tasks BIGINT NOT NULL,
        average_context_usage DOUBLE PRECISION NOT NULL,
        quality_score DOUBLE PRECISION NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )",
    "CREATE TABLE IF NOT EXISTS checkpoints (
        id TEXT PRIMARY KEY,
        checkpoint_name TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        data JSONB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_checkpoints_name ON checkpoints (checkpoint_name)",
];

const AGENT_COLUMNS: &str = "agent_id, status, current_task_id, context_usage, last_activity, \
     capabilities, performance_metrics, created_at, updated_at";

const TASK_COLUMNS: &str = "task_id, status, agent_id, priority, created_at, started_at, \
     completed_at, metadata, result, updated_at";

// ============================================================================
// ROW MAPPING
// ============================================================================

fn pg_err(e: tokio_postgres::Error) -> StateError {
    StateError::postgres(e.to_string())
}

fn pool_err(e: deadpool_postgres::PoolError) -> StateError {
    StateError::Pool {
        store: "postgres",
        reason: e.to_string(),
    }
}

fn integrity(reason: impl Into<String>) -> StateError {
    StateError::Integrity {
        reason: reason.into(),
    }
}

fn row_to_agent(row: &Row) -> StateResult<Agent> {
    let status_str: String = row.try_get("status").map_err(pg_err)?;
    let capabilities: JsonValue = row.try_get("capabilities").map_err(pg_err)?;
    Ok(Agent {
        agent_id: row.try_get("agent_id").map_err(pg_err)?,
        status: AgentStatus::from_db_str(&status_str)
            .map_err(|e| integrity(format!("agents row: {e}")))?,
        current_task_id: row.try_get("current_task_id").map_err(pg_err)?,
        context_usage: row.try_get("context_usage").map_err(pg_err)?,
        last_activity: row.try_get("last_activity").map_err(pg_err)?,
        capabilities: serde_json::from_value(capabilities)
            .map_err(|e| StateError::serde("agent capabilities", e))?,
        performance_metrics: row.try_get("performance_metrics").map_err(pg_err)?,
        created_at: row.try_get("created_at").map_err(pg_err)?,
        updated_at: row.try_get("updated_at").map_err(pg_err)?,
    })
}

fn row_to_task(row: &Row) -> StateResult<Task> {
    let status_str: String = row.try_get("status").map_err(pg_err)?;
    Ok(Task {
        task_id: row.try_get("task_id").map_err(pg_err)?,
        status: TaskStatus::from_db_str(&status_str)
            .map_err(|e| integrity(format!("tasks row: {e}")))?,
        agent_id: row.try_get("agent_id").map_err(pg_err)?,
        priority: row.try_get("priority").map_err(pg_err)?,
        created_at: row.try_get("created_at").map_err(pg_err)?,
        started_at: row.try_get("started_at").map_err(pg_err)?,
        completed_at: row.try_get("completed_at").map_err(pg_err)?,
        metadata: row.try_get("metadata").map_err(pg_err)?,
        result: row.try_get("result").map_err(pg_err)?,
        updated_at: row.try_get("updated_at").map_err(pg_err)?,
    })
}

fn row_to_snapshot(row: &Row) -> StateResult<SystemSnapshot> {
    Ok(SystemSnapshot {
        id: row.try_get("id").map_err(pg_err)?,
        timestamp: row.try_get("timestamp").map_err(pg_err)?,
        total_agents: row.try_get("total_agents").map_err(pg_err)?,
        active_agents: row.try_get("active_agents").map_err(pg_err)?,
        total_tasks: row.try_get("total_tasks").map_err(pg_err)?,
        completed_tasks: row.try_get("completed_tasks").map_err(pg_err)?,
        failed_tasks: row.try_get("failed_tasks").map_err(pg_err)?,
        average_context_usage: row.try_get("average_context_usage").map_err(pg_err)?,
        quality_score: row.try_get("quality_score").map_err(pg_err)?,
        metadata: row.try_get("metadata").map_err(pg_err)?,
    })
}

fn row_to_checkpoint(row: &Row) -> StateResult<Checkpoint> {
    Ok(Checkpoint {
        id: row.try_get("id").map_err(pg_err)?,
        checkpoint_name: row.try_get("checkpoint_name").map_err(pg_err)?,
        timestamp: row.try_get("timestamp").map_err(pg_err)?,
        data: row.try_get("data").map_err(pg_err)?,
    })
}

// ============================================================================
// PERSISTENT STORE
// ============================================================================

/// Persistent store manager over a bounded connection pool.
#[derive(Clone)]
pub struct PersistentStore {
    pool: Pool,
    config: PostgresConfig,
}

impl PersistentStore {
    /// Create a store with an existing pool.
    pub fn new(pool: Pool, config: PostgresConfig) -> Self {
        Self { pool, config }
    }

    /// Create a store from configuration.
    pub fn from_config(config: PostgresConfig) -> StateResult<Self> {
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

    async fn conn(&self) -> StateResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    /// Run a store call under the configured timeout. A timed-out call is
    /// treated identically to a connectivity failure by callers.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> StateResult<T>
    where
        F: Future<Output = StateResult<T>>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StateError::Timeout {
                operation,
                timeout: self.config.timeout,
            }),
        }
    }

    /// Create the schema if it does not exist yet (idempotent bootstrap).
    pub async fn ensure_schema(&self) -> StateResult<()> {
        self.timed("ensure_schema", async {
            let conn = self.conn().await?;
            for stmt in SCHEMA_STATEMENTS {
                conn.execute(*stmt, &[]).await.map_err(pg_err)?;
            }
            Ok(())
        })
        .await
    }
}

const AGENT_COALESCE_UPDATE: &str = "UPDATE agents SET
         status = COALESCE($2, status),
         current_task_id = COALESCE($3, current_task_id),
         context_usage = COALESCE($4, context_usage),
         last_activity = COALESCE($5, last_activity),
         capabilities = COALESCE($6, capabilities),
         performance_metrics = COALESCE($7, performance_metrics),
         updated_at = now()
     WHERE agent_id = $1";

/// Bind an [`AgentUpdate`] as the `$2..$7` parameters of
/// [`AGENT_COALESCE_UPDATE`].
fn update_params(update: &AgentUpdate) -> (Option<String>, Option<JsonValue>) {
    let status = update.status.map(|s| s.as_db_str().to_string());
    let capabilities = update
        .capabilities
        .as_ref()
        .map(|caps| serde_json::json!(caps));
    (status, capabilities)
}

#[async_trait]
impl PersistentBackend for PersistentStore {
    async fn try_register_agent(
        &self,
        agent_id: &str,
        capabilities: &[String],
    ) -> StateResult<bool> {
        self.timed("register_agent", async {
            let conn = self.conn().await?;
            let caps = serde_json::json!(capabilities);
            let affected = conn
                .execute(
                    "INSERT INTO agents (agent_id, capabilities)
                     VALUES ($1, $2)
                     ON CONFLICT (agent_id) DO UPDATE SET
                         capabilities = EXCLUDED.capabilities,
                         last_activity = now(),
                         updated_at = now()",
                    &[&agent_id, &caps],
                )
                .await
                .map_err(pg_err)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn try_get_agent_state(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        self.timed("get_agent_state", async {
            let conn = self.conn().await?;
            let row = conn
                .query_opt(
                    format!("SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = $1").as_str(),
                    &[&agent_id],
                )
                .await
                .map_err(pg_err)?;
            row.as_ref().map(row_to_agent).transpose()
        })
        .await
    }

    async fn try_update_agent_state(
        &self,
        agent_id: &str,
        update: &AgentUpdate,
    ) -> StateResult<bool> {
        self.timed("update_agent_state", async {
            let conn = self.conn().await?;
            let (status, capabilities) = update_params(update);
            let affected = conn
                .execute(
                    AGENT_COALESCE_UPDATE,
                    &[
                        &agent_id,
                        &status,
                        &update.current_task_id,
                        &update.context_usage,
                        &update.last_activity,
                        &capabilities,
                        &update.performance_metrics,
                    ],
                )
                .await
                .map_err(pg_err)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn try_get_active_agents(&self) -> StateResult<Vec<Agent>> {
        self.timed("get_active_agents", async {
            let conn = self.conn().await?;
            let rows = conn
                .query(
                    format!(
                        "SELECT {AGENT_COLUMNS} FROM agents
                         WHERE status IN ('idle', 'busy')
                           AND last_activity > now() - interval '1 hour'
                         ORDER BY last_activity DESC"
                    )
                    .as_str(),
                    &[],
                )
                .await
                .map_err(pg_err)?;
            rows.iter().map(row_to_agent).collect()
        })
        .await
    }

    async fn try_create_task(&self, task: NewTask) -> StateResult<String> {
        self.timed("create_task", async {
            let task = task.into_task();
            let conn = self.conn().await?;
            conn.execute(
                format!(
                    "INSERT INTO tasks ({TASK_COLUMNS})
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())"
                )
                .as_str(),
                &[
                    &task.task_id,
                    &task.status.as_db_str(),
                    &task.agent_id,
                    &task.priority,
                    &task.created_at,
                    &task.started_at,
                    &task.completed_at,
                    &task.metadata,
                    &task.result,
                ],
            )
            .await
            .map_err(pg_err)?;
            Ok(task.task_id)
        })
        .await
    }

    async fn try_get_task(&self, task_id: &str) -> StateResult<Option<Task>> {
        self.timed("get_task", async {
            let conn = self.conn().await?;
            let row = conn
                .query_opt(
                    format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = $1").as_str(),
                    &[&task_id],
                )
                .await
                .map_err(pg_err)?;
            row.as_ref().map(row_to_task).transpose()
        })
        .await
    }

    async fn try_get_pending_tasks(&self, limit: i64) -> StateResult<Vec<Task>> {
        self.timed("get_pending_tasks", async {
            let conn = self.conn().await?;
            // priority desc, created_at asc: load-bearing for fairness.
            let rows = conn
                .query(
                    format!(
                        "SELECT {TASK_COLUMNS} FROM tasks
                         WHERE status = 'pending'
                         ORDER BY priority DESC, created_at ASC
                         LIMIT $1"
                    )
                    .as_str(),
                    &[&limit],
                )
                .await
                .map_err(pg_err)?;
            rows.iter().map(row_to_task).collect()
        })
        .await
    }

    async fn try_assign_task(&self, task_id: &str, agent_id: &str) -> StateResult<bool> {
        self.timed("assign_task", async {
            let conn = self.conn().await?;
            // Single conditional update: concurrent callers can never both
            // match the pending row.
            let affected = conn
                .execute(
                    "UPDATE tasks SET
                         agent_id = $2,
                         status = 'assigned',
                         started_at = now(),
                         updated_at = now()
                     WHERE task_id = $1 AND status = 'pending'",
                    &[&task_id, &agent_id],
                )
                .await
                .map_err(pg_err)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn try_update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<JsonValue>,
    ) -> StateResult<bool> {
        self.timed("update_task_status", async {
            let conn = self.conn().await?;
            let terminal = status.is_terminal();
            let affected = conn
                .execute(
                    "UPDATE tasks SET
                         status = $2,
                         result = COALESCE($3, result),
                         completed_at = CASE WHEN $4 THEN now() ELSE completed_at END,
                         updated_at = now()
                     WHERE task_id = $1",
                    &[&task_id, &status.as_db_str(), &result, &terminal],
                )
                .await
                .map_err(pg_err)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn try_create_system_snapshot(&self) -> StateResult<bool> {
        self.timed("create_system_snapshot", async {
            let conn = self.conn().await?;
            let id = colony_core::new_id();
            let affected = conn
                .execute(
                    "INSERT INTO system_snapshots
                         (id, timestamp, total_agents, active_agents, total_tasks,
                          completed_tasks, failed_tasks, average_context_usage,
                          quality_score, metadata)
                     SELECT $1, now(),
                         (SELECT count(*) FROM agents),
                         (SELECT count(*) FROM agents WHERE status IN ('idle', 'busy')),
                         (SELECT count(*) FROM tasks),
                         (SELECT count(*) FROM tasks WHERE status = 'completed'),
                         (SELECT count(*) FROM tasks WHERE status = 'failed'),
                         (SELECT COALESCE(avg(context_usage), 0.0) FROM agents),
                         (SELECT CASE
                              WHEN count(*) FILTER (WHERE status IN ('completed', 'failed')) = 0
                                  THEN 1.0
                              ELSE count(*) FILTER (WHERE status = 'completed')::double precision
                                   / count(*) FILTER (WHERE status IN ('completed', 'failed'))
                          END FROM tasks),
                         '{}'::jsonb",
                    &[&id],
                )
                .await
                .map_err(pg_err)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn try_create_checkpoint(&self, name: &str, data: JsonValue) -> StateResult<String> {
        self.timed("create_checkpoint", async {
            let conn = self.conn().await?;
            let id = colony_core::new_id();
            conn.execute(
                "INSERT INTO checkpoints (id, checkpoint_name, data) VALUES ($1, $2, $3)",
                &[&id, &name, &data],
            )
            .await
            .map_err(pg_err)?;
            Ok(id)
        })
        .await
    }

    async fn try_get_checkpoints(
        &self,
        name_prefix: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StateResult<Vec<Checkpoint>> {
        self.timed("get_checkpoints", async {
            let conn = self.conn().await?;
            let prefix = name_prefix.map(|p| format!("{p}%"));
            let rows = conn
                .query(
                    "SELECT id, checkpoint_name, timestamp, data FROM checkpoints
                     WHERE ($1::text IS NULL OR checkpoint_name LIKE $1)
                       AND ($2::timestamptz IS NULL OR timestamp >= $2)
                     ORDER BY timestamp DESC
                     LIMIT $3",
                    &[&prefix, &since, &limit],
                )
                .await
                .map_err(pg_err)?;
            rows.iter().map(row_to_checkpoint).collect()
        })
        .await
    }

    async fn try_get_recent_snapshots(&self, limit: i64) -> StateResult<Vec<SystemSnapshot>> {
        self.timed("get_recent_snapshots", async {
            let conn = self.conn().await?;
            let rows = conn
                .query(
                    "SELECT id, timestamp, total_agents, active_agents, total_tasks,
                            completed_tasks, failed_tasks, average_context_usage,
                            quality_score, metadata
                     FROM system_snapshots
                     ORDER BY timestamp DESC
                     LIMIT $1",
                    &[&limit],
                )
                .await
                .map_err(pg_err)?;
            rows.iter().map(row_to_snapshot).collect()
        })
        .await
    }

    async fn try_import_snapshot(&self, snapshot: &SystemSnapshot) -> StateResult<bool> {
        self.timed("import_snapshot", async {
            let conn = self.conn().await?;
            let affected = conn
                .execute(
                    "INSERT INTO system_snapshots
                         (id, timestamp, total_agents, active_agents, total_tasks,
                          completed_tasks, failed_tasks, average_context_usage,
                          quality_score, metadata)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                     ON CONFLICT (id) DO NOTHING",
                    &[
                        &snapshot.id,
                        &snapshot.timestamp,
                        &snapshot.total_agents,
                        &snapshot.active_agents,
                        &snapshot.total_tasks,
                        &snapshot.completed_tasks,
                        &snapshot.failed_tasks,
                        &snapshot.average_context_usage,
                        &snapshot.quality_score,
                        &snapshot.metadata,
                    ],
                )
                .await
                .map_err(pg_err)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn try_import_checkpoint(&self, checkpoint: &Checkpoint) -> StateResult<bool> {
        self.timed("import_checkpoint", async {
            let conn = self.conn().await?;
            let affected = conn
                .execute(
                    "INSERT INTO checkpoints (id, checkpoint_name, timestamp, data)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (id) DO NOTHING",
                    &[
                        &checkpoint.id,
                        &checkpoint.checkpoint_name,
                        &checkpoint.timestamp,
                        &checkpoint.data,
                    ],
                )
                .await
                .map_err(pg_err)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn try_batch_update_agents(
        &self,
        updates: &[(String, AgentUpdate)],
    ) -> StateResult<u64> {
        self.timed("batch_update_agents", async {
            let mut conn = self.conn().await?;
            let tx = conn.transaction().await.map_err(pg_err)?;
            let stmt = tx.prepare(AGENT_COALESCE_UPDATE).await.map_err(pg_err)?;

            let mut affected = 0u64;
            for (agent_id, update) in updates {
                let (status, capabilities) = update_params(update);
                let params: [&(dyn ToSql + Sync); 7] = [
                    agent_id,
                    &status,
                    &update.current_task_id,
                    &update.context_usage,
                    &update.last_activity,
                    &capabilities,
                    &update.performance_metrics,
                ];
                // An unknown agent id contributes 0; a statement error
                // aborts the whole transaction (rollback on drop).
                affected += tx.execute(&stmt, &params).await.map_err(pg_err)?;
            }

            tx.commit().await.map_err(pg_err)?;
            Ok(affected)
        })
        .await
    }

    async fn try_count_agents(&self) -> StateResult<i64> {
        self.timed("count_agents", async {
            let conn = self.conn().await?;
            let row = conn
                .query_one("SELECT count(*) FROM agents", &[])
                .await
                .map_err(pg_err)?;
            row.try_get(0).map_err(pg_err)
        })
        .await
    }

    async fn try_count_tasks(&self) -> StateResult<i64> {
        self.timed("count_tasks", async {
            let conn = self.conn().await?;
            let row = conn
                .query_one("SELECT count(*) FROM tasks", &[])
                .await
                .map_err(pg_err)?;
            row.try_get(0).map_err(pg_err)
        })
        .await
    }

    async fn health_check(&self) -> StoreHealth {
        let start = Instant::now();
        let probe = self
            .timed("health_check", async {
                let conn = self.conn().await?;
                conn.query_one("SELECT 1", &[]).await.map_err(pg_err)?;
                Ok(())
            })
            .await;

        match probe {
            Ok(()) => StoreHealth::connected(
                "postgres",
                self.pool_stats(),
                start.elapsed().as_millis() as i64,
            ),
            Err(e) => StoreHealth::unreachable("postgres", e.to_string()),
        }
    }
}

// ============================================================================
// SENTINEL SURFACE
// ============================================================================
//
// The public operation surface per the failure-semantics contract:
// connectivity/timeout errors are caught here, logged, and surfaced as
// `false` / `None` / empty values. Callers treat these as "not performed."

impl PersistentStore {
    pub async fn register_agent(&self, agent_id: &str, capabilities: &[String]) -> bool {
        or_sentinel(
            "postgres",
            "register_agent",
            self.try_register_agent(agent_id, capabilities).await,
            false,
        )
    }

    pub async fn get_agent_state(&self, agent_id: &str) -> Option<Agent> {
        or_sentinel(
            "postgres",
            "get_agent_state",
            self.try_get_agent_state(agent_id).await,
            None,
        )
    }

    pub async fn update_agent_state(&self, agent_id: &str, update: &AgentUpdate) -> bool {
        or_sentinel(
            "postgres",
            "update_agent_state",
            self.try_update_agent_state(agent_id, update).await,
            false,
        )
    }

    pub async fn get_active_agents(&self) -> Vec<Agent> {
        or_sentinel(
            "postgres",
            "get_active_agents",
            self.try_get_active_agents().await,
            Vec::new(),
        )
    }

    pub async fn create_task(&self, task: NewTask) -> Option<String> {
        or_sentinel(
            "postgres",
            "create_task",
            self.try_create_task(task).await.map(Some),
            None,
        )
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        or_sentinel("postgres", "get_task", self.try_get_task(task_id).await, None)
    }

    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<JsonValue>,
    ) -> bool {
        or_sentinel(
            "postgres",
            "update_task_status",
            self.try_update_task_status(task_id, status, result).await,
            false,
        )
    }

    pub async fn get_pending_tasks(&self, limit: i64) -> Vec<Task> {
        or_sentinel(
            "postgres",
            "get_pending_tasks",
            self.try_get_pending_tasks(limit).await,
            Vec::new(),
        )
    }

    pub async fn assign_task(&self, task_id: &str, agent_id: &str) -> bool {
        or_sentinel(
            "postgres",
            "assign_task",
            self.try_assign_task(task_id, agent_id).await,
            false,
        )
    }

    pub async fn create_system_snapshot(&self) -> bool {
        or_sentinel(
            "postgres",
            "create_system_snapshot",
            self.try_create_system_snapshot().await,
            false,
        )
    }

    pub async fn create_checkpoint(&self, name: &str, data: JsonValue) -> Option<String> {
        or_sentinel(
            "postgres",
            "create_checkpoint",
            self.try_create_checkpoint(name, data).await.map(Some),
            None,
        )
    }

    pub async fn get_recent_snapshots(&self, limit: i64) -> Vec<SystemSnapshot> {
        or_sentinel(
            "postgres",
            "get_recent_snapshots",
            self.try_get_recent_snapshots(limit).await,
            Vec::new(),
        )
    }

    pub async fn get_checkpoints(
        &self,
        name_prefix: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Vec<Checkpoint> {
        or_sentinel(
            "postgres",
            "get_checkpoints",
            self.try_get_checkpoints(name_prefix, since, limit).await,
            Vec::new(),
        )
    }

    pub async fn batch_update_agents(&self, updates: &[(String, AgentUpdate)]) -> u64 {
        or_sentinel(
            "postgres",
            "batch_update_agents",
            self.try_batch_update_agents(updates).await,
            0,
        )
    }

    /// Sentinel 0 means "count unavailable," never "empty"; callers needing
    /// the distinction use the typed surface.
    pub async fn count_agents(&self) -> i64 {
        or_sentinel("postgres", "count_agents", self.try_count_agents().await, 0)
    }

    pub async fn count_tasks(&self) -> i64 {
        or_sentinel("postgres", "count_tasks", self.try_count_tasks().await, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PostgresConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "colony");
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_pool_honors_configured_max_size() {
        // Pool creation is lazy; no live database is needed to check the bound.
        let config = PostgresConfig {
            max_size: 3,
            ..Default::default()
        };
        let pool = config.create_pool().unwrap();
        assert_eq!(pool.status().max_size, 3);
    }

    #[test]
    fn test_update_params_maps_status() {
        let update = AgentUpdate::status(AgentStatus::Busy);
        let (status, capabilities) = update_params(&update);
        assert_eq!(status.as_deref(), Some("busy"));
        assert!(capabilities.is_none());
    }

    #[test]
    fn test_update_params_serializes_capabilities() {
        let update = AgentUpdate {
            capabilities: Some(vec!["plan".to_string(), "search".to_string()]),
            ..Default::default()
        };
        let (_, capabilities) = update_params(&update);
        assert_eq!(capabilities, Some(serde_json::json!(["plan", "search"])));
    }

    #[test]
    fn test_schema_covers_required_tables_and_indexes() {
        let schema = SCHEMA_STATEMENTS.join("\n");
        for table in ["agents", "tasks", "system_snapshots", "checkpoints"] {
            assert!(schema.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
        assert!(schema.contains("idx_tasks_priority"));
        assert!(schema.contains("idx_agents_last_activity"));
    }
}

// Live-database integration coverage lives in tests/pg_integration.rs,
// feature-gated behind `pg-tests`.
