//! Read-only access to the legacy embedded database.
//!
//! The legacy schema stores timestamps as text and JSON columns as text;
//! a malformed JSON cell falls back to the column default and is reported
//! as a row error rather than aborting the batch.

use chrono::{DateTime, Utc};
use colony_core::{AgentStatus, Checkpoint, SystemSnapshot, TaskStatus};
use rusqlite::{Connection, OpenFlags, Row};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::MigrateError;

/// Tables the migration cannot proceed without.
pub const REQUIRED_TABLES: [&str; 2] = ["agents", "tasks"];

/// Tables migrated when present, skipped silently when absent.
pub const OPTIONAL_TABLES: [&str; 2] = ["system_snapshots", "checkpoints"];

// ============================================================================
// LEGACY ROW TYPES
// ============================================================================

/// An agent row as read from the legacy database.
#[derive(Debug, Clone)]
pub struct LegacyAgent {
    pub agent_id: String,
    pub status: AgentStatus,
    pub current_task_id: Option<String>,
    pub context_usage: f64,
    pub last_activity: Option<DateTime<Utc>>,
    pub capabilities: Vec<String>,
    pub performance_metrics: JsonValue,
}

impl LegacyAgent {
    /// True when migrating this row needs a follow-up state update beyond
    /// plain registration.
    pub fn has_non_default_state(&self) -> bool {
        self.status != AgentStatus::Idle
            || self.current_task_id.is_some()
            || self.context_usage != 0.0
            || self
                .performance_metrics
                .as_object()
                .is_some_and(|m| !m.is_empty())
    }
}

/// A task row as read from the legacy database.
#[derive(Debug, Clone)]
pub struct LegacyTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub agent_id: Option<String>,
    pub priority: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: JsonValue,
    pub result: Option<JsonValue>,
}

/// One batch of parsed rows plus the per-row issues hit while parsing.
pub struct Batch<T> {
    pub rows: Vec<T>,
    pub errors: Vec<String>,
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Legacy timestamps are text in either RFC 3339 or `YYYY-MM-DD HH:MM:SS`.
fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    if let Ok(t) = DateTime::parse_from_rfc3339(&raw) {
        return Some(t.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|t| t.and_utc())
}

fn parse_json(raw: Option<String>, default: JsonValue, context: &mut Vec<String>, id: &str, column: &str) -> JsonValue {
    match raw {
        Some(text) => match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                context.push(format!("{id}: malformed {column} json: {e}"));
                default
            }
        },
        None => default,
    }
}

// ============================================================================
// LEGACY DATABASE
// ============================================================================

/// Read-only handle over the legacy database file.
#[derive(Debug)]
pub struct LegacyDatabase {
    conn: Connection,
}

impl LegacyDatabase {
    /// Open the file read-only; the migration never mutates the source.
    pub fn open(path: &Path) -> Result<Self, MigrateError> {
        if !path.exists() {
            return Err(MigrateError::Source {
                reason: format!("legacy database not found: {}", path.display()),
            });
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Names of the given tables that exist in the source.
    pub fn existing_tables(&self, names: &[&str]) -> Result<Vec<String>, MigrateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let found: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        Ok(names
            .iter()
            .filter(|n| found.iter().any(|f| f == *n))
            .map(|n| n.to_string())
            .collect())
    }

    pub fn count_rows(&self, table: &str) -> Result<i64, MigrateError> {
        let count = self
            .conn
            .query_row(format!("SELECT count(*) FROM {table}").as_str(), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Read one batch of agents ordered by rowid.
    pub fn read_agents(&self, limit: usize, offset: usize) -> Result<Batch<LegacyAgent>, MigrateError> {
        let mut errors = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, status, current_task_id, context_usage, last_activity,
                    capabilities, performance_metrics
             FROM agents ORDER BY rowid LIMIT ?1 OFFSET ?2",
        )?;
        let rows: Vec<LegacyAgent> = stmt
            .query_map([limit, offset], |row| Ok(read_agent_row(row, &mut errors)))?
            .collect::<Result<_, _>>()?;
        Ok(Batch { rows, errors })
    }

    /// Read one batch of tasks ordered by rowid.
    pub fn read_tasks(&self, limit: usize, offset: usize) -> Result<Batch<LegacyTask>, MigrateError> {
        let mut errors = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT task_id, status, agent_id, priority, created_at, started_at,
                    completed_at, metadata, result
             FROM tasks ORDER BY rowid LIMIT ?1 OFFSET ?2",
        )?;
        let rows: Vec<LegacyTask> = stmt
            .query_map([limit, offset], |row| Ok(read_task_row(row, &mut errors)))?
            .collect::<Result<_, _>>()?;
        Ok(Batch { rows, errors })
    }

    /// Snapshots newer than the window; older trend data is intentionally
    /// left behind.
    pub fn recent_snapshots(&self, window_days: i64) -> Result<Batch<SystemSnapshot>, MigrateError> {
        if self.existing_tables(&["system_snapshots"])?.is_empty() {
            return Ok(Batch {
                rows: Vec::new(),
                errors: Vec::new(),
            });
        }
        let cutoff = (Utc::now() - chrono::Duration::days(window_days)).to_rfc3339();
        let mut errors = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, total_agents, active_agents, total_tasks,
                    completed_tasks, failed_tasks, average_context_usage,
                    quality_score, metadata
             FROM system_snapshots WHERE timestamp >= ?1 ORDER BY timestamp DESC",
        )?;
        let rows: Vec<SystemSnapshot> = stmt
            .query_map([cutoff], |row| Ok(read_snapshot_row(row, &mut errors)))?
            .collect::<Result<_, _>>()?;
        Ok(Batch { rows, errors })
    }

    /// The most recent checkpoints, newest first, bounded.
    pub fn recent_checkpoints(&self, limit: i64) -> Result<Batch<Checkpoint>, MigrateError> {
        if self.existing_tables(&["checkpoints"])?.is_empty() {
            return Ok(Batch {
                rows: Vec::new(),
                errors: Vec::new(),
            });
        }
        let mut errors = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT id, checkpoint_name, timestamp, data
             FROM checkpoints ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let rows: Vec<Checkpoint> = stmt
            .query_map([limit], |row| Ok(read_checkpoint_row(row, &mut errors)))?
            .collect::<Result<_, _>>()?;
        Ok(Batch { rows, errors })
    }

    /// Sample agent ids for end-to-end validation.
    pub fn sample_agent_ids(&self, count: usize) -> Result<Vec<String>, MigrateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT agent_id FROM agents ORDER BY rowid LIMIT ?1")?;
        let ids = stmt
            .query_map([count], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        Ok(ids)
    }

    pub fn agent_status(&self, agent_id: &str) -> Result<Option<AgentStatus>, MigrateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT status FROM agents WHERE agent_id = ?1")?;
        let mut rows = stmt.query_map([agent_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(raw) => Ok(Some(AgentStatus::from_db_str(&raw?).unwrap_or_default())),
            None => Ok(None),
        }
    }
}

fn read_agent_row(row: &Row<'_>, errors: &mut Vec<String>) -> LegacyAgent {
    let agent_id: String = row.get(0).unwrap_or_default();
    let status = row
        .get::<_, Option<String>>(1)
        .ok()
        .flatten()
        .and_then(|s| AgentStatus::from_db_str(&s).ok())
        .unwrap_or_default();
    let capabilities_json = parse_json(
        row.get(5).ok().flatten(),
        JsonValue::Array(Vec::new()),
        errors,
        &agent_id,
        "capabilities",
    );
    let capabilities = capabilities_json
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    LegacyAgent {
        status,
        current_task_id: row.get(2).ok().flatten(),
        context_usage: row.get(3).unwrap_or(0.0),
        last_activity: parse_timestamp(row.get(4).ok().flatten()),
        capabilities,
        performance_metrics: parse_json(
            row.get(6).ok().flatten(),
            JsonValue::Object(serde_json::Map::new()),
            errors,
            &agent_id,
            "performance_metrics",
        ),
        agent_id,
    }
}

fn read_task_row(row: &Row<'_>, errors: &mut Vec<String>) -> LegacyTask {
    let task_id: String = row.get(0).unwrap_or_default();
    let status = row
        .get::<_, Option<String>>(1)
        .ok()
        .flatten()
        .and_then(|s| TaskStatus::from_db_str(&s).ok())
        .unwrap_or_default();
    LegacyTask {
        status,
        agent_id: row.get(2).ok().flatten(),
        priority: row.get(3).unwrap_or(colony_core::DEFAULT_TASK_PRIORITY),
        created_at: parse_timestamp(row.get(4).ok().flatten()),
        started_at: parse_timestamp(row.get(5).ok().flatten()),
        completed_at: parse_timestamp(row.get(6).ok().flatten()),
        metadata: parse_json(
            row.get(7).ok().flatten(),
            JsonValue::Object(serde_json::Map::new()),
            errors,
            &task_id,
            "metadata",
        ),
        result: row
            .get::<_, Option<String>>(8)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str(&raw).ok()),
        task_id,
    }
}

fn read_snapshot_row(row: &Row<'_>, errors: &mut Vec<String>) -> SystemSnapshot {
    let id: String = row.get(0).unwrap_or_default();
    SystemSnapshot {
        timestamp: parse_timestamp(row.get(1).ok().flatten()).unwrap_or_else(Utc::now),
        total_agents: row.get(2).unwrap_or(0),
        active_agents: row.get(3).unwrap_or(0),
        total_tasks: row.get(4).unwrap_or(0),
        completed_tasks: row.get(5).unwrap_or(0),
        failed_tasks: row.get(6).unwrap_or(0),
        average_context_usage: row.get(7).unwrap_or(0.0),
        quality_score: row.get(8).unwrap_or(1.0),
        metadata: parse_json(
            row.get(9).ok().flatten(),
            JsonValue::Object(serde_json::Map::new()),
            errors,
            &id,
            "metadata",
        ),
        id,
    }
}

fn read_checkpoint_row(row: &Row<'_>, errors: &mut Vec<String>) -> Checkpoint {
    let id: String = row.get(0).unwrap_or_default();
    Checkpoint {
        checkpoint_name: row.get(1).unwrap_or_default(),
        timestamp: parse_timestamp(row.get(2).ok().flatten()).unwrap_or_else(Utc::now),
        data: parse_json(
            row.get(3).ok().flatten(),
            JsonValue::Null,
            errors,
            &id,
            "data",
        ),
        id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp(Some("2026-08-01T10:00:00+00:00".to_string())).is_some());
        assert!(parse_timestamp(Some("2026-08-01 10:00:00".to_string())).is_some());
        assert!(parse_timestamp(Some("yesterday".to_string())).is_none());
        assert!(parse_timestamp(None).is_none());
    }

    #[test]
    fn test_malformed_json_falls_back_with_error() {
        let mut errors = Vec::new();
        let value = parse_json(
            Some("{not json".to_string()),
            JsonValue::Object(serde_json::Map::new()),
            &mut errors,
            "a1",
            "capabilities",
        );
        assert!(value.as_object().unwrap().is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("a1"));
    }

    #[test]
    fn test_open_missing_file_errors() {
        let err = LegacyDatabase::open(Path::new("/nonexistent/colony.db")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
