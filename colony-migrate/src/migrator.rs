//! Phase-sequenced migration driver.
//!
//! Six strictly sequential phases, each producing a typed result. Source
//! and infrastructure problems halt the run; per-row failures are collected
//! and reported without aborting the batch (unless `fail_fast` is set).
//!
//! `dry_run` executes every phase's read and comparison logic but performs
//! no target-side writes, counting what a real run would migrate. Dry-run
//! and real-run counts over the same source must agree.

use colony_core::{AgentUpdate, NewTask, TaskStatus};
use colony_store::{EphemeralBackend, HybridOrchestrator, PersistentBackend, StateManager};
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::legacy::{LegacyDatabase, REQUIRED_TABLES};
use crate::report::{MigrationPhase, MigrationReport, PhaseResult};
use crate::MigrateError;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Migration tuning knobs.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the legacy database file.
    pub sqlite_path: PathBuf,
    /// Rows read and applied per batch.
    pub batch_size: usize,
    /// Read and count, but write nothing to the targets.
    pub dry_run: bool,
    /// Abort the current phase on the first per-row failure instead of
    /// collecting errors best-effort.
    pub fail_fast: bool,
    /// Agents sampled end-to-end during validation.
    pub sample_size: usize,
    /// Snapshots older than this are intentionally left behind.
    pub snapshot_window_days: i64,
    /// Most-recent checkpoints carried over.
    pub checkpoint_limit: i64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("colony.db"),
            batch_size: 100,
            dry_run: false,
            fail_fast: false,
            sample_size: 10,
            snapshot_window_days: 30,
            checkpoint_limit: 50,
        }
    }
}

impl MigrationConfig {
    /// Create a configuration from `COLONY_MIGRATE_*` environment variables.
    pub fn from_env() -> Self {
        let parse = |var: &str, default: usize| {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        let flag = |var: &str| {
            std::env::var(var)
                .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };
        Self {
            sqlite_path: std::env::var("COLONY_MIGRATE_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("colony.db")),
            batch_size: parse("COLONY_MIGRATE_BATCH_SIZE", 100).max(1),
            dry_run: flag("COLONY_MIGRATE_DRY_RUN"),
            fail_fast: flag("COLONY_MIGRATE_FAIL_FAST"),
            sample_size: parse("COLONY_MIGRATE_SAMPLE_SIZE", 10),
            snapshot_window_days: parse("COLONY_MIGRATE_SNAPSHOT_WINDOW_DAYS", 30) as i64,
            checkpoint_limit: parse("COLONY_MIGRATE_CHECKPOINT_LIMIT", 50) as i64,
        }
    }
}

// ============================================================================
// MIGRATOR
// ============================================================================

/// Drives the legacy database into the hybrid layer through the
/// orchestrator's backends.
pub struct Migrator<P, E> {
    orchestrator: HybridOrchestrator<P, E>,
    legacy: LegacyDatabase,
    config: MigrationConfig,
}

impl<P, E> Migrator<P, E>
where
    P: PersistentBackend,
    E: EphemeralBackend,
{
    /// Open the legacy source read-only and prepare the migration.
    pub fn new(
        orchestrator: HybridOrchestrator<P, E>,
        config: MigrationConfig,
    ) -> Result<Self, MigrateError> {
        let legacy = LegacyDatabase::open(&config.sqlite_path)?;
        Ok(Self {
            orchestrator,
            legacy,
            config,
        })
    }

    /// Run every phase in order, halting on fatal failures.
    pub async fn run(&self) -> MigrationReport {
        info!(
            dry_run = self.config.dry_run,
            batch_size = self.config.batch_size,
            "starting migration"
        );

        let mut phases = Vec::new();
        let mut rollback_available = false;

        let steps: [MigrationPhase; 6] = [
            MigrationPhase::SourceValidation,
            MigrationPhase::InfrastructureSetup,
            MigrationPhase::AgentMigration,
            MigrationPhase::TaskMigration,
            MigrationPhase::SystemDataMigration,
            MigrationPhase::Validation,
        ];

        for phase in steps {
            let started = Instant::now();
            let mut result = match phase {
                MigrationPhase::SourceValidation => self.source_validation(),
                MigrationPhase::InfrastructureSetup => self.infrastructure_setup().await,
                MigrationPhase::AgentMigration => self.agent_migration().await,
                MigrationPhase::TaskMigration => self.task_migration().await,
                MigrationPhase::SystemDataMigration => self.system_data_migration().await,
                MigrationPhase::Validation => self.validation().await,
            };
            result.duration = started.elapsed();
            if phase == MigrationPhase::InfrastructureSetup && result.success {
                rollback_available = true;
            }
            result.rollback_available = rollback_available;

            info!(
                phase = %result.phase,
                success = result.success,
                records = result.records_migrated,
                errors = result.errors.len(),
                duration_ms = result.duration.as_millis() as u64,
                "phase finished"
            );

            let halt = result.fatal;
            phases.push(result);
            if halt {
                warn!(phase = %phase, "migration halted");
                break;
            }
        }

        MigrationReport {
            dry_run: self.config.dry_run,
            phases,
        }
    }

    // ------------------------------------------------------------------
    // Phase 1: source_validation
    // ------------------------------------------------------------------

    fn source_validation(&self) -> PhaseResult {
        let mut result = PhaseResult::new(MigrationPhase::SourceValidation);

        let present = match self.legacy.existing_tables(&REQUIRED_TABLES) {
            Ok(present) => present,
            Err(e) => {
                result.fail_fatal("source", e);
                return result;
            }
        };
        for table in REQUIRED_TABLES {
            if !present.iter().any(|p| p == table) {
                result.fail_fatal(table, "required table missing");
            }
        }
        if result.fatal {
            return result;
        }

        match (
            self.legacy.count_rows("agents"),
            self.legacy.count_rows("tasks"),
        ) {
            (Ok(agents), Ok(tasks)) => {
                info!(agents, tasks, "legacy source validated");
            }
            (Err(e), _) | (_, Err(e)) => result.fail_fatal("source", e),
        }
        result
    }

    // ------------------------------------------------------------------
    // Phase 2: infrastructure_setup
    // ------------------------------------------------------------------

    async fn infrastructure_setup(&self) -> PhaseResult {
        let mut result = PhaseResult::new(MigrationPhase::InfrastructureSetup);

        let health = self.orchestrator.health_check().await;
        if !health.persistent.connected {
            result.fail_fatal(
                &health.persistent.component,
                health
                    .persistent
                    .message
                    .as_deref()
                    .unwrap_or("unreachable"),
            );
        }
        if !health.ephemeral.connected {
            result.fail_fatal(
                &health.ephemeral.component,
                health.ephemeral.message.as_deref().unwrap_or("unreachable"),
            );
        }
        if result.fatal || self.config.dry_run {
            return result;
        }

        // Recoverability anchor: record the target's pre-migration shape.
        let counts = json!({
            "source_agents": self.legacy.count_rows("agents").unwrap_or(-1),
            "source_tasks": self.legacy.count_rows("tasks").unwrap_or(-1),
        });
        let name = format!("pre_migration:{}", chrono::Utc::now().timestamp());
        match self
            .orchestrator
            .persistent()
            .try_create_checkpoint(&name, counts)
            .await
        {
            Ok(id) => info!(checkpoint_id = %id, "pre-migration checkpoint created"),
            Err(e) => result.fail_fatal("pre_migration", e),
        }
        result
    }

    // ------------------------------------------------------------------
    // Phase 3: agent_migration
    // ------------------------------------------------------------------

    async fn agent_migration(&self) -> PhaseResult {
        let mut result = PhaseResult::new(MigrationPhase::AgentMigration);
        let mut offset = 0usize;

        loop {
            let batch = match self.legacy.read_agents(self.config.batch_size, offset) {
                Ok(batch) => batch,
                Err(e) => {
                    result.fail_fatal("source", e);
                    return result;
                }
            };
            for issue in &batch.errors {
                result.errors.push(format!("{}: {issue}", result.phase));
                result.success = false;
            }

            let read = batch.rows.len();
            for agent in batch.rows {
                if self.config.dry_run {
                    result.records_migrated += 1;
                    continue;
                }
                match self.migrate_agent(&agent).await {
                    Ok(()) => result.records_migrated += 1,
                    Err(e) => {
                        if self.config.fail_fast {
                            result.fail_fatal(&agent.agent_id, e);
                            return result;
                        }
                        result.push_error(&agent.agent_id, e);
                    }
                }
            }

            if read < self.config.batch_size {
                break;
            }
            offset += read;
        }
        result
    }

    async fn migrate_agent(&self, agent: &crate::legacy::LegacyAgent) -> Result<(), MigrateError> {
        let persistent = self.orchestrator.persistent();
        persistent
            .try_register_agent(&agent.agent_id, &agent.capabilities)
            .await?;

        if agent.has_non_default_state() || agent.last_activity.is_some() {
            let update = AgentUpdate {
                status: Some(agent.status),
                current_task_id: agent.current_task_id.clone(),
                context_usage: Some(agent.context_usage),
                last_activity: agent.last_activity,
                capabilities: None,
                performance_metrics: Some(agent.performance_metrics.clone()),
            };
            persistent
                .try_update_agent_state(&agent.agent_id, &update)
                .await?;
        }

        // Cache population is a side effect; its failure never fails the row.
        match persistent.try_get_agent_state(&agent.agent_id).await {
            Ok(Some(fresh)) => {
                if let Err(e) = self
                    .orchestrator
                    .ephemeral()
                    .try_set_agent_state(&fresh, None)
                    .await
                {
                    warn!(agent_id = %agent.agent_id, error = %e, "cache populate failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(agent_id = %agent.agent_id, error = %e, "cache refresh read failed"),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase 4: task_migration
    // ------------------------------------------------------------------

    async fn task_migration(&self) -> PhaseResult {
        let mut result = PhaseResult::new(MigrationPhase::TaskMigration);
        let mut offset = 0usize;

        loop {
            let batch = match self.legacy.read_tasks(self.config.batch_size, offset) {
                Ok(batch) => batch,
                Err(e) => {
                    result.fail_fatal("source", e);
                    return result;
                }
            };
            for issue in &batch.errors {
                result.errors.push(format!("{}: {issue}", result.phase));
                result.success = false;
            }

            let read = batch.rows.len();
            for task in batch.rows {
                if self.config.dry_run {
                    result.records_migrated += 1;
                    continue;
                }
                let request = NewTask {
                    task_id: Some(task.task_id.clone()),
                    status: Some(task.status),
                    agent_id: task.agent_id.clone(),
                    priority: Some(task.priority),
                    created_at: task.created_at,
                    started_at: task.started_at,
                    completed_at: task.completed_at,
                    metadata: Some(task.metadata.clone()),
                    result: task.result.clone(),
                };
                match self.orchestrator.persistent().try_create_task(request).await {
                    Ok(task_id) => {
                        result.records_migrated += 1;
                        // Hot path warm-up: only still-pending work is cached.
                        if task.status == TaskStatus::Pending {
                            self.orchestrator.cache_task(&task_id).await;
                        }
                    }
                    Err(e) => {
                        if self.config.fail_fast {
                            result.fail_fatal(&task.task_id, e);
                            return result;
                        }
                        result.push_error(&task.task_id, e);
                    }
                }
            }

            if read < self.config.batch_size {
                break;
            }
            offset += read;
        }
        result
    }

    // ------------------------------------------------------------------
    // Phase 5: system_data_migration
    // ------------------------------------------------------------------

    async fn system_data_migration(&self) -> PhaseResult {
        let mut result = PhaseResult::new(MigrationPhase::SystemDataMigration);

        let snapshots = match self.legacy.recent_snapshots(self.config.snapshot_window_days) {
            Ok(batch) => batch,
            Err(e) => {
                result.fail_fatal("source", e);
                return result;
            }
        };
        for issue in &snapshots.errors {
            result.errors.push(format!("{}: {issue}", result.phase));
            result.success = false;
        }
        for snapshot in snapshots.rows {
            if self.config.dry_run {
                result.records_migrated += 1;
                continue;
            }
            match self
                .orchestrator
                .persistent()
                .try_import_snapshot(&snapshot)
                .await
            {
                Ok(_) => result.records_migrated += 1,
                Err(e) => result.push_error(&snapshot.id, e),
            }
        }

        let checkpoints = match self.legacy.recent_checkpoints(self.config.checkpoint_limit) {
            Ok(batch) => batch,
            Err(e) => {
                result.fail_fatal("source", e);
                return result;
            }
        };
        for issue in &checkpoints.errors {
            result.errors.push(format!("{}: {issue}", result.phase));
            result.success = false;
        }
        for checkpoint in checkpoints.rows {
            if self.config.dry_run {
                result.records_migrated += 1;
                continue;
            }
            match self
                .orchestrator
                .persistent()
                .try_import_checkpoint(&checkpoint)
                .await
            {
                Ok(_) => result.records_migrated += 1,
                Err(e) => result.push_error(&checkpoint.id, e),
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Phase 6: validation
    // ------------------------------------------------------------------

    async fn validation(&self) -> PhaseResult {
        let mut result = PhaseResult::new(MigrationPhase::Validation);

        // Exact agent count match between source and target.
        let source_count = match self.legacy.count_rows("agents") {
            Ok(count) => count,
            Err(e) => {
                result.fail_fatal("source", e);
                return result;
            }
        };
        if !self.config.dry_run {
            match self.orchestrator.persistent().try_count_agents().await {
                Ok(target_count) if target_count == source_count => {}
                Ok(target_count) => result.push_error(
                    "agents",
                    format!("count mismatch: source {source_count} target {target_count}"),
                ),
                Err(e) => result.push_error("agents", e),
            }
        }

        // Sample agents end-to-end through the orchestrator; status must
        // match the source exactly.
        let sample = match self.legacy.sample_agent_ids(self.config.sample_size) {
            Ok(sample) => sample,
            Err(e) => {
                result.fail_fatal("source", e);
                return result;
            }
        };
        for agent_id in sample {
            if self.config.dry_run {
                result.records_migrated += 1;
                continue;
            }
            let expected = match self.legacy.agent_status(&agent_id) {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    result.push_error(&agent_id, e);
                    continue;
                }
            };
            match self.orchestrator.get_agent_state(&agent_id).await {
                Some(agent) if agent.status == expected => result.records_migrated += 1,
                Some(agent) => result.push_error(
                    &agent_id,
                    format!("status mismatch: source {expected} target {}", agent.status),
                ),
                None => result.push_error(&agent_id, "missing from target"),
            }
        }

        // Disposable write/read smoke test through the full stack.
        if self.config.dry_run {
            result.records_migrated += 1;
        } else {
            self.smoke_test(&mut result).await;
        }
        result
    }

    async fn smoke_test(&self, result: &mut PhaseResult) {
        let smoke_id = format!("migration-smoke-{}", colony_core::new_id());
        if !self
            .orchestrator
            .register_agent(&smoke_id, &["smoke".to_string()])
            .await
        {
            result.push_error(&smoke_id, "smoke write failed");
            return;
        }
        if self.orchestrator.get_agent_state(&smoke_id).await.is_none() {
            result.push_error(&smoke_id, "smoke read failed");
            return;
        }
        result.records_migrated += 1;

        // Cleanup: agents are never hard-deleted; park the probe offline and
        // evict its cache entry.
        let update = AgentUpdate::status(colony_core::AgentStatus::Offline);
        self.orchestrator.update_agent_state(&smoke_id, &update).await;
        if let Err(e) = self
            .orchestrator
            .ephemeral()
            .try_delete_agent_state(&smoke_id)
            .await
        {
            warn!(agent_id = %smoke_id, error = %e, "smoke cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.sample_size, 10);
        assert_eq!(config.snapshot_window_days, 30);
        assert_eq!(config.checkpoint_limit, 50);
        assert!(!config.dry_run);
        assert!(!config.fail_fast);
    }
}
