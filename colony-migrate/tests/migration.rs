//! End-to-end migration tests over a seeded legacy database and in-memory
//! target backends.

use colony_core::{AgentStatus, TaskStatus};
use colony_migrate::{MigrationConfig, MigrationPhase, Migrator};
use colony_store::memory::{InMemoryEphemeral, InMemoryPersistent};
use colony_store::{EphemeralBackend, HybridOrchestrator, PersistentBackend};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const LEGACY_SCHEMA: &str = "
    CREATE TABLE agents (
        agent_id TEXT PRIMARY KEY,
        status TEXT,
        current_task_id TEXT,
        context_usage REAL,
        last_activity TEXT,
        capabilities TEXT,
        performance_metrics TEXT,
        created_at TEXT,
        updated_at TEXT
    );
    CREATE TABLE tasks (
        task_id TEXT PRIMARY KEY,
        status TEXT,
        agent_id TEXT,
        priority INTEGER,
        created_at TEXT,
        started_at TEXT,
        completed_at TEXT,
        metadata TEXT,
        result TEXT,
        updated_at TEXT
    );
    CREATE TABLE system_snapshots (
        id TEXT PRIMARY KEY,
        timestamp TEXT,
        total_agents INTEGER,
        active_agents INTEGER,
        total_tasks INTEGER,
        completed_tasks INTEGER,
        failed_tasks INTEGER,
        average_context_usage REAL,
        quality_score REAL,
        metadata TEXT
    );
    CREATE TABLE checkpoints (
        id TEXT PRIMARY KEY,
        checkpoint_name TEXT,
        timestamp TEXT,
        data TEXT
    );
";

fn seed_legacy(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(LEGACY_SCHEMA).unwrap();

    let now = chrono::Utc::now().to_rfc3339();
    for i in 0..7 {
        let status = if i == 0 { "busy" } else { "idle" };
        conn.execute(
            "INSERT INTO agents VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?4, ?4)",
            rusqlite::params![
                format!("legacy-agent-{i}"),
                status,
                if i == 0 { 0.5 } else { 0.0 },
                now,
                r#"["search"]"#,
                if i == 0 { r#"{"latency_ms": 120}"# } else { "{}" },
            ],
        )
        .unwrap();
    }
    for i in 0..5 {
        let status = match i {
            0 | 1 => "pending",
            2 => "completed",
            _ => "failed",
        };
        conn.execute(
            "INSERT INTO tasks VALUES (?1, ?2, NULL, ?3, ?4, NULL, NULL, '{}', NULL, ?4)",
            rusqlite::params![format!("legacy-task-{i}"), status, 5 + i, now],
        )
        .unwrap();
    }
    conn.execute(
        "INSERT INTO system_snapshots VALUES ('snap-1', ?1, 7, 7, 5, 1, 2, 0.1, 0.33, '{}')",
        [&now],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO checkpoints VALUES ('cp-1', 'nightly', ?1, '{\"agents\": 7}')",
        [&now],
    )
    .unwrap();
}

struct Fixture {
    _dir: TempDir,
    path: PathBuf,
    persistent: Arc<InMemoryPersistent>,
    ephemeral: Arc<InMemoryEphemeral>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("colony.db");
        seed_legacy(&path);
        Self {
            _dir: dir,
            path,
            persistent: Arc::new(InMemoryPersistent::new()),
            ephemeral: Arc::new(InMemoryEphemeral::new()),
        }
    }

    fn migrator(&self, dry_run: bool) -> Migrator<InMemoryPersistent, InMemoryEphemeral> {
        let orchestrator =
            HybridOrchestrator::new(self.persistent.clone(), self.ephemeral.clone());
        let config = MigrationConfig {
            sqlite_path: self.path.clone(),
            batch_size: 3,
            dry_run,
            ..Default::default()
        };
        Migrator::new(orchestrator, config).unwrap()
    }
}

#[tokio::test]
async fn full_migration_preserves_counts() {
    let fixture = Fixture::new();
    let report = fixture.migrator(false).run().await;

    assert!(report.success(), "errors: {:?}", report.phases);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.phases.len(), 6);

    let agents = report.phase(MigrationPhase::AgentMigration).unwrap();
    assert_eq!(agents.records_migrated, 7);
    let tasks = report.phase(MigrationPhase::TaskMigration).unwrap();
    assert_eq!(tasks.records_migrated, 5);
    let system = report.phase(MigrationPhase::SystemDataMigration).unwrap();
    assert_eq!(system.records_migrated, 2);

    // 7 migrated agents plus the validation smoke probe.
    assert_eq!(fixture.persistent.try_count_agents().await.unwrap(), 8);
    assert_eq!(fixture.persistent.try_count_tasks().await.unwrap(), 5);
}

#[tokio::test]
async fn migration_preserves_non_default_agent_state() {
    let fixture = Fixture::new();
    let report = fixture.migrator(false).run().await;
    assert!(report.success());

    let agent = fixture
        .persistent
        .try_get_agent_state("legacy-agent-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(agent.status, AgentStatus::Busy);
    assert_eq!(agent.context_usage, 0.5);
    assert_eq!(agent.performance_metrics["latency_ms"], 120);
    assert_eq!(agent.capabilities, vec!["search".to_string()]);

    // The cache was populated with the post-update state.
    let cached = fixture
        .ephemeral
        .try_get_agent_state("legacy-agent-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.status, AgentStatus::Busy);
}

#[tokio::test]
async fn pending_tasks_are_cached_terminal_tasks_are_not() {
    let fixture = Fixture::new();
    assert!(fixture.migrator(false).run().await.success());

    let pending = fixture
        .persistent
        .try_get_task("legacy-task-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, TaskStatus::Pending);
    assert!(fixture
        .ephemeral
        .try_get_cached_task("legacy-task-0")
        .await
        .unwrap()
        .is_some());

    assert!(fixture
        .ephemeral
        .try_get_cached_task("legacy-task-2")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn dry_run_counts_match_real_run_with_zero_writes() {
    let dry = Fixture::new();
    let dry_report = dry.migrator(true).run().await;
    assert!(dry_report.success(), "errors: {:?}", dry_report.phases);
    assert!(dry_report.dry_run);

    // No target-side writes at all.
    assert_eq!(dry.persistent.try_count_agents().await.unwrap(), 0);
    assert_eq!(dry.persistent.try_count_tasks().await.unwrap(), 0);
    assert!(dry
        .persistent
        .try_get_checkpoints(Some("pre_migration"), None, 10)
        .await
        .unwrap()
        .is_empty());

    let real = Fixture::new();
    let real_report = real.migrator(false).run().await;
    assert!(real_report.success());

    for phase in [
        MigrationPhase::AgentMigration,
        MigrationPhase::TaskMigration,
        MigrationPhase::SystemDataMigration,
        MigrationPhase::Validation,
    ] {
        assert_eq!(
            dry_report.phase(phase).unwrap().records_migrated,
            real_report.phase(phase).unwrap().records_migrated,
            "count parity broken in {phase}",
        );
    }
}

#[tokio::test]
async fn pre_migration_checkpoint_recorded() {
    let fixture = Fixture::new();
    assert!(fixture.migrator(false).run().await.success());

    let checkpoints = fixture
        .persistent
        .try_get_checkpoints(Some("pre_migration"), None, 10)
        .await
        .unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].data["source_agents"], 7);
}

#[tokio::test]
async fn legacy_checkpoint_keeps_identity() {
    let fixture = Fixture::new();
    assert!(fixture.migrator(false).run().await.success());

    let imported = fixture
        .persistent
        .try_get_checkpoints(Some("nightly"), None, 10)
        .await
        .unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].id, "cp-1");
    assert_eq!(imported[0].data["agents"], 7);
}

#[tokio::test]
async fn unreachable_persistent_halts_after_infrastructure() {
    let fixture = Fixture::new();
    fixture.persistent.set_unavailable(true);

    let report = fixture.migrator(false).run().await;
    assert!(!report.success());
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.phases.len(), 2);

    let infra = report.phase(MigrationPhase::InfrastructureSetup).unwrap();
    assert!(!infra.success);
    assert!(!infra.rollback_available);
}

#[tokio::test]
async fn rollback_available_once_infrastructure_confirmed() {
    let fixture = Fixture::new();
    let report = fixture.migrator(false).run().await;

    let source = report.phase(MigrationPhase::SourceValidation).unwrap();
    assert!(!source.rollback_available);
    for phase in [
        MigrationPhase::InfrastructureSetup,
        MigrationPhase::AgentMigration,
        MigrationPhase::Validation,
    ] {
        assert!(report.phase(phase).unwrap().rollback_available);
    }
}

#[tokio::test]
async fn missing_required_table_halts_immediately() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("colony.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE agents (agent_id TEXT PRIMARY KEY)")
        .unwrap();
    drop(conn);

    let orchestrator = HybridOrchestrator::new(
        Arc::new(InMemoryPersistent::new()),
        Arc::new(InMemoryEphemeral::new()),
    );
    let config = MigrationConfig {
        sqlite_path: path,
        ..Default::default()
    };
    let report = Migrator::new(orchestrator, config).unwrap().run().await;

    assert_eq!(report.phases.len(), 1);
    let source = &report.phases[0];
    assert!(!source.success);
    assert!(source.errors.iter().any(|e| e.contains("tasks")));
}

#[tokio::test]
async fn missing_source_file_fails_open() {
    let orchestrator = HybridOrchestrator::new(
        Arc::new(InMemoryPersistent::new()),
        Arc::new(InMemoryEphemeral::new()),
    );
    let config = MigrationConfig {
        sqlite_path: PathBuf::from("/nonexistent/colony.db"),
        ..Default::default()
    };
    assert!(Migrator::new(orchestrator, config).is_err());
}
