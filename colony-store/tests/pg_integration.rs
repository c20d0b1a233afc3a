//! Live PostgreSQL integration tests.
//!
//! Run against a disposable database with:
//!
//! ```sh
//! COLONY_DB_NAME=colony_test cargo test -p colony-store --features pg-tests
//! ```

#![cfg(feature = "pg-tests")]

use colony_core::{AgentStatus, AgentUpdate, NewTask, TaskStatus};
use colony_store::{PersistentBackend, PersistentStore, PostgresConfig};

async fn store() -> PersistentStore {
    let store = PersistentStore::from_config(PostgresConfig::from_env())
        .expect("pool creation");
    store.ensure_schema().await.expect("schema setup");
    store
}

#[tokio::test]
async fn register_is_idempotent() {
    let store = store().await;
    let agent_id = colony_core::new_id();

    assert!(store
        .try_register_agent(&agent_id, &["search".to_string()])
        .await
        .unwrap());
    assert!(store
        .try_register_agent(&agent_id, &["search".to_string(), "code".to_string()])
        .await
        .unwrap());

    let agent = store.try_get_agent_state(&agent_id).await.unwrap().unwrap();
    assert_eq!(agent.capabilities.len(), 2);
    assert_eq!(agent.status, AgentStatus::Idle);
}

#[tokio::test]
async fn partial_update_coalesces() {
    let store = store().await;
    let agent_id = colony_core::new_id();
    store.try_register_agent(&agent_id, &["a".to_string()]).await.unwrap();

    let update = AgentUpdate {
        status: Some(AgentStatus::Busy),
        context_usage: Some(0.3),
        ..Default::default()
    };
    assert!(store.try_update_agent_state(&agent_id, &update).await.unwrap());

    let agent = store.try_get_agent_state(&agent_id).await.unwrap().unwrap();
    assert_eq!(agent.status, AgentStatus::Busy);
    assert_eq!(agent.context_usage, 0.3);
    assert_eq!(agent.capabilities, vec!["a".to_string()]);
}

#[tokio::test]
async fn assignment_is_compare_and_set() {
    let store = store().await;
    let task_id = store.try_create_task(NewTask::default()).await.unwrap();

    assert!(store.try_assign_task(&task_id, "agent-a").await.unwrap());
    assert!(!store.try_assign_task(&task_id, "agent-b").await.unwrap());

    let task = store.try_get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.agent_id.as_deref(), Some("agent-a"));
    assert!(task.started_at.is_some());
}

#[tokio::test]
async fn terminal_status_records_completion() {
    let store = store().await;
    let task_id = store.try_create_task(NewTask::default()).await.unwrap();
    store.try_assign_task(&task_id, "agent-a").await.unwrap();

    assert!(store
        .try_update_task_status(
            &task_id,
            TaskStatus::Completed,
            Some(serde_json::json!({"ok": true})),
        )
        .await
        .unwrap());

    let task = store.try_get_task(&task_id).await.unwrap().unwrap();
    assert!(task.completed_at.is_some());
    assert_eq!(task.result.unwrap()["ok"], true);
}

#[tokio::test]
async fn snapshot_aggregates_current_state() {
    let store = store().await;
    store
        .try_register_agent(&colony_core::new_id(), &[])
        .await
        .unwrap();

    assert!(store.try_create_system_snapshot().await.unwrap());
    let snapshots = store.try_get_recent_snapshots(1).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].total_agents >= 1);
    assert!(snapshots[0].quality_score >= 0.0 && snapshots[0].quality_score <= 1.0);
}

#[tokio::test]
async fn health_check_reports_pool() {
    let store = store().await;
    let health = store.health_check().await;
    assert!(health.connected);
    assert!(health.sample_query_latency_ms.is_some());
}
