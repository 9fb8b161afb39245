//! Postgres-backed store and event log
//!
//! Requires a scratch database (`TEST_DATABASE_URL` or `DATABASE_URL`):
//! `cargo test -p tubeflow-integration-tests --test postgres_test -- --ignored`

mod common;

use std::sync::Arc;

use serial_test::serial;

use common::{assert_snapshot_invariants, pg_store};
use tubeflow_productions::generators::testing::ScriptedGenerator;
use tubeflow_productions::{
    EngineConfig, GeneratorRegistry, PgEventSink, ProjectStore, StageKind, StageStatus,
    WorkflowEngine,
};

// PG-I01: Engine runs against the Postgres store
#[tokio::test]
#[ignore] // Requires a Postgres database
#[serial]
async fn test_pipeline_on_postgres() {
    let (pool, store) = pg_store().await.unwrap();
    let generator = ScriptedGenerator::new();
    generator.push_failure("rate limited");

    let engine = WorkflowEngine::new(
        Arc::new(store.clone()),
        GeneratorRegistry::uniform(Arc::new(generator)),
        Arc::new(PgEventSink::new(pool.clone())),
        EngineConfig::default(),
    );

    let project = engine.create_project("Pg Demo").await.unwrap();
    engine.advance(project.id()).await.unwrap_err();

    let snapshot = engine.get_status(project.id()).await.unwrap();
    assert_eq!(
        snapshot.stage(StageKind::Research).unwrap().status,
        StageStatus::Failed
    );
    assert_snapshot_invariants(&snapshot);

    engine.retry(project.id()).await.unwrap();
    for _ in 1..StageKind::ALL.len() {
        engine.advance(project.id()).await.unwrap();
    }

    let snapshot = engine.get_status(project.id()).await.unwrap();
    assert!(snapshot.is_complete());
    assert_snapshot_invariants(&snapshot);

    engine.delete_project(project.id()).await.unwrap();
    assert!(store.get(project.id()).await.unwrap().is_none());

    let stage_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM production_stages WHERE project_id = $1")
            .bind(project.id())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stage_rows, 0);
}

// PG-I02: Database rejects a second in-progress stage
#[tokio::test]
#[ignore] // Requires a Postgres database
#[serial]
async fn test_schema_enforces_single_in_progress_stage() {
    let (pool, store) = pg_store().await.unwrap();
    let engine = WorkflowEngine::new(
        Arc::new(store.clone()),
        GeneratorRegistry::uniform(Arc::new(ScriptedGenerator::new())),
        Arc::new(PgEventSink::new(pool.clone())),
        EngineConfig::default(),
    );
    let project = engine.create_project("Constraint Demo").await.unwrap();
    engine.advance(project.id()).await.unwrap();

    sqlx::query(
        "UPDATE production_stages SET status = 'in_progress', artifact = NULL \
         WHERE project_id = $1 AND stage = 'research'",
    )
    .bind(project.id())
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        "UPDATE production_stages SET status = 'in_progress' \
         WHERE project_id = $1 AND stage = 'script'",
    )
    .bind(project.id())
    .execute(&pool)
    .await;
    assert!(result.is_err());

    store.delete(project.id()).await.unwrap();
}
