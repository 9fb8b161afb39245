//! Workflow engine scenarios through the public API
//!
//! Covers the pipeline walk-through, failure and retry, concurrency and the
//! timeout budget against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use common::{assert_snapshot_invariants, TestEngine};
use tubeflow_common::Error;
use tubeflow_productions::generators::testing::{GatedGenerator, Scripted, ScriptedGenerator};
use tubeflow_productions::{
    EngineConfig, GeneratorRegistry, InMemoryProjectStore, RecordingEventSink, StageKind,
    StageStatus, WorkflowEngine,
};

// PL-I01: Demo research succeeds, current moves to script
#[test_log::test(tokio::test)]
async fn test_demo_research_succeeds() {
    let t = TestEngine::new();
    let project = t.engine.create_project("Demo").await.unwrap();
    t.generator
        .push_artifact(json!({"insights": ["a", "b"], "summary": "s"}));

    let record = t.engine.advance(project.id()).await.unwrap();
    assert_eq!(record.status, StageStatus::Completed);

    let snapshot = t.engine.get_status(project.id()).await.unwrap();
    assert_eq!(snapshot.project.current_stage, Some(StageKind::Script));
    assert_eq!(
        snapshot.stage(StageKind::Research).unwrap().artifact(),
        Some(&json!({"insights": ["a", "b"], "summary": "s"}))
    );
    assert_snapshot_invariants(&snapshot);
}

// PL-I02: Demo2 rate limited, then retried successfully
#[test_log::test(tokio::test)]
async fn test_demo2_rate_limited_then_retried() {
    let t = TestEngine::new();
    let project = t.engine.create_project("Demo2").await.unwrap();
    t.generator.push_failure("rate limited");

    let err = t.engine.advance(project.id()).await.unwrap_err();
    assert_eq!(err.error_code(), "GENERATOR_ERROR");
    assert!(err.is_stage_failure());

    let snapshot = t.engine.get_status(project.id()).await.unwrap();
    let research = snapshot.stage(StageKind::Research).unwrap();
    assert_eq!(research.status, StageStatus::Failed);
    assert_eq!(research.error.as_deref(), Some("rate limited"));
    assert_eq!(snapshot.project.current_stage, Some(StageKind::Research));
    assert_snapshot_invariants(&snapshot);

    let record = t.engine.retry(project.id()).await.unwrap();
    assert_eq!(record.status, StageStatus::Completed);
    assert!(record.error.is_none());

    let snapshot = t.engine.get_status(project.id()).await.unwrap();
    assert_eq!(snapshot.project.current_stage, Some(StageKind::Script));
    assert_snapshot_invariants(&snapshot);
}

// PL-I03: Five advances complete the project, the sixth is rejected
#[test_log::test(tokio::test)]
async fn test_full_pipeline_and_sixth_advance() {
    let t = TestEngine::new();
    let project = t.engine.create_project("Demo").await.unwrap();

    for kind in StageKind::ALL {
        let before = t.engine.get_status(project.id()).await.unwrap();
        let record = t.engine.advance(project.id()).await.unwrap();
        let after = t.engine.get_status(project.id()).await.unwrap();

        assert_eq!(record.stage, kind);
        // Exactly one record changed
        let changed: Vec<StageKind> = before
            .stages
            .iter()
            .zip(&after.stages)
            .filter(|(b, a)| b != a)
            .map(|(_, a)| a.stage)
            .collect();
        assert_eq!(changed, vec![kind]);
        assert_eq!(after.project.current_stage, kind.next());
        assert_snapshot_invariants(&after);
    }

    let err = t.engine.advance(project.id()).await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_STATE");

    let names = t.events.event_names();
    assert_eq!(names.first().map(String::as_str), Some("project.created"));
    assert_eq!(names.last().map(String::as_str), Some("project.completed"));
    assert_eq!(
        names.iter().filter(|name| *name == "stage.completed").count(),
        5
    );
}

// PL-I04: Rejected operations mutate nothing
#[test_log::test(tokio::test)]
async fn test_rejected_operations_are_side_effect_free() {
    let t = TestEngine::new();
    let project = t.engine.create_project("Demo").await.unwrap();
    t.engine.advance(project.id()).await.unwrap();
    let before = t.engine.get_status(project.id()).await.unwrap();
    let events_before = t.events.recorded_events().len();

    let err = t.engine.retry(project.id()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    assert_eq!(t.engine.get_status(project.id()).await.unwrap(), before);
    assert_eq!(t.events.recorded_events().len(), events_before);
}

// PL-I05: Unknown ids are NotFound everywhere
#[test_log::test(tokio::test)]
async fn test_unknown_project() {
    let t = TestEngine::new();
    let id = Uuid::new_v4();

    assert!(matches!(t.engine.get_status(id).await, Err(Error::NotFound(_))));
    assert!(matches!(t.engine.advance(id).await, Err(Error::NotFound(_))));
    assert!(matches!(t.engine.retry(id).await, Err(Error::NotFound(_))));
    assert!(matches!(
        t.engine.delete_project(id).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        t.engine.recover_interrupted(id).await,
        Err(Error::NotFound(_))
    ));
}

// PL-I06: Name validation
#[test_log::test(tokio::test)]
async fn test_invalid_names() {
    let t = TestEngine::new();
    let too_long = "x".repeat(201);
    for name in ["", "   ", too_long.as_str()] {
        let err = t.engine.create_project(name).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
    assert!(t.store.is_empty().await);
}

// PL-I07: Concurrent advances on one project, exactly one proceeds
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_advance_exactly_one_proceeds() {
    let gated = GatedGenerator::new();
    let engine = Arc::new(WorkflowEngine::new(
        Arc::new(InMemoryProjectStore::new()),
        GeneratorRegistry::uniform(Arc::new(gated.clone())),
        Arc::new(RecordingEventSink::new()),
        EngineConfig::default(),
    ));
    let id = engine.create_project("Demo").await.unwrap().id();

    let holder = tokio::spawn({
        let engine = engine.clone();
        async move { engine.advance(id).await }
    });
    gated.wait_entered().await;

    let contenders: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.advance(id).await })
        })
        .collect();
    for contender in contenders {
        let err = contender.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::InvalidState(ref msg) if msg.contains("already in progress")));
    }

    gated.release();
    let record = holder.await.unwrap().unwrap();
    assert_eq!(record.status, StageStatus::Completed);
    assert_eq!(record.attempts, 1);
    assert_eq!(engine.active_locks(), 0);
}

// PL-I08: Per-call timeout overrides the default budget
#[test_log::test(tokio::test(start_paused = true))]
async fn test_per_call_timeout() {
    let t = TestEngine::with_config(EngineConfig {
        stage_timeout: None,
        max_attempts: Some(3),
    });
    let project = t.engine.create_project("Demo").await.unwrap();
    t.engine.advance(project.id()).await.unwrap();
    t.generator.push(Scripted::Hang);

    let err = t
        .engine
        .advance_with_timeout(project.id(), Some(Duration::from_secs(30)))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "TIMEOUT");
    assert_eq!(err.to_string(), "Stage script timed out after 30s");

    let snapshot = t.engine.get_status(project.id()).await.unwrap();
    assert_eq!(
        snapshot.stage(StageKind::Script).unwrap().error.as_deref(),
        Some("stage script timed out after 30s")
    );
    assert_snapshot_invariants(&snapshot);

    t.generator.push(Scripted::Hang);
    let err = t
        .engine
        .retry_with_timeout(project.id(), Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { seconds: 1, .. }));
    assert_eq!(
        t.events
            .event_names()
            .iter()
            .filter(|name| *name == "stage.timed_out")
            .count(),
        2
    );
}

// PL-I09: Attempt ceiling stops retries
#[test_log::test(tokio::test)]
async fn test_attempt_ceiling_stops_retries() {
    let t = TestEngine::new();
    let project = t.engine.create_project("Demo").await.unwrap();
    t.generator
        .push_failure("one")
        .push_failure("two")
        .push_failure("three");

    t.engine.advance(project.id()).await.unwrap_err();
    t.engine.retry(project.id()).await.unwrap_err();
    t.engine.retry(project.id()).await.unwrap_err();

    let err = t.engine.retry(project.id()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid state: stage research exhausted 3 attempts"
    );
    let research = t
        .engine
        .get_status(project.id())
        .await
        .unwrap()
        .stage(StageKind::Research)
        .cloned()
        .unwrap();
    assert_eq!(research.attempts, 3);
    assert_eq!(research.error.as_deref(), Some("three"));
}

// PL-I10: Delete removes project and stages together
#[test_log::test(tokio::test)]
async fn test_delete_project() {
    let t = TestEngine::new();
    let keep = t.engine.create_project("Keep").await.unwrap();
    let doomed = t.engine.create_project("Doomed").await.unwrap();
    t.engine.advance(doomed.id()).await.unwrap();

    t.engine.delete_project(doomed.id()).await.unwrap();

    assert_eq!(t.store.len().await, 1);
    assert!(t.engine.get_status(keep.id()).await.is_ok());
    assert!(t.events.event_names().contains(&"project.deleted".to_string()));
}

// PL-I11: Each stage's generator sees only earlier artifacts
#[test_log::test(tokio::test)]
async fn test_stage_specific_generators() {
    let research = ScriptedGenerator::new();
    let rest = ScriptedGenerator::new();
    research.push_artifact(json!({"topic": "bees"}));

    let registry = GeneratorRegistry::uniform(Arc::new(rest.clone()))
        .with(StageKind::Research, Arc::new(research.clone()));
    let t = TestEngine::with_registry(registry, rest.clone(), EngineConfig::default());

    let project = t.engine.create_project("Bees").await.unwrap();
    for _ in StageKind::ALL {
        t.engine.advance(project.id()).await.unwrap();
    }

    assert_eq!(research.call_count(), 1);
    assert_eq!(
        rest.stages_called(),
        vec![
            StageKind::Script,
            StageKind::Storyboard,
            StageKind::Render,
            StageKind::Upload
        ]
    );
    let upload_ctx = rest.calls().pop().unwrap();
    assert_eq!(upload_ctx.prior().len(), 4);
    assert_eq!(
        upload_ctx.artifact(StageKind::Research).unwrap(),
        &json!({"topic": "bees"})
    );
}
