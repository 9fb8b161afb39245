//! LLM and media generators driven through the workflow engine

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{assert_snapshot_invariants, TestEngine};
use tubeflow_common::Error;
use tubeflow_llm::mock::MockLlmService;
use tubeflow_llm::LlmError;
use tubeflow_media::mock::{MockMediaBehavior, MockOutcome, MockPublishService, MockRenderService};
use tubeflow_media::{MediaServices, Visibility};
use tubeflow_productions::generators::testing::ScriptedGenerator;
use tubeflow_productions::generators::{
    RenderArtifact, ResearchArtifact, ScriptArtifact, StoryboardArtifact, UploadArtifact,
};
use tubeflow_productions::{EngineConfig, GeneratorFactory, StageKind, StageStatus};

const RESEARCH_REPLY: &str = r#"{
    "summary": "Sourdough relies on wild yeast and lactic acid bacteria",
    "insights": ["Starters need daily feeding", "Hydration changes crumb"],
    "keywords": ["sourdough", "bread"]
}"#;

const SCRIPT_REPLY: &str = r#"```json
{
    "title": "Sourdough Basics",
    "hook": "Bread with three ingredients and a lot of patience.",
    "sections": [
        {"heading": "The starter", "narration": "Feed it every day."},
        {"heading": "Hydration", "narration": "More water, more holes."}
    ],
    "call_to_action": "Subscribe for part two."
}
```"#;

const STORYBOARD_REPLY: &str = r#"{"scenes": [
    {"visual": "Jar of bubbling starter", "narration": "Feed it every day.", "duration_secs": 6},
    {"visual": "Dough stretched on a counter", "narration": "More water, more holes.", "duration_secs": 9},
    {"visual": "Finished loaf", "narration": "Subscribe for part two.", "duration_secs": 4}
]}"#;

struct LlmPipeline {
    t: TestEngine,
    llm: MockLlmService,
    renderer: MockRenderService,
    publisher: MockPublishService,
    behavior: Arc<MockMediaBehavior>,
}

fn llm_pipeline(config: EngineConfig) -> LlmPipeline {
    let llm = MockLlmService::new();
    let behavior = Arc::new(MockMediaBehavior::new());
    let renderer = MockRenderService::with_behavior(behavior.clone());
    let publisher = MockPublishService::with_behavior(behavior.clone());

    let registry = GeneratorFactory::from_services(
        Arc::new(llm.clone()),
        MediaServices {
            renderer: Arc::new(renderer.clone()),
            publisher: Arc::new(publisher.clone()),
        },
        Visibility::Unlisted,
    )
    .unwrap();

    LlmPipeline {
        t: TestEngine::with_registry(registry, ScriptedGenerator::new(), config),
        llm,
        renderer,
        publisher,
        behavior,
    }
}

fn decode<T: serde::de::DeserializeOwned>(snapshot: &tubeflow_productions::ProjectSnapshot, kind: StageKind) -> T {
    let artifact = snapshot.stage(kind).unwrap().artifact().unwrap().clone();
    serde_json::from_value(artifact).unwrap()
}

// GN-I01: Full pipeline with LLM text stages and media backends
#[test_log::test(tokio::test)]
async fn test_llm_pipeline_end_to_end() {
    let p = llm_pipeline(EngineConfig::default());
    p.llm.push_reply(RESEARCH_REPLY);
    p.llm.push_reply(SCRIPT_REPLY);
    p.llm.push_reply(STORYBOARD_REPLY);

    let project = p.t.engine.create_project("Sourdough Basics").await.unwrap();
    for _ in StageKind::ALL {
        p.t.engine.advance(project.id()).await.unwrap();
    }

    let snapshot = p.t.engine.get_status(project.id()).await.unwrap();
    assert!(snapshot.is_complete());
    assert_snapshot_invariants(&snapshot);

    let research: ResearchArtifact = decode(&snapshot, StageKind::Research);
    assert_eq!(research.keywords, vec!["sourdough", "bread"]);
    let script: ScriptArtifact = decode(&snapshot, StageKind::Script);
    assert_eq!(script.sections.len(), 2);
    let storyboard: StoryboardArtifact = decode(&snapshot, StageKind::Storyboard);
    assert_eq!(storyboard.scenes.len(), 3);
    let render: RenderArtifact = decode(&snapshot, StageKind::Render);
    assert_eq!(render.duration_secs, 24.0);
    let upload: UploadArtifact = decode(&snapshot, StageKind::Upload);
    assert_eq!(upload.visibility, Visibility::Unlisted);

    // Script prompt is built from the research artifact
    let requests = p.llm.recorded_requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].messages[0]
        .content
        .contains("Starters need daily feeding"));

    let publish = &p.publisher.recorded_requests()[0];
    assert_eq!(publish.title, "Sourdough Basics");
    assert_eq!(publish.tags, vec!["sourdough", "bread"]);
    assert_eq!(publish.video_url, render.video_url);
    assert_eq!(p.renderer.recorded_requests().len(), 1);
}

// GN-I02: Free-text reply fails the stage, a valid reply on retry succeeds
#[test_log::test(tokio::test)]
async fn test_unstructured_reply_fails_stage() {
    let p = llm_pipeline(EngineConfig::default());
    p.llm
        .push_reply("Sure! Some ideas: starters, hydration, scoring");
    p.llm.push_reply(RESEARCH_REPLY);

    let project = p.t.engine.create_project("Sourdough Basics").await.unwrap();
    let err = p.t.engine.advance(project.id()).await.unwrap_err();
    match &err {
        Error::Generator { stage, message } => {
            assert_eq!(stage, "research");
            assert!(message.starts_with("invalid research output"));
        }
        other => panic!("expected generator error, got {:?}", other),
    }

    let snapshot = p.t.engine.get_status(project.id()).await.unwrap();
    assert_eq!(
        snapshot.stage(StageKind::Research).unwrap().status,
        StageStatus::Failed
    );
    assert_snapshot_invariants(&snapshot);

    let record = p.t.engine.retry(project.id()).await.unwrap();
    assert_eq!(record.status, StageStatus::Completed);
}

// GN-I03: Provider rate limit is relayed verbatim
#[test_log::test(tokio::test)]
async fn test_rate_limit_is_recorded() {
    let p = llm_pipeline(EngineConfig::default());
    p.llm.push_error(LlmError::RateLimit);

    let project = p.t.engine.create_project("Demo2").await.unwrap();
    p.t.engine.advance(project.id()).await.unwrap_err();

    let snapshot = p.t.engine.get_status(project.id()).await.unwrap();
    assert_eq!(
        snapshot.stage(StageKind::Research).unwrap().error.as_deref(),
        Some("rate limited")
    );
}

// GN-I04: A hung render backend times out and can be retried
#[test_log::test(tokio::test(start_paused = true))]
async fn test_hung_render_times_out() {
    let p = llm_pipeline(EngineConfig {
        stage_timeout: Some(Duration::from_secs(120)),
        max_attempts: Some(3),
    });
    p.llm.push_reply(RESEARCH_REPLY);
    p.llm.push_reply(SCRIPT_REPLY);
    p.llm.push_reply(STORYBOARD_REPLY);

    let project = p.t.engine.create_project("Sourdough Basics").await.unwrap();
    for _ in 0..3 {
        p.t.engine.advance(project.id()).await.unwrap();
    }

    p.behavior.set_outcome(MockOutcome::Hang);
    let err = p.t.engine.advance(project.id()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { ref stage, seconds: 120 } if stage == "render"));

    p.behavior.reset();
    let record = p.t.engine.retry(project.id()).await.unwrap();
    assert_eq!(record.stage, StageKind::Render);
    assert_eq!(record.status, StageStatus::Completed);
    assert_eq!(record.attempts, 2);
}

// GN-I05: Mock factory runs the whole pipeline without network access
#[test_log::test(tokio::test)]
async fn test_mock_factory_pipeline() {
    let t = TestEngine::with_registry(
        GeneratorFactory::mock(),
        ScriptedGenerator::new(),
        EngineConfig::default(),
    );
    let project = t.engine.create_project("Sourdough Basics").await.unwrap();
    for _ in StageKind::ALL {
        t.engine.advance(project.id()).await.unwrap();
    }
    let snapshot = t.engine.get_status(project.id()).await.unwrap();
    assert!(snapshot.is_complete());
    assert_snapshot_invariants(&snapshot);
}
