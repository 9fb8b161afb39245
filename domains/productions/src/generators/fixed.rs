//! Deterministic generators for local runs
//!
//! Each stage builds its artifact from the project name and the artifacts
//! of earlier stages, with no network access.

use async_trait::async_trait;

use tubeflow_media::Visibility;

use super::artifacts::{
    ArtifactSchema, RenderArtifact, ResearchArtifact, Scene, ScriptArtifact, ScriptSection,
    StoryboardArtifact, UploadArtifact,
};
use super::{ArtifactGenerator, GeneratorError, StageContext};
use crate::domain::entities::{Artifact, StageKind};

const SCENE_SECS: f64 = 8.0;

/// Static artifact generator for one stage
#[derive(Debug, Clone, Copy)]
pub struct StaticGenerator {
    stage: StageKind,
}

impl StaticGenerator {
    pub fn new(stage: StageKind) -> Self {
        Self { stage }
    }

    fn research(ctx: &StageContext) -> ResearchArtifact {
        let name = &ctx.project().name;
        let mut keywords = vec![name.to_lowercase()];
        let words: Vec<String> = name.split_whitespace().map(str::to_lowercase).collect();
        if words.len() > 1 {
            keywords.extend(words);
        }
        ResearchArtifact {
            summary: format!("Background research for \"{}\"", name),
            insights: vec![
                format!("What {} is", name),
                format!("Why {} matters", name),
                format!("Getting started with {}", name),
            ],
            keywords,
        }
    }

    fn script(ctx: &StageContext) -> Result<ScriptArtifact, GeneratorError> {
        let research: ResearchArtifact = ctx.decode(StageKind::Research)?;
        Ok(ScriptArtifact {
            title: ctx.project().name.clone(),
            hook: format!("{} in under a minute.", ctx.project().name),
            sections: research
                .insights
                .into_iter()
                .map(|insight| ScriptSection {
                    narration: format!("{}.", insight),
                    heading: insight,
                })
                .collect(),
            call_to_action: "Subscribe for more.".to_string(),
        })
    }

    fn storyboard(ctx: &StageContext) -> Result<StoryboardArtifact, GeneratorError> {
        let script: ScriptArtifact = ctx.decode(StageKind::Script)?;
        Ok(StoryboardArtifact {
            scenes: script
                .sections
                .into_iter()
                .map(|section| Scene {
                    visual: format!("Title card: {}", section.heading),
                    narration: section.narration,
                    duration_secs: SCENE_SECS,
                })
                .collect(),
        })
    }

    fn render(ctx: &StageContext) -> Result<RenderArtifact, GeneratorError> {
        let storyboard: StoryboardArtifact = ctx.decode(StageKind::Storyboard)?;
        Ok(RenderArtifact {
            video_url: format!("https://media.tubeflow.local/renders/{}.mp4", ctx.project().id),
            duration_secs: storyboard.scenes.iter().map(|scene| scene.duration_secs).sum(),
        })
    }

    fn upload(ctx: &StageContext) -> Result<UploadArtifact, GeneratorError> {
        let _: RenderArtifact = ctx.decode(StageKind::Render)?;
        let video_id: String = ctx.project().id.simple().to_string().chars().take(11).collect();
        Ok(UploadArtifact {
            url: format!("https://www.youtube.com/watch?v={}", video_id),
            video_id,
            visibility: Visibility::Private,
        })
    }
}

#[async_trait]
impl ArtifactGenerator for StaticGenerator {
    async fn generate(&self, ctx: &StageContext) -> Result<Artifact, GeneratorError> {
        match self.stage {
            StageKind::Research => Self::research(ctx).into_artifact(),
            StageKind::Script => Self::script(ctx)?.into_artifact(),
            StageKind::Storyboard => Self::storyboard(ctx)?.into_artifact(),
            StageKind::Render => Self::render(ctx)?.into_artifact(),
            StageKind::Upload => Self::upload(ctx)?.into_artifact(),
        }
    }

    fn provider(&self) -> &str {
        "static"
    }
}
