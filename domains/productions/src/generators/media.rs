//! Media-backed generators for the render and upload stages

use std::sync::Arc;

use async_trait::async_trait;

use tubeflow_media::{PublishRequest, PublishService, RenderRequest, RenderService, Visibility};

use super::artifacts::{
    ArtifactSchema, RenderArtifact, ResearchArtifact, ScriptArtifact, StoryboardArtifact,
    UploadArtifact,
};
use super::{ArtifactGenerator, GeneratorError, StageContext};
use crate::domain::entities::{Artifact, StageKind};

/// Submits the storyboard to a `RenderService`
pub struct RenderGenerator {
    renderer: Arc<dyn RenderService>,
}

impl RenderGenerator {
    pub fn new(renderer: Arc<dyn RenderService>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl ArtifactGenerator for RenderGenerator {
    async fn generate(&self, ctx: &StageContext) -> Result<Artifact, GeneratorError> {
        let script: ScriptArtifact = ctx.decode(StageKind::Script)?;
        // Typed decode rejects a malformed storyboard before it reaches the renderer
        let _: StoryboardArtifact = ctx.decode(StageKind::Storyboard)?;
        let storyboard = ctx.artifact(StageKind::Storyboard)?.clone();

        let output = self
            .renderer
            .render(RenderRequest {
                project_id: ctx.project().id,
                title: script.title,
                storyboard,
            })
            .await?;

        tracing::info!(
            project_id = %ctx.project().id,
            video_url = %output.video_url,
            duration_secs = output.duration_secs,
            "Render finished"
        );

        RenderArtifact {
            video_url: output.video_url,
            duration_secs: output.duration_secs,
        }
        .into_artifact()
    }

    fn provider(&self) -> &str {
        "media"
    }
}

/// Publishes the rendered video with script metadata
pub struct UploadGenerator {
    publisher: Arc<dyn PublishService>,
    visibility: Visibility,
}

impl UploadGenerator {
    pub fn new(publisher: Arc<dyn PublishService>, visibility: Visibility) -> Self {
        Self {
            publisher,
            visibility,
        }
    }
}

#[async_trait]
impl ArtifactGenerator for UploadGenerator {
    async fn generate(&self, ctx: &StageContext) -> Result<Artifact, GeneratorError> {
        let research: ResearchArtifact = ctx.decode(StageKind::Research)?;
        let script: ScriptArtifact = ctx.decode(StageKind::Script)?;
        let render: RenderArtifact = ctx.decode(StageKind::Render)?;

        let receipt = self
            .publisher
            .publish(PublishRequest {
                project_id: ctx.project().id,
                video_url: render.video_url,
                title: script.title,
                description: format!("{}\n\n{}", script.hook, script.call_to_action),
                tags: research.keywords,
                visibility: self.visibility,
            })
            .await?;

        tracing::info!(
            project_id = %ctx.project().id,
            video_id = %receipt.video_id,
            "Video published"
        );

        UploadArtifact {
            video_id: receipt.video_id,
            url: receipt.url,
            visibility: receipt.visibility,
        }
        .into_artifact()
    }

    fn provider(&self) -> &str {
        "media"
    }
}
