//! Typed stage artifacts
//!
//! Artifacts are stored as opaque JSON; these types are the shapes the
//! bundled generators produce and read back from earlier stages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tubeflow_media::Visibility;

use super::{GeneratorError, StageContext};
use crate::domain::entities::{Artifact, StageKind};

/// A typed artifact with its own consistency check
pub trait ArtifactSchema: Serialize + DeserializeOwned + Send + Sync + 'static {
    const STAGE: StageKind;

    /// Reject structurally valid but unusable values
    fn check(&self) -> Result<(), String>;

    /// Validate and convert into the stored JSON form
    fn into_artifact(self) -> Result<Artifact, GeneratorError> {
        self.check().map_err(|message| GeneratorError::InvalidOutput {
            stage: Self::STAGE,
            message,
        })?;
        serde_json::to_value(&self).map_err(|e| GeneratorError::InvalidOutput {
            stage: Self::STAGE,
            message: e.to_string(),
        })
    }
}

/// Text stages also describe their JSON shape and build a prompt from prior artifacts
pub trait PromptedArtifact: ArtifactSchema {
    /// JSON shape the model must answer with
    const SHAPE: &'static str;

    fn prompt(ctx: &StageContext) -> Result<String, GeneratorError>;
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(())
}

fn require_items<T>(field: &str, items: &[T]) -> Result<(), String> {
    if items.is_empty() {
        return Err(format!("{} must contain at least one entry", field));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchArtifact {
    pub summary: String,
    pub insights: Vec<String>,
    pub keywords: Vec<String>,
}

impl ArtifactSchema for ResearchArtifact {
    const STAGE: StageKind = StageKind::Research;

    fn check(&self) -> Result<(), String> {
        require_text("summary", &self.summary)?;
        require_items("insights", &self.insights)?;
        require_items("keywords", &self.keywords)
    }
}

impl PromptedArtifact for ResearchArtifact {
    const SHAPE: &'static str =
        r#"{"summary": string, "insights": [string, ...], "keywords": [string, ...]}"#;

    fn prompt(ctx: &StageContext) -> Result<String, GeneratorError> {
        Ok(format!(
            "Research the topic of a YouTube video titled \"{}\". \
             Summarize what viewers need to know, list the key insights the video \
             should cover and the search keywords it should rank for.",
            ctx.project().name
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSection {
    pub heading: String,
    pub narration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptArtifact {
    pub title: String,
    pub hook: String,
    pub sections: Vec<ScriptSection>,
    pub call_to_action: String,
}

impl ArtifactSchema for ScriptArtifact {
    const STAGE: StageKind = StageKind::Script;

    fn check(&self) -> Result<(), String> {
        require_text("title", &self.title)?;
        require_text("hook", &self.hook)?;
        require_items("sections", &self.sections)?;
        for (i, section) in self.sections.iter().enumerate() {
            require_text(&format!("sections[{}].narration", i), &section.narration)?;
        }
        Ok(())
    }
}

impl PromptedArtifact for ScriptArtifact {
    const SHAPE: &'static str = r#"{"title": string, "hook": string, "sections": [{"heading": string, "narration": string}, ...], "call_to_action": string}"#;

    fn prompt(ctx: &StageContext) -> Result<String, GeneratorError> {
        let research: ResearchArtifact = ctx.decode(StageKind::Research)?;
        Ok(format!(
            "Write the narration script for a YouTube video titled \"{}\".\n\
             Research summary: {}\n\
             Insights to cover:\n- {}\n\
             Open with a hook, give each insight its own section and close with a call to action.",
            ctx.project().name,
            research.summary,
            research.insights.join("\n- ")
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub visual: String,
    pub narration: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardArtifact {
    pub scenes: Vec<Scene>,
}

impl ArtifactSchema for StoryboardArtifact {
    const STAGE: StageKind = StageKind::Storyboard;

    fn check(&self) -> Result<(), String> {
        require_items("scenes", &self.scenes)?;
        for (i, scene) in self.scenes.iter().enumerate() {
            require_text(&format!("scenes[{}].visual", i), &scene.visual)?;
            if !scene.duration_secs.is_finite() || scene.duration_secs <= 0.0 {
                return Err(format!("scenes[{}].duration_secs must be positive", i));
            }
        }
        Ok(())
    }
}

impl PromptedArtifact for StoryboardArtifact {
    const SHAPE: &'static str = r#"{"scenes": [{"visual": string, "narration": string, "duration_secs": number}, ...]}"#;

    fn prompt(ctx: &StageContext) -> Result<String, GeneratorError> {
        let script: ScriptArtifact = ctx.decode(StageKind::Script)?;
        let sections = script
            .sections
            .iter()
            .map(|section| format!("## {}\n{}", section.heading, section.narration))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(format!(
            "Break the following script for \"{}\" into storyboard scenes. \
             Describe the visual of each scene, the narration it carries and its length in seconds.\n\n\
             Hook: {}\n\n{}\n\nCall to action: {}",
            script.title, script.hook, sections, script.call_to_action
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderArtifact {
    pub video_url: String,
    pub duration_secs: f64,
}

impl ArtifactSchema for RenderArtifact {
    const STAGE: StageKind = StageKind::Render;

    fn check(&self) -> Result<(), String> {
        require_text("video_url", &self.video_url)?;
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err("duration_secs must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadArtifact {
    pub video_id: String,
    pub url: String,
    pub visibility: Visibility,
}

impl ArtifactSchema for UploadArtifact {
    const STAGE: StageKind = StageKind::Upload;

    fn check(&self) -> Result<(), String> {
        require_text("video_id", &self.video_id)?;
        require_text("url", &self.url)
    }
}
