//! Artifact generators
//!
//! One `ArtifactGenerator` produces the artifact of one pipeline stage. The
//! engine hands each generator a `StageContext` holding the project and the
//! artifacts of strictly earlier completed stages; later stages are never
//! visible.

pub mod artifacts;
pub mod fixed;
pub mod llm;
pub mod media;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use tubeflow_common::{Error, Result};
use tubeflow_llm::{LlmConfig, LlmError, LlmService, LlmServiceFactory};
use tubeflow_media::{MediaConfig, MediaError, MediaServiceFactory};

use crate::domain::entities::{Artifact, Project, ProjectSnapshot, StageKind};

pub use artifacts::{
    ArtifactSchema, PromptedArtifact, RenderArtifact, ResearchArtifact, Scene, ScriptArtifact, ScriptSection,
    StoryboardArtifact, UploadArtifact,
};
pub use fixed::StaticGenerator;
pub use llm::LlmGenerator;
pub use media::{RenderGenerator, UploadGenerator};

/// Failure of a single generator invocation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeneratorError {
    /// Upstream provider failure, message relayed verbatim
    #[error("{0}")]
    Provider(String),

    #[error("invalid {stage} output: {message}")]
    InvalidOutput { stage: StageKind, message: String },

    #[error("missing {0} artifact")]
    MissingInput(StageKind),
}

impl From<LlmError> for GeneratorError {
    fn from(err: LlmError) -> Self {
        GeneratorError::Provider(err.to_string())
    }
}

impl From<MediaError> for GeneratorError {
    fn from(err: MediaError) -> Self {
        GeneratorError::Provider(err.to_string())
    }
}

/// Read-only input of a generator invocation
#[derive(Debug, Clone)]
pub struct StageContext {
    project: Project,
    stage: StageKind,
    prior: BTreeMap<StageKind, Artifact>,
}

impl StageContext {
    /// Build the context for `stage` from a project snapshot
    pub fn for_stage(snapshot: &ProjectSnapshot, stage: StageKind) -> Self {
        Self {
            project: snapshot.project.clone(),
            stage,
            prior: snapshot.prior_artifacts(stage),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Artifacts of completed stages before this one, in pipeline order
    pub fn prior(&self) -> &BTreeMap<StageKind, Artifact> {
        &self.prior
    }

    /// Artifact of an earlier stage
    pub fn artifact(&self, kind: StageKind) -> std::result::Result<&Artifact, GeneratorError> {
        self.prior
            .get(&kind)
            .ok_or(GeneratorError::MissingInput(kind))
    }

    /// Decode an earlier stage's artifact into its typed form
    pub fn decode<T: DeserializeOwned>(
        &self,
        kind: StageKind,
    ) -> std::result::Result<T, GeneratorError> {
        let artifact = self.artifact(kind)?;
        serde_json::from_value(artifact.clone()).map_err(|e| GeneratorError::InvalidOutput {
            stage: kind,
            message: e.to_string(),
        })
    }
}

/// Produces the artifact of one pipeline stage
///
/// Implementations must fail rather than return a partial artifact and must
/// be safe to invoke again for the same stage.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(&self, ctx: &StageContext) -> std::result::Result<Artifact, GeneratorError>;

    /// Provider name for logs
    fn provider(&self) -> &str;
}

/// One generator per stage kind
#[derive(Clone)]
pub struct GeneratorRegistry {
    generators: BTreeMap<StageKind, Arc<dyn ArtifactGenerator>>,
}

impl GeneratorRegistry {
    pub fn builder() -> GeneratorRegistryBuilder {
        GeneratorRegistryBuilder::default()
    }

    /// Use the same generator for every stage
    pub fn uniform(generator: Arc<dyn ArtifactGenerator>) -> Self {
        Self {
            generators: StageKind::ALL
                .into_iter()
                .map(|kind| (kind, generator.clone()))
                .collect(),
        }
    }

    pub fn get(&self, kind: StageKind) -> Option<Arc<dyn ArtifactGenerator>> {
        self.generators.get(&kind).cloned()
    }

    /// Replace the generator of one stage
    pub fn with(mut self, kind: StageKind, generator: Arc<dyn ArtifactGenerator>) -> Self {
        self.generators.insert(kind, generator);
        self
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (kind, generator) in &self.generators {
            map.entry(&kind.as_str(), &generator.provider());
        }
        map.finish()
    }
}

#[derive(Default)]
pub struct GeneratorRegistryBuilder {
    generators: BTreeMap<StageKind, Arc<dyn ArtifactGenerator>>,
}

impl GeneratorRegistryBuilder {
    pub fn stage(mut self, kind: StageKind, generator: Arc<dyn ArtifactGenerator>) -> Self {
        self.generators.insert(kind, generator);
        self
    }

    /// Fails when any stage has no generator
    pub fn build(self) -> Result<GeneratorRegistry> {
        let missing: Vec<&str> = StageKind::ALL
            .iter()
            .filter(|kind| !self.generators.contains_key(kind))
            .map(|kind| kind.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "No generator registered for stage(s): {}",
                missing.join(", ")
            )));
        }
        Ok(GeneratorRegistry {
            generators: self.generators,
        })
    }
}

/// Factory for building the generator registry from configuration
pub struct GeneratorFactory;

impl GeneratorFactory {
    pub fn create(
        provider: &str,
        llm_config: LlmConfig,
        media_config: &MediaConfig,
    ) -> Result<GeneratorRegistry> {
        match provider {
            "llm" => {
                tracing::info!(llm = %llm_config.provider, media = %media_config.provider, "Creating LLM-backed generators");
                let llm: Arc<dyn LlmService> = LlmServiceFactory::create(llm_config)
                    .map_err(|e| Error::Configuration(e.to_string()))?
                    .into();
                let media = MediaServiceFactory::create(media_config)
                    .map_err(|e| Error::Configuration(e.to_string()))?;
                Self::from_services(llm, media, media_config.default_visibility)
            }
            "mock" => {
                tracing::info!("Creating static generators");
                Ok(Self::mock())
            }
            provider => Err(Error::Configuration(format!(
                "Unknown generator provider: {}. Supported providers: llm, mock",
                provider
            ))),
        }
    }

    /// LLM generators for text stages, media generators for render and upload
    pub fn from_services(
        llm: Arc<dyn LlmService>,
        media: tubeflow_media::MediaServices,
        visibility: tubeflow_media::Visibility,
    ) -> Result<GeneratorRegistry> {
        GeneratorRegistry::builder()
            .stage(
                StageKind::Research,
                Arc::new(LlmGenerator::<ResearchArtifact>::new(llm.clone())),
            )
            .stage(
                StageKind::Script,
                Arc::new(LlmGenerator::<ScriptArtifact>::new(llm.clone())),
            )
            .stage(
                StageKind::Storyboard,
                Arc::new(LlmGenerator::<StoryboardArtifact>::new(llm)),
            )
            .stage(StageKind::Render, Arc::new(RenderGenerator::new(media.renderer)))
            .stage(
                StageKind::Upload,
                Arc::new(UploadGenerator::new(media.publisher, visibility)),
            )
            .build()
    }

    /// Deterministic generators for every stage
    pub fn mock() -> GeneratorRegistry {
        GeneratorRegistry {
            generators: StageKind::ALL
                .into_iter()
                .map(|kind| {
                    let generator: Arc<dyn ArtifactGenerator> = Arc::new(StaticGenerator::new(kind));
                    (kind, generator)
                })
                .collect(),
        }
    }
}
