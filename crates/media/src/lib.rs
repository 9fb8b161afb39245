//! Tubeflow Media Services
//!
//! Backends for the two media-processing stages of the pipeline:
//! - `RenderService` turns a storyboard into a video file
//! - `PublishService` uploads the rendered video to the channel
//!
//! Only the mock provider ships today; real backends plug in behind the
//! same traits and are selected by `MEDIA_PROVIDER`.

pub mod mock;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Media configuration error: {0}")]
    Configuration(String),

    #[error("Media request error: {0}")]
    Request(String),

    #[error("Media response error: {0}")]
    Response(String),
}

/// Request to render a storyboard into a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub project_id: Uuid,
    pub title: String,
    pub storyboard: serde_json::Value,
}

/// A rendered video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    pub video_url: String,
    pub duration_secs: f64,
}

/// Channel visibility of a published video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Unlisted,
    Public,
}

/// Request to publish a rendered video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub project_id: Uuid,
    pub video_url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
}

/// Confirmation returned by the channel after upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub video_id: String,
    pub url: String,
    pub visibility: Visibility,
}

/// Media service configuration
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Media provider (mock)
    pub provider: String,
    /// Visibility applied to newly published videos
    pub default_visibility: Visibility,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            default_visibility: Visibility::Private,
        }
    }
}

impl MediaConfig {
    /// Create media config from environment variables
    pub fn from_env() -> Result<Self, MediaError> {
        let provider = std::env::var("MEDIA_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let default_visibility = match std::env::var("PUBLISH_VISIBILITY") {
            Ok(raw) => parse_visibility(&raw)?,
            Err(_) => Visibility::Private,
        };

        Ok(Self {
            provider,
            default_visibility,
        })
    }
}

fn parse_visibility(raw: &str) -> Result<Visibility, MediaError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "private" => Ok(Visibility::Private),
        "unlisted" => Ok(Visibility::Unlisted),
        "public" => Ok(Visibility::Public),
        other => Err(MediaError::Configuration(format!(
            "Unknown visibility: {}. Expected private, unlisted or public",
            other
        ))),
    }
}

/// Render backend trait
#[async_trait::async_trait]
pub trait RenderService: Send + Sync {
    /// Render the storyboard and wait for the finished video
    async fn render(&self, request: RenderRequest) -> Result<RenderOutput, MediaError>;
}

/// Publishing backend trait
#[async_trait::async_trait]
pub trait PublishService: Send + Sync {
    /// Upload a rendered video to the channel
    async fn publish(&self, request: PublishRequest) -> Result<PublishReceipt, MediaError>;
}

/// Render and publish backends built from one configuration
#[derive(Clone)]
pub struct MediaServices {
    pub renderer: Arc<dyn RenderService>,
    pub publisher: Arc<dyn PublishService>,
}

/// Factory for creating media service implementations
pub struct MediaServiceFactory;

impl MediaServiceFactory {
    pub fn create(config: &MediaConfig) -> Result<MediaServices, MediaError> {
        match config.provider.as_str() {
            "mock" => {
                tracing::info!("Creating mock media services");
                let behavior = Arc::new(mock::MockMediaBehavior::new());
                Ok(MediaServices {
                    renderer: Arc::new(mock::MockRenderService::with_behavior(behavior.clone())),
                    publisher: Arc::new(mock::MockPublishService::with_behavior(behavior)),
                })
            }
            provider => Err(MediaError::Configuration(format!(
                "Unknown media provider: {}. Supported providers: mock",
                provider
            ))),
        }
    }
}
