//! Tubeflow LLM Service
//!
//! Text completion backends used by the research, script and storyboard
//! stages:
//! - Anthropic Messages API for production
//! - Scripted mock for tests and local runs

pub mod anthropic;
pub mod mock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM configuration error: {0}")]
    Configuration(String),

    #[error("LLM request error: {0}")]
    Request(String),

    #[error("LLM response error: {0}")]
    Response(String),

    #[error("rate limited")]
    RateLimit,

    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),
}

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }
}

/// Completion request; an empty `model` selects the provider default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub stop_reason: String,
}

/// LLM service configuration
#[derive(Clone)]
pub struct LlmConfig {
    /// LLM provider (anthropic, mock)
    pub provider: String,
    pub api_key: String,
    pub default_model: String,
    pub max_tokens: u32,
    /// Override for the provider API base URL
    pub base_url: Option<String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            api_key: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
        }
    }
}

impl LlmConfig {
    /// Create LLM config from environment variables
    pub fn from_env() -> Result<Self, LlmError> {
        let provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();

        if provider == "anthropic" && api_key.is_empty() {
            return Err(LlmError::Configuration(
                "ANTHROPIC_API_KEY is required for anthropic provider".to_string(),
            ));
        }

        let max_tokens = match std::env::var("LLM_MAX_TOKENS") {
            Ok(raw) => raw.parse().map_err(|_| {
                LlmError::Configuration("LLM_MAX_TOKENS must be a whole number".to_string())
            })?,
            Err(_) => DEFAULT_MAX_TOKENS,
        };

        Ok(Self {
            provider,
            api_key,
            default_model: std::env::var("LLM_DEFAULT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens,
            base_url: std::env::var("LLM_BASE_URL").ok(),
        })
    }
}

/// LLM service trait for different providers
#[async_trait::async_trait]
pub trait LlmService: Send + Sync {
    /// Run a single completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model used when a request leaves `model` empty
    fn default_model(&self) -> &str;
}

/// Factory for creating LlmService implementations
pub struct LlmServiceFactory;

impl LlmServiceFactory {
    pub fn create(config: LlmConfig) -> Result<Box<dyn LlmService>, LlmError> {
        match config.provider.as_str() {
            "anthropic" => {
                tracing::info!(model = %config.default_model, "Creating Anthropic LLM service");
                if config.api_key.is_empty() {
                    return Err(LlmError::Configuration(
                        "ANTHROPIC_API_KEY is required for anthropic provider".to_string(),
                    ));
                }
                Ok(Box::new(anthropic::AnthropicService::new(config)))
            }
            "mock" => {
                tracing::info!("Creating mock LLM service");
                Ok(Box::new(mock::MockLlmService::new()))
            }
            provider => Err(LlmError::Configuration(format!(
                "Unknown LLM provider: {}. Supported providers: anthropic, mock",
                provider
            ))),
        }
    }
}
