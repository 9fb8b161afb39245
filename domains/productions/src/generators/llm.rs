//! LLM-backed generators for the text stages
//!
//! The model is asked for a single JSON document. Replies are decoded
//! strictly into the stage's artifact type; anything else fails the stage.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use tubeflow_llm::{CompletionRequest, LlmMessage, LlmService};

use super::artifacts::PromptedArtifact;
use super::{ArtifactGenerator, GeneratorError, StageContext};
use crate::domain::entities::Artifact;

const SYSTEM_PROMPT: &str = "You are a production assistant for a YouTube channel. \
Answer with exactly one JSON document and nothing else.";

/// Generator that asks an `LlmService` for artifact `A`
pub struct LlmGenerator<A> {
    llm: Arc<dyn LlmService>,
    max_tokens: Option<u32>,
    _artifact: PhantomData<fn() -> A>,
}

impl<A: PromptedArtifact> LlmGenerator<A> {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self {
            llm,
            max_tokens: None,
            _artifact: PhantomData,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn request(&self, ctx: &StageContext) -> Result<CompletionRequest, GeneratorError> {
        let prompt = A::prompt(ctx)?;
        Ok(CompletionRequest {
            model: String::new(),
            system_prompt: Some(format!(
                "{}\nThe JSON document must have this shape: {}",
                SYSTEM_PROMPT,
                A::SHAPE
            )),
            messages: vec![LlmMessage::user(prompt)],
            max_tokens: self.max_tokens,
        })
    }
}

/// Decode a model reply into `A`, accepting an optional fenced code block
pub fn decode_reply<A: PromptedArtifact>(reply: &str) -> Result<A, GeneratorError> {
    serde_json::from_str(strip_code_fence(reply)).map_err(|e| GeneratorError::InvalidOutput {
        stage: A::STAGE,
        message: format!("reply is not a valid {} document: {}", A::STAGE, e),
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json)
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[async_trait]
impl<A: PromptedArtifact> ArtifactGenerator for LlmGenerator<A> {
    async fn generate(&self, ctx: &StageContext) -> Result<Artifact, GeneratorError> {
        let request = self.request(ctx)?;

        tracing::debug!(
            project_id = %ctx.project().id,
            stage = %A::STAGE,
            "Requesting artifact from LLM"
        );

        let response = self.llm.complete(request).await?;

        tracing::debug!(
            project_id = %ctx.project().id,
            stage = %A::STAGE,
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "LLM reply received"
        );

        decode_reply::<A>(&response.content)?.into_artifact()
    }

    fn provider(&self) -> &str {
        "llm"
    }
}
