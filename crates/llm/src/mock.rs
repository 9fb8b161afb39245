//! Mock LLM Service Implementation
//!
//! Scripted mock used by `LlmServiceFactory` when provider is `"mock"`:
//! queued replies are returned in order, after which the service echoes the
//! last user message. Every request is recorded for test assertions.

use crate::{CompletionRequest, CompletionResponse, LlmError, LlmService};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock LLM service for testing
#[derive(Debug, Clone, Default)]
pub struct MockLlmService {
    replies: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn push_reply(&self, content: impl Into<String>) {
        self.lock_replies().push_back(Ok(content.into()));
    }

    /// Queue a failure
    pub fn push_error(&self, error: LlmError) {
        self.lock_replies().push_back(Err(error));
    }

    /// All requests seen so far
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        // A poisoned queue only means another test thread panicked mid-push.
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tracing::debug!(messages = request.messages.len(), "Mock LLM: completion request");

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let scripted = self.lock_replies().pop_front();

        let content = match scripted {
            Some(reply) => reply?,
            None => {
                let last_message = request
                    .messages
                    .last()
                    .map(|m| m.content.as_str())
                    .unwrap_or("empty");
                format!("Mock response to: {}", last_message)
            }
        };

        let model = if request.model.is_empty() {
            "mock-model".to_string()
        } else {
            request.model
        };
        let input_tokens = request
            .messages
            .iter()
            .map(|m| m.content.len() as i32 / 4)
            .sum::<i32>();
        let output_tokens = content.len() as i32 / 4;

        Ok(CompletionResponse {
            content,
            model,
            input_tokens,
            output_tokens,
            stop_reason: "end_turn".to_string(),
        })
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }
}
