//! Mock Media Service Implementation
//!
//! Programmable mocks for testing the render and upload stages:
//! - `MockMediaBehavior`: controls outcome, delay and failure message
//! - `MockRenderService` / `MockPublishService`: record requests and answer
//!   according to the shared behavior
//! - `MockOutcome`: Complete, Fail, or Hang

use crate::{
    MediaError, PublishReceipt, PublishRequest, PublishService, RenderOutput, RenderRequest,
    RenderService,
};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// What outcome the mock should produce
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MockOutcome {
    /// Return a successful result
    #[default]
    Complete,
    /// Return an error carrying the configured message
    Fail,
    /// Never return (simulates a stuck backend)
    Hang,
}

/// Programmable behavior shared by the mock media services
#[derive(Debug)]
pub struct MockMediaBehavior {
    outcome: RwLock<MockOutcome>,
    delay_ms: RwLock<u64>,
    error_message: RwLock<String>,
}

impl Default for MockMediaBehavior {
    fn default() -> Self {
        Self {
            outcome: RwLock::new(MockOutcome::Complete),
            delay_ms: RwLock::new(0),
            error_message: RwLock::new("mock media failure".to_string()),
        }
    }
}

impl MockMediaBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_outcome(&self, outcome: MockOutcome) {
        *self.outcome.write().unwrap_or_else(|e| e.into_inner()) = outcome;
    }

    pub fn set_delay_ms(&self, delay: u64) {
        *self.delay_ms.write().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn set_error_message(&self, message: impl Into<String>) {
        *self.error_message.write().unwrap_or_else(|e| e.into_inner()) = message.into();
    }

    /// Reset to default behavior
    pub fn reset(&self) {
        self.set_outcome(MockOutcome::Complete);
        self.set_delay_ms(0);
        self.set_error_message("mock media failure");
    }

    pub fn outcome(&self) -> MockOutcome {
        self.outcome.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn delay_ms(&self) -> u64 {
        *self.delay_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    fn error_message(&self) -> String {
        self.error_message
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply delay and outcome; `Ok(())` means the caller should succeed
    async fn play(&self) -> Result<(), MediaError> {
        let delay = self.delay_ms();
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match self.outcome() {
            MockOutcome::Complete => Ok(()),
            MockOutcome::Fail => Err(MediaError::Response(self.error_message())),
            MockOutcome::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// Mock render service with programmable behavior
#[derive(Debug, Clone)]
pub struct MockRenderService {
    behavior: Arc<MockMediaBehavior>,
    history: Arc<Mutex<Vec<RenderRequest>>>,
}

impl Default for MockRenderService {
    fn default() -> Self {
        Self::with_behavior(Arc::new(MockMediaBehavior::new()))
    }
}

impl MockRenderService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: Arc<MockMediaBehavior>) -> Self {
        Self {
            behavior,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn behavior(&self) -> &Arc<MockMediaBehavior> {
        &self.behavior
    }

    /// Get recorded render requests
    pub fn recorded_requests(&self) -> Vec<RenderRequest> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl RenderService for MockRenderService {
    async fn render(&self, request: RenderRequest) -> Result<RenderOutput, MediaError> {
        tracing::info!(project_id = %request.project_id, "Mock render: received render request");

        let scene_count = request
            .storyboard
            .get("scenes")
            .and_then(|scenes| scenes.as_array())
            .map_or(0, Vec::len);
        let project_id = request.project_id;

        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        self.behavior.play().await?;

        Ok(RenderOutput {
            video_url: format!("https://media.tubeflow.local/renders/{}.mp4", project_id),
            duration_secs: scene_count as f64 * 8.0,
        })
    }
}

/// Mock publish service with programmable behavior
#[derive(Debug, Clone)]
pub struct MockPublishService {
    behavior: Arc<MockMediaBehavior>,
    history: Arc<Mutex<Vec<PublishRequest>>>,
}

impl Default for MockPublishService {
    fn default() -> Self {
        Self::with_behavior(Arc::new(MockMediaBehavior::new()))
    }
}

impl MockPublishService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: Arc<MockMediaBehavior>) -> Self {
        Self {
            behavior,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn behavior(&self) -> &Arc<MockMediaBehavior> {
        &self.behavior
    }

    /// Get recorded publish requests
    pub fn recorded_requests(&self) -> Vec<PublishRequest> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl PublishService for MockPublishService {
    async fn publish(&self, request: PublishRequest) -> Result<PublishReceipt, MediaError> {
        tracing::info!(project_id = %request.project_id, title = %request.title, "Mock publish: received upload");

        let visibility = request.visibility;
        let video_id = request
            .project_id
            .simple()
            .to_string()
            .chars()
            .take(11)
            .collect::<String>();

        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        self.behavior.play().await?;

        Ok(PublishReceipt {
            url: format!("https://www.youtube.com/watch?v={}", video_id),
            video_id,
            visibility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Visibility;
    use uuid::Uuid;

    fn render_request(scenes: usize) -> RenderRequest {
        RenderRequest {
            project_id: Uuid::new_v4(),
            title: "Demo".to_string(),
            storyboard: serde_json::json!({
                "scenes": (0..scenes).map(|i| serde_json::json!({"index": i})).collect::<Vec<_>>()
            }),
        }
    }

    #[tokio::test]
    async fn test_mock_render_completes_and_records() {
        let service = MockRenderService::new();
        let output = service.render(render_request(3)).await.unwrap();

        assert!(output.video_url.ends_with(".mp4"));
        assert_eq!(output.duration_secs, 24.0);
        assert_eq!(service.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_render_fails_with_configured_message() {
        let service = MockRenderService::new();
        service.behavior().set_outcome(MockOutcome::Fail);
        service.behavior().set_error_message("gpu out of memory");

        let err = service.render(render_request(1)).await.unwrap_err();
        assert_eq!(err, MediaError::Response("gpu out of memory".to_string()));
        // Request is still recorded
        assert_eq!(service.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_hang_never_resolves() {
        let service = MockRenderService::new();
        service.behavior().set_outcome(MockOutcome::Hang);

        let result =
            tokio::time::timeout(Duration::from_millis(20), service.render(render_request(1)))
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_publish_echoes_visibility() {
        let service = MockPublishService::new();
        let receipt = service
            .publish(PublishRequest {
                project_id: Uuid::new_v4(),
                video_url: "https://media.tubeflow.local/renders/x.mp4".to_string(),
                title: "Demo".to_string(),
                description: "A demo".to_string(),
                tags: vec!["demo".to_string()],
                visibility: Visibility::Unlisted,
            })
            .await
            .unwrap();

        assert_eq!(receipt.visibility, Visibility::Unlisted);
        assert_eq!(receipt.video_id.len(), 11);
        assert!(receipt.url.ends_with(&receipt.video_id));
    }

    #[test]
    fn test_behavior_reset() {
        let behavior = MockMediaBehavior::new();
        behavior.set_outcome(MockOutcome::Fail);
        behavior.set_delay_ms(100);
        behavior.reset();
        assert_eq!(behavior.outcome(), MockOutcome::Complete);
        assert_eq!(behavior.delay_ms(), 0);
    }
}
