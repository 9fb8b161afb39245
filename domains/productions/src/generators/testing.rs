//! Programmable generators for tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

use super::{ArtifactGenerator, GeneratorError, StageContext};
use crate::domain::entities::{Artifact, StageKind};

/// Outcome of one scripted invocation
#[derive(Debug, Clone)]
pub enum Scripted {
    Artifact(Artifact),
    Fail(String),
    Panic(String),
    Hang,
}

/// Replays queued outcomes, then succeeds with a small default artifact
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<StageContext>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: Scripted) -> &Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
        self
    }

    pub fn push_artifact(&self, artifact: Artifact) -> &Self {
        self.push(Scripted::Artifact(artifact))
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(Scripted::Fail(message.into()))
    }

    /// Contexts of every invocation so far
    pub fn calls(&self) -> Vec<StageContext> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Stages invoked, in order
    pub fn stages_called(&self) -> Vec<StageKind> {
        self.calls().iter().map(StageContext::stage).collect()
    }

    /// Default artifact produced once the queue is drained
    pub fn default_artifact(ctx: &StageContext) -> Artifact {
        json!({
            "stage": ctx.stage().as_str(),
            "project": ctx.project().name,
        })
    }
}

#[async_trait]
impl ArtifactGenerator for ScriptedGenerator {
    async fn generate(&self, ctx: &StageContext) -> Result<Artifact, GeneratorError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ctx.clone());

        let next = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            None => Ok(Self::default_artifact(ctx)),
            Some(Scripted::Artifact(artifact)) => Ok(artifact),
            Some(Scripted::Fail(message)) => Err(GeneratorError::Provider(message)),
            Some(Scripted::Panic(message)) => panic!("{}", message),
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                Ok(Self::default_artifact(ctx))
            }
        }
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

/// Blocks inside `generate` until released
#[derive(Debug, Clone)]
pub struct GatedGenerator {
    entered: Arc<Notify>,
    gate: Arc<Semaphore>,
}

impl Default for GatedGenerator {
    fn default() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }
}

impl GatedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until an invocation is parked at the gate
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one parked invocation finish
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl ArtifactGenerator for GatedGenerator {
    async fn generate(&self, ctx: &StageContext) -> Result<Artifact, GeneratorError> {
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| GeneratorError::Provider(e.to_string()))?;
        permit.forget();
        Ok(ScriptedGenerator::default_artifact(ctx))
    }

    fn provider(&self) -> &str {
        "gated"
    }
}
