//! Workflow engine
//!
//! Drives a production project through its five stages. All workflow state
//! lives in the `ProjectStore`; the engine itself only keeps the table of
//! per-project locks that makes `advance`, `retry`, `delete_project` and
//! `recover_interrupted` exclusive per project.
//!
//! A stage run is: mark the stage `in_progress` and persist, run the stage's
//! generator on its own task under the timeout budget, then persist the
//! artifact or the failure. The generator call is the only suspension point
//! between the two writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use tokio::task::AbortHandle;
use uuid::Uuid;

use tubeflow_common::{Config, Error, Result};

use crate::domain::entities::{Artifact, ProjectSnapshot, StageKind, StageRecord, StageStatus};
use crate::domain::state::{StageEvent, StageStateMachine};
use crate::events::{EventLevel, EventSink};
use crate::generators::{ArtifactGenerator, GeneratorRegistry, StageContext};
use crate::repository::ProjectStore;

const EVENT_SOURCE: &str = "workflow";

/// Error recorded on a stage recovered after a crash
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Default generator budget, `None` disables the timeout
    pub stage_timeout: Option<Duration>,
    /// Generator invocations allowed per stage, `None` means unlimited
    pub max_attempts: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Some(Duration::from_secs(600)),
            max_attempts: Some(3),
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            stage_timeout: config.stage_timeout(),
            max_attempts: config.max_attempts(),
        }
    }
}

type LockTable = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

/// Per-project mutual exclusion without queueing
#[derive(Debug, Default, Clone)]
struct ProjectLocks {
    table: LockTable,
}

impl ProjectLocks {
    fn try_acquire(&self, id: Uuid) -> Result<ProjectGuard> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Internal("project lock table poisoned".to_string()))?;
        let lock = table.entry(id).or_default().clone();
        let guard = lock.try_lock_owned().map_err(|_| {
            Error::InvalidState(format!("operation already in progress for project {}", id))
        })?;
        Ok(ProjectGuard {
            id,
            guard: Some(guard),
            table: self.table.clone(),
        })
    }

    fn len(&self) -> usize {
        self.table.lock().map(|table| table.len()).unwrap_or_default()
    }
}

/// Held for the whole of an exclusive operation; drops its table entry when last out
struct ProjectGuard {
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        let unused = table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            table.remove(&self.id);
        }
    }
}

/// Aborts the generator task if the caller goes away mid-run
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Why a generator run did not produce an artifact
#[derive(Debug)]
enum StageFailure {
    Generator(String),
    TimedOut(Duration),
}

impl StageFailure {
    fn message(&self, kind: StageKind) -> String {
        match self {
            StageFailure::Generator(message) => message.clone(),
            StageFailure::TimedOut(budget) => {
                format!("stage {} timed out after {}s", kind, budget_secs(*budget))
            }
        }
    }

    fn into_error(self, kind: StageKind) -> Error {
        match self {
            StageFailure::Generator(message) => Error::Generator {
                stage: kind.to_string(),
                message,
            },
            StageFailure::TimedOut(budget) => Error::Timeout {
                stage: kind.to_string(),
                seconds: budget_secs(budget),
            },
        }
    }
}

/// Whole seconds of a budget, rounded up so sub-second budgets never report 0
fn budget_secs(budget: Duration) -> u64 {
    budget.as_secs() + u64::from(budget.subsec_nanos() > 0)
}

/// Which entry point asked for the stage run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Advance,
    Retry,
}

pub struct WorkflowEngine {
    store: Arc<dyn ProjectStore>,
    generators: GeneratorRegistry,
    events: Arc<dyn EventSink>,
    locks: ProjectLocks,
    config: EngineConfig,
}

impl std::fmt::Debug for WorkflowEngine {
    #[mutants::skip] // Diagnostic output only
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("generators", &self.generators)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        generators: GeneratorRegistry,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            generators,
            events,
            locks: ProjectLocks::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a project with all five stages `pending`
    pub async fn create_project(&self, name: &str) -> Result<ProjectSnapshot> {
        let snapshot = ProjectSnapshot::create(name)?;
        self.persist(&snapshot).await?;

        tracing::info!(project_id = %snapshot.id(), name = %snapshot.project.name, "Project created");
        self.emit(
            EventLevel::Info,
            format!("Project \"{}\" created", snapshot.project.name),
            json!({
                "event": "project.created",
                "project_id": snapshot.id(),
                "name": snapshot.project.name,
            }),
        );

        Ok(snapshot)
    }

    /// Read-only view of a project and its stages
    pub async fn get_status(&self, project_id: Uuid) -> Result<ProjectSnapshot> {
        self.load(project_id).await
    }

    /// Run the current stage under the default timeout budget
    pub async fn advance(&self, project_id: Uuid) -> Result<StageRecord> {
        self.advance_with_timeout(project_id, self.config.stage_timeout)
            .await
    }

    /// Run the current stage under an explicit budget (`None` waits indefinitely)
    pub async fn advance_with_timeout(
        &self,
        project_id: Uuid,
        timeout: Option<Duration>,
    ) -> Result<StageRecord> {
        let _guard = self.locks.try_acquire(project_id)?;
        let snapshot = self.load(project_id).await?;
        self.run_current_stage(snapshot, RunMode::Advance, timeout)
            .await
    }

    /// Reset a failed current stage and run it again under the default budget
    pub async fn retry(&self, project_id: Uuid) -> Result<StageRecord> {
        self.retry_with_timeout(project_id, self.config.stage_timeout)
            .await
    }

    pub async fn retry_with_timeout(
        &self,
        project_id: Uuid,
        timeout: Option<Duration>,
    ) -> Result<StageRecord> {
        let _guard = self.locks.try_acquire(project_id)?;
        let snapshot = self.load(project_id).await?;
        self.run_current_stage(snapshot, RunMode::Retry, timeout)
            .await
    }

    /// Delete a project together with its stage records
    pub async fn delete_project(&self, project_id: Uuid) -> Result<()> {
        let _guard = self.locks.try_acquire(project_id)?;
        if !self.store.delete(project_id).await? {
            return Err(not_found(project_id));
        }

        tracing::info!(project_id = %project_id, "Project deleted");
        self.emit(
            EventLevel::Info,
            format!("Project {} deleted", project_id),
            json!({ "event": "project.deleted", "project_id": project_id }),
        );
        Ok(())
    }

    /// Fail a stage left `in_progress` by a run that never finished
    ///
    /// Only valid while no operation holds the project; the stage becomes
    /// retryable with error `interrupted`.
    pub async fn recover_interrupted(&self, project_id: Uuid) -> Result<StageRecord> {
        let _guard = self.locks.try_acquire(project_id)?;
        let mut snapshot = self.load(project_id).await?;

        let kind = snapshot
            .stages
            .iter()
            .find(|record| record.status == StageStatus::InProgress)
            .map(|record| record.stage)
            .ok_or_else(|| {
                Error::InvalidState(format!("project {} has no stage in progress", project_id))
            })?;

        let record = stage_mut(&mut snapshot, kind)?;
        record.fail(INTERRUPTED_MESSAGE)?;
        let attempt = record.attempts;
        snapshot.sync_current_stage();
        self.persist(&snapshot).await?;

        tracing::warn!(project_id = %project_id, stage = %kind, attempt, "Interrupted stage marked failed");
        self.emit(
            EventLevel::Warn,
            format!("Stage {} recovered after interruption", kind),
            json!({
                "event": "stage.recovered",
                "project_id": project_id,
                "stage": kind,
                "attempt": attempt,
            }),
        );

        stage_record(&snapshot, kind)
    }

    /// Number of projects with a live lock entry
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    async fn run_current_stage(
        &self,
        mut snapshot: ProjectSnapshot,
        mode: RunMode,
        timeout: Option<Duration>,
    ) -> Result<StageRecord> {
        let project_id = snapshot.id();
        let record = snapshot.current().ok_or_else(|| {
            Error::InvalidState(format!("project {} is already complete", project_id))
        })?;
        let kind = record.stage;

        let state = record.status.to_state();
        if mode == RunMode::Retry && !StageStateMachine::can_transition(state, &StageEvent::Retry) {
            return Err(Error::InvalidState(format!(
                "stage {} is {}, only failed stages can be retried",
                kind, state
            )));
        }
        if !state.is_runnable() {
            return Err(Error::InvalidState(format!(
                "stage {} is {}, expected pending or failed",
                kind, state
            )));
        }

        if let Some(max) = self.config.max_attempts {
            if i64::from(record.attempts) >= i64::from(max) {
                return Err(Error::InvalidState(format!(
                    "stage {} exhausted {} attempts",
                    kind, max
                )));
            }
        }

        let generator = self.generators.get(kind).ok_or_else(|| {
            Error::Configuration(format!("No generator registered for stage {}", kind))
        })?;

        let record = stage_mut(&mut snapshot, kind)?;
        if record.status == StageStatus::Failed {
            let previous_error = record.error.clone();
            record.reset()?;
            tracing::info!(project_id = %project_id, stage = %kind, "Retrying failed stage");
            self.emit(
                EventLevel::Info,
                format!("Stage {} reset for retry", kind),
                json!({
                    "event": "stage.retried",
                    "project_id": project_id,
                    "stage": kind,
                    "previous_error": previous_error,
                }),
            );
        }

        let record = stage_mut(&mut snapshot, kind)?;
        record.start()?;
        let attempt = record.attempts;
        snapshot.sync_current_stage();
        self.persist(&snapshot).await?;

        tracing::info!(project_id = %project_id, stage = %kind, attempt, provider = generator.provider(), "Stage started");
        self.emit(
            EventLevel::Info,
            format!("Stage {} started", kind),
            json!({
                "event": "stage.started",
                "project_id": project_id,
                "stage": kind,
                "attempt": attempt,
            }),
        );

        let ctx = StageContext::for_stage(&snapshot, kind);
        let outcome = run_generator(generator, ctx, timeout).await;

        match outcome {
            Ok(artifact) => {
                stage_mut(&mut snapshot, kind)?.complete(artifact)?;
                snapshot.sync_current_stage();
                self.persist_outcome(&snapshot, kind, attempt, "completed")
                    .await?;

                tracing::info!(project_id = %project_id, stage = %kind, attempt, "Stage completed");
                self.emit(
                    EventLevel::Info,
                    format!("Stage {} completed", kind),
                    json!({
                        "event": "stage.completed",
                        "project_id": project_id,
                        "stage": kind,
                        "attempt": attempt,
                        "next_stage": kind.next(),
                    }),
                );

                if snapshot.is_complete() {
                    tracing::info!(project_id = %project_id, "Project completed");
                    self.emit(
                        EventLevel::Info,
                        format!("Project \"{}\" completed", snapshot.project.name),
                        json!({ "event": "project.completed", "project_id": project_id }),
                    );
                }

                stage_record(&snapshot, kind)
            }
            Err(failure) => {
                let message = failure.message(kind);
                stage_mut(&mut snapshot, kind)?.fail(message.clone())?;
                snapshot.sync_current_stage();
                self.persist_outcome(&snapshot, kind, attempt, &message)
                    .await?;

                let event = match failure {
                    StageFailure::TimedOut(_) => "stage.timed_out",
                    StageFailure::Generator(_) => "stage.failed",
                };
                tracing::warn!(project_id = %project_id, stage = %kind, attempt, error = %message, "Stage failed");
                self.emit(
                    EventLevel::Error,
                    format!("Stage {} failed: {}", kind, message),
                    json!({
                        "event": event,
                        "project_id": project_id,
                        "stage": kind,
                        "attempt": attempt,
                        "error": message,
                    }),
                );

                Err(failure.into_error(kind))
            }
        }
    }

    async fn load(&self, project_id: Uuid) -> Result<ProjectSnapshot> {
        self.store
            .get(project_id)
            .await?
            .ok_or_else(|| not_found(project_id))
    }

    async fn persist(&self, snapshot: &ProjectSnapshot) -> Result<()> {
        self.store.save(&snapshot.project, &snapshot.stages).await
    }

    /// Persist the result of a generator run. On failure the outcome is logged
    /// and announced since the stored stage is left `in_progress`.
    async fn persist_outcome(
        &self,
        snapshot: &ProjectSnapshot,
        kind: StageKind,
        attempt: i32,
        outcome: &str,
    ) -> Result<()> {
        let Err(e) = self.persist(snapshot).await else {
            return Ok(());
        };
        let project_id = snapshot.id();
        tracing::error!(project_id = %project_id, stage = %kind, attempt, outcome, error = %e, "Failed to persist stage outcome");
        self.emit(
            EventLevel::Error,
            format!("Stage {} outcome was not persisted: {}", kind, e),
            json!({
                "event": "stage.persist_failed",
                "project_id": project_id,
                "stage": kind,
                "attempt": attempt,
                "outcome": outcome,
                "error": e.to_string(),
            }),
        );
        Err(e)
    }

    fn emit(&self, level: EventLevel, message: String, details: serde_json::Value) {
        self.events
            .emit(level, EVENT_SOURCE, &message, Some(details));
    }
}

/// Run the generator on its own task so a panic or an abort cannot unwind
/// through the engine
async fn run_generator(
    generator: Arc<dyn ArtifactGenerator>,
    ctx: StageContext,
    timeout: Option<Duration>,
) -> std::result::Result<Artifact, StageFailure> {
    let handle = tokio::spawn(async move { generator.generate(&ctx).await });
    let _abort = AbortOnDrop(handle.abort_handle());

    let joined = match timeout {
        Some(budget) => match tokio::time::timeout(budget, handle).await {
            Ok(joined) => joined,
            Err(_) => return Err(StageFailure::TimedOut(budget)),
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(artifact)) => Ok(artifact),
        Ok(Err(e)) => Err(StageFailure::Generator(e.to_string())),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let detail = payload
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| payload.downcast_ref::<&str>().copied())
                .unwrap_or("unknown panic");
            Err(StageFailure::Generator(format!("generator panicked: {}", detail)))
        }
        Err(e) => Err(StageFailure::Generator(format!("generator task cancelled: {}", e))),
    }
}

fn not_found(project_id: Uuid) -> Error {
    Error::NotFound(format!("Project {} not found", project_id))
}

fn stage_mut(snapshot: &mut ProjectSnapshot, kind: StageKind) -> Result<&mut StageRecord> {
    let project_id = snapshot.id();
    snapshot.stage_mut(kind).ok_or_else(|| {
        Error::Internal(format!("project {} has no {} stage record", project_id, kind))
    })
}

fn stage_record(snapshot: &ProjectSnapshot, kind: StageKind) -> Result<StageRecord> {
    snapshot.stage(kind).cloned().ok_or_else(|| {
        Error::Internal(format!("project {} has no {} stage record", snapshot.id(), kind))
    })
}
