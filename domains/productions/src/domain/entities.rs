//! Domain entities for the Productions domain
//!
//! A production `Project` owns exactly five `StageRecord`s, one per pipeline
//! stage. `ProjectSnapshot` pairs them and is the unit that stores read and
//! write, so the invariants between project and stages are checked in one
//! place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use tubeflow_common::{Error, Result};

use crate::domain::state::{StageEvent, StageState, StageStateMachine};

/// Longest accepted project name, in characters
pub const MAX_PROJECT_NAME_LEN: usize = 200;

/// Opaque structured output of a stage
pub type Artifact = serde_json::Value;

/// Pipeline stage identifier, ordered by pipeline position
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[sqlx(type_name = "stage_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Research,
    Script,
    Storyboard,
    Render,
    Upload,
}

impl StageKind {
    /// All stages in pipeline order
    pub const ALL: [StageKind; 5] = [
        StageKind::Research,
        StageKind::Script,
        StageKind::Storyboard,
        StageKind::Render,
        StageKind::Upload,
    ];

    /// Zero-based position in the pipeline
    pub fn position(self) -> usize {
        match self {
            StageKind::Research => 0,
            StageKind::Script => 1,
            StageKind::Storyboard => 2,
            StageKind::Render => 3,
            StageKind::Upload => 4,
        }
    }

    /// Stage that follows this one, `None` for the last stage
    pub fn next(self) -> Option<StageKind> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// Stages strictly before this one
    pub fn predecessors(self) -> &'static [StageKind] {
        &Self::ALL[..self.position()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Script => "script",
            StageKind::Storyboard => "storyboard",
            StageKind::Render => "render",
            StageKind::Upload => "upload",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "stage_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        self.to_state().is_terminal()
    }

    /// Convert to state machine state
    pub fn to_state(&self) -> StageState {
        match self {
            StageStatus::Pending => StageState::Pending,
            StageStatus::InProgress => StageState::InProgress,
            StageStatus::Completed => StageState::Completed,
            StageStatus::Failed => StageState::Failed,
        }
    }

    /// Create from state machine state
    pub fn from_state(state: StageState) -> Self {
        match state {
            StageState::Pending => StageStatus::Pending,
            StageState::InProgress => StageStatus::InProgress,
            StageState::Completed => StageStatus::Completed,
            StageState::Failed => StageStatus::Failed,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_state().fmt(f)
    }
}

/// Project entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Earliest stage not yet completed; `None` once the pipeline is done
    pub current_stage: Option<StageKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Create a new project with validation
    pub fn new(name: &str) -> Result<Self> {
        let name = Self::validate_name(name)?;
        let now = Utc::now();
        Ok(Project {
            id: Uuid::new_v4(),
            name,
            current_stage: Some(StageKind::Research),
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Trim and check a display name
    pub fn validate_name(name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation(
                "Project name must not be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_PROJECT_NAME_LEN {
            return Err(Error::Validation(format!(
                "Project name must be ≤{} characters",
                MAX_PROJECT_NAME_LEN
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn is_complete(&self) -> bool {
        self.current_stage.is_none()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Per-project, per-stage record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StageRecord {
    pub project_id: Uuid,
    pub stage: StageKind,
    pub status: StageStatus,
    /// Present only while `status == completed`
    pub artifact: Option<Json<Artifact>>,
    /// Present only while `status == failed`
    pub error: Option<String>,
    /// Generator invocations started for this stage
    pub attempts: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StageRecord {
    pub fn new(project_id: Uuid, stage: StageKind) -> Self {
        StageRecord {
            project_id,
            stage,
            status: StageStatus::Pending,
            artifact: None,
            error: None,
            attempts: 0,
            started_at: None,
            finished_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref().map(|json| &json.0)
    }

    /// Mark the stage `in_progress` and count the attempt
    pub fn start(&mut self) -> Result<()> {
        let new_state = self.apply_transition(StageEvent::Start)?;
        let now = Utc::now();
        self.status = StageStatus::from_state(new_state);
        self.attempts += 1;
        self.artifact = None;
        self.error = None;
        self.started_at = Some(now);
        self.finished_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Store the artifact and mark the stage `completed`
    pub fn complete(&mut self, artifact: Artifact) -> Result<()> {
        let new_state = self.apply_transition(StageEvent::Succeed)?;
        let now = Utc::now();
        self.status = StageStatus::from_state(new_state);
        self.artifact = Some(Json(artifact));
        self.error = None;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record the failure message and mark the stage `failed`
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        let new_state = self.apply_transition(StageEvent::Fail)?;
        let mut message = message.into();
        if message.trim().is_empty() {
            message = format!("stage {} failed without an error message", self.stage);
        }
        let now = Utc::now();
        self.status = StageStatus::from_state(new_state);
        self.artifact = None;
        self.error = Some(message);
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Move a failed stage back to `pending`
    pub fn reset(&mut self) -> Result<()> {
        let new_state = self.apply_transition(StageEvent::Retry)?;
        self.status = StageStatus::from_state(new_state);
        self.error = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check the artifact/error presence invariants
    pub fn validate(&self) -> Result<()> {
        let has_artifact = self.artifact.is_some();
        let has_error = self.error.is_some();
        let consistent = match self.status {
            StageStatus::Completed => has_artifact && !has_error,
            StageStatus::Failed => !has_artifact && has_error,
            StageStatus::Pending | StageStatus::InProgress => !has_artifact && !has_error,
        };
        if !consistent {
            return Err(Error::Internal(format!(
                "stage {} of project {} is {} with artifact={} error={}",
                self.stage, self.project_id, self.status, has_artifact, has_error
            )));
        }
        if self.attempts < 0 {
            return Err(Error::Internal(format!(
                "stage {} of project {} has negative attempt count",
                self.stage, self.project_id
            )));
        }
        Ok(())
    }

    fn apply_transition(&self, event: StageEvent) -> Result<StageState> {
        StageStateMachine::transition(self.status.to_state(), event).map_err(|e| {
            Error::InvalidState(format!("stage {}: {}", self.stage, e))
        })
    }
}

/// A project together with its five stage records, in pipeline order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub project: Project,
    pub stages: Vec<StageRecord>,
}

impl ProjectSnapshot {
    /// Create a fresh project with every stage `pending`
    pub fn create(name: &str) -> Result<Self> {
        let project = Project::new(name)?;
        let stages = StageKind::ALL
            .iter()
            .map(|kind| StageRecord::new(project.id, *kind))
            .collect();
        Ok(Self { project, stages })
    }

    /// Assemble a snapshot from stored rows, sorting stages and checking invariants
    pub fn from_parts(project: Project, mut stages: Vec<StageRecord>) -> Result<Self> {
        stages.sort_by_key(|record| record.stage);
        let snapshot = Self { project, stages };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn id(&self) -> Uuid {
        self.project.id
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.stage == kind)
    }

    pub fn stage_mut(&mut self, kind: StageKind) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|record| record.stage == kind)
    }

    /// Record of the project's current stage
    pub fn current(&self) -> Option<&StageRecord> {
        self.project
            .current_stage
            .and_then(|kind| self.stage(kind))
    }

    /// First stage whose status is not `completed`
    pub fn first_incomplete_stage(&self) -> Option<StageKind> {
        StageKind::ALL.into_iter().find(|kind| {
            self.stage(*kind)
                .map_or(true, |record| record.status != StageStatus::Completed)
        })
    }

    pub fn is_complete(&self) -> bool {
        self.project.is_complete()
    }

    /// Artifacts of completed stages strictly before `kind`
    pub fn prior_artifacts(&self, kind: StageKind) -> BTreeMap<StageKind, Artifact> {
        kind.predecessors()
            .iter()
            .filter_map(|prior| {
                self.stage(*prior)
                    .filter(|record| record.status == StageStatus::Completed)
                    .and_then(|record| record.artifact().cloned())
                    .map(|artifact| (*prior, artifact))
            })
            .collect()
    }

    /// Re-derive `current_stage` from stage statuses and bump `updated_at`
    pub fn sync_current_stage(&mut self) {
        let next = self.first_incomplete_stage();
        self.project.current_stage = next;
        if next.is_none() && self.project.completed_at.is_none() {
            self.project.completed_at = Some(Utc::now());
        }
        self.project.touch();
    }

    /// Check every project/stage invariant
    pub fn validate(&self) -> Result<()> {
        let id = self.project.id;

        if self.stages.len() != StageKind::ALL.len() {
            return Err(Error::Internal(format!(
                "project {} has {} stage records, expected {}",
                id,
                self.stages.len(),
                StageKind::ALL.len()
            )));
        }

        let mut in_progress = 0;
        for (record, expected) in self.stages.iter().zip(StageKind::ALL) {
            if record.stage != expected {
                return Err(Error::Internal(format!(
                    "project {} stage records are out of order: found {} where {} belongs",
                    id, record.stage, expected
                )));
            }
            if record.project_id != id {
                return Err(Error::Internal(format!(
                    "stage {} belongs to project {}, not {}",
                    record.stage, record.project_id, id
                )));
            }
            record.validate()?;

            if record.status != StageStatus::Pending {
                let blocked = record.stage.predecessors().iter().any(|prior| {
                    self.stage(*prior)
                        .map_or(true, |r| r.status != StageStatus::Completed)
                });
                if blocked {
                    return Err(Error::Internal(format!(
                        "stage {} of project {} is {} before earlier stages completed",
                        record.stage, id, record.status
                    )));
                }
            }
            if record.status == StageStatus::InProgress {
                in_progress += 1;
            }
        }

        if in_progress > 1 {
            return Err(Error::Internal(format!(
                "project {} has {} stages in progress",
                id, in_progress
            )));
        }

        if self.project.current_stage != self.first_incomplete_stage() {
            return Err(Error::Internal(format!(
                "project {} current stage {:?} does not match first incomplete stage {:?}",
                id,
                self.project.current_stage,
                self.first_incomplete_stage()
            )));
        }

        Ok(())
    }
}
