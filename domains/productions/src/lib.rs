//! Productions domain: projects, pipeline stages, artifacts, workflow engine

pub mod domain;
pub mod engine;
pub mod events;
pub mod generators;
pub mod repository;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{
    Artifact, Project, ProjectSnapshot, StageKind, StageRecord, StageStatus, MAX_PROJECT_NAME_LEN,
};
pub use domain::state::{StageEvent, StageState, StageStateMachine, StateError};
pub use engine::{EngineConfig, WorkflowEngine, INTERRUPTED_MESSAGE};
pub use events::{
    CompositeEventSink, EventLevel, EventSink, PgEventSink, RecordedEvent, RecordingEventSink,
    TracingEventSink,
};
pub use generators::{
    ArtifactGenerator, GeneratorError, GeneratorFactory, GeneratorRegistry, StageContext,
};
pub use repository::{InMemoryProjectStore, PgProjectStore, ProjectStore};
