//! Workflow event log
//!
//! The engine reports every lifecycle step to an `EventSink`. Emitting is
//! fire-and-forget: sinks swallow and log their own failures so an event
//! never aborts the operation that produced it.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Severity of a workflow event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

/// Append-only consumer of workflow events
pub trait EventSink: Send + Sync {
    fn emit(&self, level: EventLevel, source: &str, message: &str, details: Option<serde_json::Value>);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, level: EventLevel, source: &str, message: &str, details: Option<serde_json::Value>) {
        let details = details.unwrap_or(serde_json::Value::Null);
        match level {
            EventLevel::Debug => tracing::debug!(source, %details, "{}", message),
            EventLevel::Info => tracing::info!(source, %details, "{}", message),
            EventLevel::Warn => tracing::warn!(source, %details, "{}", message),
            EventLevel::Error => tracing::error!(source, %details, "{}", message),
        }
    }
}

/// A captured event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub level: EventLevel,
    pub source: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl RecordedEvent {
    /// Event name carried in `details.event`
    pub fn name(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|details| details.get("event"))
            .and_then(|event| event.as_str())
    }
}

/// Stores events in memory for test assertions
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return all recorded events
    pub fn recorded_events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Names of recorded events in emission order
    pub fn event_names(&self) -> Vec<String> {
        self.recorded_events()
            .iter()
            .filter_map(|event| event.name().map(str::to_string))
            .collect()
    }

    pub fn reset(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, level: EventLevel, source: &str, message: &str, details: Option<serde_json::Value>) {
        match self.events.lock() {
            Ok(mut events) => events.push(RecordedEvent {
                level,
                source: source.to_string(),
                message: message.to_string(),
                details,
            }),
            Err(e) => tracing::warn!(error = %e, "Recording sink lock poisoned, dropping event"),
        }
    }
}

/// Persists events to the `production_events` table
///
/// Inserts run on a spawned task; failures are logged and dropped.
#[derive(Clone)]
pub struct PgEventSink {
    pool: PgPool,
}

impl PgEventSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventSink for PgEventSink {
    fn emit(&self, level: EventLevel, source: &str, message: &str, details: Option<serde_json::Value>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(source, message, "No async runtime, dropping workflow event");
            return;
        };

        let project_id = details
            .as_ref()
            .and_then(|d| d.get("project_id"))
            .and_then(|id| id.as_str())
            .and_then(|id| Uuid::parse_str(id).ok());
        let pool = self.pool.clone();
        let source = source.to_string();
        let message = message.to_string();

        runtime.spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO production_events (project_id, level, source, message, details)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(project_id)
            .bind(level.as_str())
            .bind(&source)
            .bind(&message)
            .bind(details.map(sqlx::types::Json))
            .execute(&pool)
            .await;

            if let Err(e) = result {
                tracing::warn!(error = %e, source = %source, "Failed to persist workflow event");
            }
        });
    }
}

/// Fan out to several sinks
#[derive(Clone, Default)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for CompositeEventSink {
    fn emit(&self, level: EventLevel, source: &str, message: &str, details: Option<serde_json::Value>) {
        for sink in &self.sinks {
            sink.emit(level, source, message, details.clone());
        }
    }
}
