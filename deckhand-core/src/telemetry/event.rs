//! Telemetry events. Each emitted event is exported as one span.

use std::time::{Duration, SystemTime};

use serde_json::{Map, Value};
use uuid::Uuid;

pub const COMMAND_STARTED: &str = "deckhand.command.started";
pub const COMMAND_EXITED: &str = "deckhand.command.exited";

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Span name
    pub name: String,
    /// Unique span identifier (16-char hex)
    pub span_id: String,
    /// When the event happened
    pub timestamp: SystemTime,
    /// How long the reported operation took, if it has a duration
    pub duration: Option<Duration>,
    /// Free-form attributes, typed by their JSON representation
    pub attributes: Map<String, Value>,
    /// Error description; marks the span as failed
    pub error: Option<String>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span_id: generate_span_id(),
            timestamp: SystemTime::now(),
            duration: None,
            attributes: Map::new(),
            error: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn command_started(path: &[String]) -> Self {
        Self::new(COMMAND_STARTED).with_attribute("command", path.join(" "))
    }

    pub fn command_exited(path: &[String], exit_code: i32, duration: Duration) -> Self {
        let event = Self::new(COMMAND_EXITED)
            .with_attribute("command", path.join(" "))
            .with_attribute("exit_code", exit_code)
            .with_duration(duration);
        if exit_code == 0 {
            event
        } else {
            event.with_error(format!("exit code {exit_code}"))
        }
    }
}

/// Generate a unique 16-character hex span ID (8 bytes).
fn generate_span_id() -> String {
    let uuid = Uuid::now_v7();
    hex::encode(&uuid.as_bytes()[8..16])
}
