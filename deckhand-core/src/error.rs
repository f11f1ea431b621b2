use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckhandError {
    #[error("unable to open telemetry log file {path:?}: {source}")]
    TelemetryLogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("telemetry exporter already started")]
    ExporterAlreadyStarted,

    #[error("telemetry exporter requires a running tokio runtime")]
    NoRuntime,

    #[error("telemetry shutdown did not flush within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("invalid log options: {0}")]
    LogOptions(String),

    #[error("unable to prepare directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("kube config error: {0}")]
    KubeConfig(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("{message}")]
    Exit { code: i32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeckhandError>;
