//! Process-wide telemetry.
//!
//! Telemetry is opt-in through `DECKHAND_TELEMETRY`. When enabled, events are
//! exported as OTLP spans by a background task and, if
//! `DECKHAND_TELEMETRY_LOG_FILE` is set, every diagnostic message is appended
//! to that file. When disabled, [`exporter()`] hands out a no-op exporter so
//! emission call sites never need to check.
//!
//! ```text
//! init(options) ──► TelemetryRuntime ──► OtlpExporter ──► mpsc ──► export task ──► HTTP
//!                          │
//!                          └──► EventLogSink (optional)
//! ```

pub mod event;
pub mod event_log;
pub mod exporter;
pub mod lifecycle;
pub mod otlp;
pub mod pipeline;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::debug;

pub use event::TelemetryEvent;
pub use event_log::EventLogSink;
pub use exporter::{NoTelemetry, TelemetryExporter};
pub use lifecycle::TelemetryRuntime;
pub use pipeline::OtlpExporter;

pub const TRACES_URL: &str = "https://telemetry.deckhand.dev/v1/traces";
pub const TELEMETRY_ENV: &str = "DECKHAND_TELEMETRY";
pub const TELEMETRY_LOG_FILE_ENV: &str = "DECKHAND_TELEMETRY_LOG_FILE";

/// Receives errors that telemetry cannot report to anyone else.
pub type ErrorHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

static RUNTIME: Lazy<TelemetryRuntime> = Lazy::new(TelemetryRuntime::new);
static ERROR_HANDLER: Lazy<RwLock<Option<ErrorHandler>>> = Lazy::new(|| RwLock::new(None));

/// Truthy spellings accepted for boolean environment variables.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value,
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "yes" | "YES" | "on" | "ON"
    )
}

/// Whether the environment asks for telemetry.
pub fn is_enabled() -> bool {
    std::env::var(TELEMETRY_ENV)
        .map(|value| parse_bool(value.trim()))
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct TelemetryOptions {
    pub enabled: bool,
    pub endpoint: String,
    pub log_file: Option<PathBuf>,
    error_handler: Option<ErrorHandler>,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: TRACES_URL.to_string(),
            log_file: None,
            error_handler: None,
        }
    }
}

impl TelemetryOptions {
    /// Read enablement and the diagnostic log path from the environment.
    pub fn from_env() -> Self {
        let log_file = std::env::var_os(TELEMETRY_LOG_FILE_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            enabled: is_enabled(),
            log_file,
            ..Self::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// The configured handler, or one that logs at debug level.
    pub fn error_handler(&self) -> ErrorHandler {
        self.error_handler.clone().unwrap_or_else(debug_handler)
    }
}

impl fmt::Debug for TelemetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryOptions")
            .field("enabled", &self.enabled)
            .field("endpoint", &self.endpoint)
            .field("log_file", &self.log_file)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

fn debug_handler() -> ErrorHandler {
    Arc::new(|err: &anyhow::Error| debug!("telemetry: {err:#}"))
}

/// Initialize process-wide telemetry. On success with telemetry enabled, the
/// options' error handler becomes the global telemetry error handler.
pub async fn init(options: TelemetryOptions) -> Result<()> {
    let handler = options.error_handler();
    RUNTIME.init(options).await?;
    if RUNTIME.is_started() {
        set_error_handler(handler);
    }
    Ok(())
}

/// Flush and stop process-wide telemetry, waiting at most `timeout`.
pub async fn shutdown(timeout: Duration) -> Result<()> {
    RUNTIME.shutdown(timeout).await
}

pub fn exporter() -> Arc<dyn TelemetryExporter> {
    RUNTIME.exporter()
}

pub fn emit(event: TelemetryEvent) {
    RUNTIME.exporter().emit(event);
}

pub fn is_started() -> bool {
    RUNTIME.is_started()
}

pub fn log(message: &str) {
    RUNTIME.log(message);
}

/// Backing function for [`telemetry_log!`](crate::telemetry_log).
pub fn log_fmt(args: fmt::Arguments<'_>) {
    if RUNTIME.log_path().is_some() {
        RUNTIME.log(&args.to_string());
    }
}

pub fn set_error_handler(handler: ErrorHandler) {
    *ERROR_HANDLER
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(handler);
}

/// Route an error to the global telemetry error handler.
pub fn handle_error(err: &anyhow::Error) {
    let handler = ERROR_HANDLER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match handler {
        Some(handler) => handler(err),
        None => debug!("telemetry: {err:#}"),
    }
}

/// Append a formatted line to the telemetry diagnostic log, if one is open.
///
/// ```ignore
/// telemetry_log!("exporting {} spans", spans.len());
/// ```
#[macro_export]
macro_rules! telemetry_log {
    ($($arg:tt)*) => {
        $crate::telemetry::log_fmt(::std::format_args!($($arg)*))
    };
}
