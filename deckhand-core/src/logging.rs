//! Tracing subscriber setup.
//!
//! Logs always go to stderr; stdout belongs to command output. The filter is
//! installed behind a reload layer so log options parsed per command can
//! change it after the subscriber is in place.

use std::fmt;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use crate::error::DeckhandError;

/// Default filter directive, overridden by `DECKHAND_LOG_LEVEL` or `RUST_LOG`.
pub const LOG_LEVEL_ENV: &str = "DECKHAND_LOG_LEVEL";
const DEFAULT_DIRECTIVE: &str = "warn";

type ReloadFn = dyn Fn(EnvFilter) -> Result<(), String> + Send + Sync;

/// Handle for changing the active log filter.
#[derive(Clone, Default)]
pub struct LogControl {
    reload: Option<Arc<ReloadFn>>,
}

impl LogControl {
    /// A control not attached to any subscriber; applying directives only
    /// validates them.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.reload.is_some()
    }

    pub fn apply_directive(&self, directive: &str) -> Result<(), DeckhandError> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| DeckhandError::LogOptions(format!("invalid log level {directive:?}: {e}")))?;
        if let Some(reload) = &self.reload {
            reload(filter).map_err(DeckhandError::LogOptions)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LogControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogControl")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Install the global subscriber. If one is already installed, the returned
/// control is detached.
pub fn init_logging() -> LogControl {
    let (filter, handle) = reload::Layer::new(default_filter());

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr), // Critical: logs to stderr, not stdout
        )
        .try_init();

    if installed.is_err() {
        return LogControl::detached();
    }

    LogControl {
        reload: Some(Arc::new(move |filter| {
            handle.reload(filter).map_err(|e| e.to_string())
        })),
    }
}

fn default_filter() -> EnvFilter {
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}
