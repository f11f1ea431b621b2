use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::OnceCell;
use tracing::debug;

use super::event_log::EventLogSink;
use super::exporter::{NoTelemetry, TelemetryExporter};
use super::pipeline::OtlpExporter;
use super::{ErrorHandler, TelemetryOptions};

/// Owns the exporter and diagnostic log for one process.
///
/// The global accessors in [`crate::telemetry`] delegate to a single static
/// instance; tests construct their own.
pub struct TelemetryRuntime {
    active: OnceCell<Active>,
    shut_down: AtomicBool,
    noop: Arc<dyn TelemetryExporter>,
}

struct Active {
    exporter: Arc<dyn TelemetryExporter>,
    log: Option<Arc<EventLogSink>>,
    handler: ErrorHandler,
}

impl Default for TelemetryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRuntime {
    pub fn new() -> Self {
        Self {
            active: OnceCell::new(),
            shut_down: AtomicBool::new(false),
            noop: Arc::new(NoTelemetry),
        }
    }

    /// Start telemetry if `options` enable it. Disabled telemetry leaves the
    /// runtime untouched and succeeds. Concurrent callers share one
    /// initialization; a failed initialization leaves nothing behind.
    pub async fn init(&self, options: TelemetryOptions) -> Result<()> {
        if !options.enabled {
            debug!("Telemetry disabled");
            return Ok(());
        }
        self.active
            .get_or_try_init(|| activate(options))
            .await?;
        Ok(())
    }

    /// The running exporter, or the no-op exporter when telemetry never
    /// started.
    pub fn exporter(&self) -> Arc<dyn TelemetryExporter> {
        match self.active.get() {
            Some(active) => Arc::clone(&active.exporter),
            None => Arc::clone(&self.noop),
        }
    }

    pub fn is_started(&self) -> bool {
        self.active.initialized() && !self.is_shut_down()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Path of the diagnostic log, if one is open.
    pub fn log_path(&self) -> Option<&std::path::Path> {
        self.active
            .get()
            .and_then(|active| active.log.as_deref())
            .map(EventLogSink::path)
    }

    /// Flush and stop. Only the first call after a successful `init` does
    /// anything; the runtime is shut down afterwards even if flushing timed
    /// out.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let Some(active) = self.active.get() else {
            return Ok(());
        };
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = active
            .exporter
            .shutdown(timeout)
            .await
            .context("unable to shutdown telemetry exporter");

        if let Some(log) = &active.log {
            log.close();
        }
        result
    }

    /// Append `message` to the diagnostic log, if one is open.
    pub fn log(&self, message: &str) {
        let Some(active) = self.active.get() else {
            return;
        };
        let Some(log) = &active.log else {
            return;
        };
        if let Err(err) = log.write_line(message) {
            (active.handler)(
                &anyhow!(err).context(format!("unable to write telemetry log {:?}", log.path())),
            );
        }
    }
}

async fn activate(options: TelemetryOptions) -> Result<Active> {
    let handler = options.error_handler();

    let log = match &options.log_file {
        Some(path) => Some(Arc::new(EventLogSink::open(path)?)),
        None => None,
    };

    let exporter = match start_exporter(&options.endpoint, handler.clone()).await {
        Ok(exporter) => exporter,
        Err(err) => {
            if let Some(log) = &log {
                log.close();
            }
            return Err(err);
        }
    };

    debug!(
        "Telemetry enabled, exporting to {} via {}",
        options.endpoint,
        exporter.name()
    );
    Ok(Active {
        exporter,
        log,
        handler,
    })
}

async fn start_exporter(endpoint: &str, handler: ErrorHandler) -> Result<Arc<dyn TelemetryExporter>> {
    let exporter = OtlpExporter::new(endpoint, handler).context("unable to create telemetry exporter")?;
    exporter
        .start()
        .await
        .context("unable to start telemetry exporter")?;
    Ok(Arc::new(exporter))
}
