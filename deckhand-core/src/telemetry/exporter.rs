//! Exporter trait - abstraction over where telemetry events go.
//!
//! - OTLP over HTTP (the real pipeline)
//! - No-op (telemetry disabled)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::event::TelemetryEvent;

/// Trait for telemetry exporters
///
/// Emission call sites use whatever [`exporter()`](super::exporter) returns
/// and never check whether telemetry is enabled.
#[async_trait]
pub trait TelemetryExporter: Send + Sync {
    /// Queue an event for export. Never blocks and never fails; events that
    /// cannot be queued are dropped.
    fn emit(&self, event: TelemetryEvent);

    /// Launch the background export pipeline.
    async fn start(&self) -> Result<()>;

    /// Flush pending events and stop, waiting at most `timeout`.
    async fn shutdown(&self, timeout: Duration) -> Result<()>;

    /// Exporter identifier for logging/debugging
    fn name(&self) -> &'static str;
}

/// Stand-in used while telemetry is disabled. Every operation succeeds and
/// does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTelemetry;

#[async_trait]
impl TelemetryExporter for NoTelemetry {
    fn emit(&self, _event: TelemetryEvent) {}

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
