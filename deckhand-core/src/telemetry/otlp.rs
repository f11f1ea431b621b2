//! OTLP (OpenTelemetry Protocol) encoding and HTTP transport.
//!
//! Converts batches of [`TelemetryEvent`]s into an
//! `ExportTraceServiceRequest` and posts it as protobuf.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{span::SpanKind, ResourceSpans, ScopeSpans, Span, Status};
use prost::Message;
use serde_json::Value;
use tracing::{debug, warn};

use super::event::TelemetryEvent;

/// Service name for OTLP resource
const SERVICE_NAME: &str = "deckhand";
const INSTRUMENTATION_SCOPE_NAME: &str = "deckhand.telemetry";

const STATUS_OK: i32 = 1;
const STATUS_ERROR: i32 = 2;

/// Post one batch to `url`.
pub async fn export(
    client: &reqwest::Client,
    url: &str,
    trace_id: &[u8; 16],
    events: &[TelemetryEvent],
) -> Result<()> {
    let payload = to_export_request(trace_id, events).encode_to_vec();
    debug!("Exporting {} telemetry spans to {}", events.len(), url);

    let response = client
        .post(url)
        .header("Content-Type", "application/x-protobuf")
        .body(payload)
        .send()
        .await
        .context("Failed to send OTLP export request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!("OTLP export failed: {} - {}", status, body);
        anyhow::bail!("OTLP export failed with status {}", status);
    }

    debug!("OTLP export successful");
    Ok(())
}

/// Wrap a batch of events into one export request.
pub fn to_export_request(trace_id: &[u8; 16], events: &[TelemetryEvent]) -> ExportTraceServiceRequest {
    let scope_spans = ScopeSpans {
        scope: Some(InstrumentationScope {
            name: INSTRUMENTATION_SCOPE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        }),
        spans: events.iter().map(|event| build_span(trace_id, event)).collect(),
        ..Default::default()
    };

    let resource_spans = ResourceSpans {
        resource: Some(Resource {
            attributes: vec![
                kv_string("service.name", SERVICE_NAME),
                kv_string("service.version", env!("CARGO_PKG_VERSION")),
                kv_string("telemetry.sdk.name", "deckhand"),
                kv_string("telemetry.sdk.language", "rust"),
                kv_int("process.pid", i64::from(std::process::id())),
            ],
            ..Default::default()
        }),
        scope_spans: vec![scope_spans],
        ..Default::default()
    };

    ExportTraceServiceRequest {
        resource_spans: vec![resource_spans],
    }
}

fn build_span(trace_id: &[u8; 16], event: &TelemetryEvent) -> Span {
    let end_time_ns = system_time_to_nanos(&event.timestamp);
    let start_time_ns = event
        .duration
        .map(|d| end_time_ns.saturating_sub(duration_to_nanos(d)))
        .unwrap_or(end_time_ns);

    let status = match &event.error {
        Some(message) => Status {
            code: STATUS_ERROR,
            message: message.clone(),
        },
        None => Status {
            code: STATUS_OK,
            message: String::new(),
        },
    };

    Span {
        trace_id: trace_id.to_vec(),
        span_id: parse_span_id(&event.span_id).to_vec(),
        parent_span_id: vec![],
        name: event.name.clone(),
        kind: SpanKind::Internal as i32,
        start_time_unix_nano: start_time_ns,
        end_time_unix_nano: end_time_ns,
        attributes: event
            .attributes
            .iter()
            .map(|(key, value)| kv_json(key, value))
            .collect(),
        status: Some(status),
        ..Default::default()
    }
}

// Helper functions for creating KeyValue attributes
fn kv(key: &str, value: any_value::Value) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue { value: Some(value) }),
    }
}

fn kv_string(key: &str, value: &str) -> KeyValue {
    kv(key, any_value::Value::StringValue(value.to_string()))
}

fn kv_int(key: &str, value: i64) -> KeyValue {
    kv(key, any_value::Value::IntValue(value))
}

fn kv_json(key: &str, value: &Value) -> KeyValue {
    let typed = match value {
        Value::Bool(b) => any_value::Value::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => any_value::Value::IntValue(i),
            None => any_value::Value::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => any_value::Value::StringValue(s.clone()),
        other => any_value::Value::StringValue(other.to_string()),
    };
    kv(key, typed)
}

/// Parse span_id string to 8-byte array (OTLP requires 8 bytes).
fn parse_span_id(span_id: &str) -> [u8; 8] {
    let mut result = [0u8; 8];
    if let Ok(bytes) = hex::decode(span_id) {
        let len = bytes.len().min(8);
        result[..len].copy_from_slice(&bytes[..len]);
    }
    result
}

/// Convert SystemTime to nanoseconds since Unix epoch.
fn system_time_to_nanos(time: &SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(duration_to_nanos)
        .unwrap_or(0)
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
