//! Asynchronous OTLP export pipeline.
//!
//! `emit` pushes into a bounded channel without waiting. A background task
//! started by `start` drains the channel into batches and posts them, flushing
//! when a batch is full, on a timer, and when the channel closes. `shutdown`
//! closes the channel and waits, bounded by its timeout, for the final flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use super::event::TelemetryEvent;
use super::exporter::TelemetryExporter;
use super::otlp;
use super::ErrorHandler;
use crate::error::DeckhandError;

const QUEUE_CAPACITY: usize = 1024;
const MAX_BATCH: usize = 64;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OtlpExporter {
    endpoint: String,
    client: reqwest::Client,
    handler: ErrorHandler,
    trace_id: [u8; 16],
    started: AtomicBool,
    sender: Mutex<Option<mpsc::Sender<TelemetryEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OtlpExporter {
    pub fn new(endpoint: &str, handler: ErrorHandler) -> Result<Self> {
        let url = reqwest::Url::parse(endpoint)
            .with_context(|| format!("invalid telemetry endpoint {endpoint:?}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("unsupported telemetry endpoint scheme {:?}", url.scheme());
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            handler,
            trace_id: *Uuid::now_v7().as_bytes(),
            started: AtomicBool::new(false),
            sender: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Trace id shared by every span of this process.
    pub fn trace_id(&self) -> String {
        hex::encode(self.trace_id)
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl TelemetryExporter for OtlpExporter {
    fn emit(&self, event: TelemetryEvent) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            // Not started yet or already shut down.
            return;
        };
        // The lock is released here: the handler may emit again.
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                (self.handler)(&anyhow!(
                    "telemetry queue is full, dropping event {:?}",
                    event.name
                ));
            }
            Err(TrySendError::Closed(event)) => {
                (self.handler)(&anyhow!(
                    "telemetry export task is gone, dropping event {:?}",
                    event.name
                ));
            }
        }
    }

    async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DeckhandError::ExporterAlreadyStarted.into());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DeckhandError::NoRuntime)?;

        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let worker = ExportWorker {
            url: self.endpoint.clone(),
            client: self.client.clone(),
            handler: self.handler.clone(),
            trace_id: self.trace_id,
        };
        let handle = runtime.spawn(worker.run(receiver));

        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!("Telemetry exporter started for {}", self.endpoint);
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> Result<()> {
        // Dropping the only sender closes the channel; the worker flushes
        // what is left and exits.
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut worker) = worker else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => {
                debug!("Telemetry exporter flushed and stopped");
                Ok(())
            }
            Ok(Err(join_error)) => Err(anyhow!(join_error).context("telemetry export task failed")),
            Err(_) => {
                warn!("Telemetry flush did not finish within {:?}", timeout);
                worker.abort();
                Err(DeckhandError::ShutdownTimeout(timeout).into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "otlp"
    }
}

struct ExportWorker {
    url: String,
    client: reqwest::Client,
    handler: ErrorHandler,
    trace_id: [u8; 16],
}

impl ExportWorker {
    async fn run(self, mut receiver: mpsc::Receiver<TelemetryEvent>) {
        let mut batch = Vec::with_capacity(MAX_BATCH);
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= MAX_BATCH {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush(&mut batch).await,
            }
        }

        self.flush(&mut batch).await;
    }

    async fn flush(&self, batch: &mut Vec<TelemetryEvent>) {
        if batch.is_empty() {
            return;
        }
        let events = std::mem::take(batch);
        if let Err(err) = otlp::export(&self.client, &self.url, &self.trace_id, &events).await {
            (self.handler)(&err);
        }
    }
}
