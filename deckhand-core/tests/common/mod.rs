//! Test helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};

use anyhow::anyhow;
use deckhand_core::command::{Bootstrap, Invocation};
use deckhand_core::runtime::{
    CommonOptions, KubeInitializer, ProcessPaths, RegistryClient, Services, HELM3_MODE_ENV,
};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::Span;
use prost::Message;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Shared, ordered record of what ran.
#[derive(Clone, Default)]
pub struct StepLog(Arc<Mutex<Vec<String>>>);

impl StepLog {
    pub fn push(&self, step: impl Into<String>) {
        self.0.lock().unwrap().push(step.into());
    }

    pub fn steps(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, step: &str) -> usize {
        self.steps().iter().filter(|s| s.as_str() == step).count()
    }
}

pub const INIT_PROCESS: &str = "init_process";
pub const LOG_OPTIONS: &str = "apply_log_options";
pub const COMPAT_ENV: &str = "set_compat_env";
pub const BUILD_SERVICES: &str = "build_services";
pub const SERVICE_VALUES: &str = "stub_service_values";
pub const HANDLER: &str = "handler";

/// Bootstrap that records every step and can be told to fail at one of them.
pub struct RecordingBootstrap {
    log: StepLog,
    fail_at: Option<&'static str>,
    root: PathBuf,
}

impl RecordingBootstrap {
    pub fn new(log: StepLog) -> Self {
        Self {
            log,
            fail_at: None,
            root: std::env::temp_dir().join("deckhand-recording-bootstrap"),
        }
    }

    pub fn failing_at(mut self, step: &'static str) -> Self {
        self.fail_at = Some(step);
        self
    }

    fn step(&self, step: &'static str) -> anyhow::Result<()> {
        self.log.push(step);
        if self.fail_at == Some(step) {
            return Err(anyhow!("{step} failed"));
        }
        Ok(())
    }
}

impl Bootstrap for RecordingBootstrap {
    fn init_process(&self, _invocation: &Invocation) -> anyhow::Result<ProcessPaths> {
        self.step(INIT_PROCESS)?;
        Ok(ProcessPaths {
            tmp_dir: self.root.join("tmp"),
            home_dir: self.root.join("home"),
        })
    }

    fn apply_log_options(&self, _invocation: &Invocation) -> anyhow::Result<()> {
        self.step(LOG_OPTIONS)
    }

    fn set_compat_env(&self) {
        self.log.push(COMPAT_ENV);
        std::env::set_var(HELM3_MODE_ENV, "1");
    }

    fn build_services(
        &self,
        invocation: &Invocation,
        paths: ProcessPaths,
    ) -> anyhow::Result<Services> {
        self.step(BUILD_SERVICES)?;
        let options = CommonOptions::from_matches(invocation.matches());
        Ok(Services::new(
            paths,
            options.clone(),
            KubeInitializer::new(options.kube),
            RegistryClient::anonymous(),
        ))
    }

    fn stub_service_values(
        &self,
        _invocation: &Invocation,
        services: &mut Services,
    ) -> anyhow::Result<()> {
        self.step(SERVICE_VALUES)?;
        services.set_service_values(serde_json::json!({ "stub": true }));
        Ok(())
    }
}

/// Minimal OTLP/HTTP collector listening on localhost.
pub struct Collector {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<ExportTraceServiceRequest>>>,
}

impl Collector {
    /// Accept export requests and answer every one with `status`.
    pub async fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/v1/traces", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let received = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let received = Arc::clone(&received);
                tokio::spawn(serve_connection(stream, status, received));
            }
        });

        Self { endpoint, requests }
    }

    pub fn requests(&self) -> Vec<ExportTraceServiceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn spans(&self) -> Vec<Span> {
        self.requests()
            .into_iter()
            .flat_map(|request| request.resource_spans)
            .flat_map(|resource| resource.scope_spans)
            .flat_map(|scope| scope.spans)
            .collect()
    }
}

async fn serve_connection(
    stream: TcpStream,
    status: u16,
    received: Arc<Mutex<Vec<ExportTraceServiceRequest>>>,
) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut content_length = 0usize;
        let mut line = String::new();
        // Request line, then headers up to the blank line.
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }
        if let Ok(request) = ExportTraceServiceRequest::decode(body.as_slice()) {
            received.lock().unwrap().push(request);
        }

        let response = format!("HTTP/1.1 {status} Test\r\ncontent-length: 0\r\n\r\n");
        if reader.get_mut().write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Endpoint that accepts connections and never answers.
pub async fn black_hole() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/v1/traces", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    endpoint
}
