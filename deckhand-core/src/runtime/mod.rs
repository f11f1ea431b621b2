//! Ambient services for decorated commands.
//!
//! Instead of module level singletons, the decorator builds one [`Services`]
//! bundle per command execution and hands it to the business logic through
//! the [`Invocation`](crate::command::Invocation).

pub mod kube;
pub mod options;
pub mod registry;
pub mod service_values;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::debug;

use crate::command::{Bootstrap, Invocation};
use crate::error::DeckhandError;
use crate::logging::LogControl;

pub use kube::{KubeConfig, KubeConfigSource, KubeInitializer, KubeSettings};
pub use options::{CommonOptions, LogOptions};
pub use registry::RegistryClient;

/// Environment toggle set for downstream helm code before every decorated
/// command.
pub const HELM3_MODE_ENV: &str = "DECKHAND_HELM3_MODE";

const DEFAULT_NAMESPACE: &str = "default";
const APP_DIR_NAME: &str = "deckhand";

/// Directories prepared by process initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPaths {
    pub tmp_dir: PathBuf,
    pub home_dir: PathBuf,
}

impl ProcessPaths {
    /// Resolve defaults and create both directories.
    pub fn init(tmp_dir: Option<PathBuf>, home_dir: Option<PathBuf>) -> Result<Self, DeckhandError> {
        let tmp_dir = tmp_dir.unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME));
        let home_dir = home_dir.unwrap_or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(format!(".{APP_DIR_NAME}")))
                .unwrap_or_else(|| tmp_dir.join("home"))
        });

        for dir in [&tmp_dir, &home_dir] {
            std::fs::create_dir_all(dir).map_err(|source| DeckhandError::Directory {
                path: dir.clone(),
                source,
            })?;
        }

        debug!("Process directories ready: tmp={:?} home={:?}", tmp_dir, home_dir);
        Ok(Self { tmp_dir, home_dir })
    }
}

/// Settings handed to release actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionConfig {
    pub namespace: String,
    pub status_progress_period: Duration,
    pub hooks_status_progress_period: Duration,
    pub releases_history_max: u32,
}

impl ActionConfig {
    pub fn from_options(options: &CommonOptions) -> Self {
        Self {
            namespace: options
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            status_progress_period: options.status_progress_period,
            hooks_status_progress_period: options.hooks_status_progress_period,
            releases_history_max: options.releases_history_max,
        }
    }
}

/// Everything a decorated command may need besides its own arguments.
#[derive(Debug)]
pub struct Services {
    pub paths: ProcessPaths,
    pub options: CommonOptions,
    pub kube: Arc<KubeInitializer>,
    pub registry: Arc<RegistryClient>,
    pub action: ActionConfig,
    service_values: Option<Value>,
}

impl Services {
    pub fn new(
        paths: ProcessPaths,
        options: CommonOptions,
        kube: KubeInitializer,
        registry: RegistryClient,
    ) -> Self {
        let action = ActionConfig::from_options(&options);
        Self {
            paths,
            options,
            kube: Arc::new(kube),
            registry: Arc::new(registry),
            action,
            service_values: None,
        }
    }

    pub fn service_values(&self) -> Option<&Value> {
        self.service_values.as_ref()
    }

    pub fn set_service_values(&mut self, values: Value) {
        self.service_values = Some(values);
    }
}

/// The bootstrap used by the real CLI.
#[derive(Debug, Clone)]
pub struct StandardBootstrap {
    log: LogControl,
}

impl StandardBootstrap {
    pub fn new(log: LogControl) -> Self {
        Self { log }
    }
}

impl Bootstrap for StandardBootstrap {
    fn init_process(&self, invocation: &Invocation) -> anyhow::Result<ProcessPaths> {
        let options = CommonOptions::from_matches(invocation.matches());
        Ok(ProcessPaths::init(options.tmp_dir, options.home_dir)?)
    }

    fn apply_log_options(&self, invocation: &Invocation) -> anyhow::Result<()> {
        let options = LogOptions::from_matches(invocation.matches());
        options.validate()?;
        if let Some(directive) = options.directive() {
            self.log.apply_directive(directive)?;
        }
        Ok(())
    }

    fn build_services(
        &self,
        invocation: &Invocation,
        paths: ProcessPaths,
    ) -> anyhow::Result<Services> {
        let options = CommonOptions::from_matches(invocation.matches());
        let kube = KubeInitializer::new(options.kube.clone());
        let registry = RegistryClient::from_docker_config(
            options.docker_config.as_deref(),
            options.insecure_helm_dependencies,
        )
        .context("unable to create helm registry client")?;
        Ok(Services::new(paths, options, kube, registry))
    }

    fn stub_service_values(
        &self,
        _invocation: &Invocation,
        services: &mut Services,
    ) -> anyhow::Result<()> {
        let values = service_values::stub_service_values(&services.action.namespace)
            .context("error creating service values")?;
        services.set_service_values(values);
        Ok(())
    }
}
