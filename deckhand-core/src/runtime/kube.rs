//! On-demand Kubernetes configuration.
//!
//! Commands that never talk to a cluster must not fail because no kube
//! config is around, so the initializer only records the settings. The
//! configuration source is resolved the first time a command asks for it and
//! cached from then on.

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::DeckhandError;

pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
const IN_CLUSTER_ENV: &str = "KUBERNETES_SERVICE_HOST";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeSettings {
    pub context: Option<String>,
    pub config_path: Option<PathBuf>,
    pub config_base64: Option<String>,
}

/// Where the cluster configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeConfigSource {
    /// Passed inline as base64 data.
    Inline,
    /// Merged from these files, in order.
    Files(Vec<PathBuf>),
    /// Service account of the pod we run in.
    InCluster,
}

impl fmt::Display for KubeConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("inline"),
            Self::Files(files) => {
                let joined = std::env::join_paths(files).map_err(|_| fmt::Error)?;
                write!(f, "{}", joined.to_string_lossy())
            }
            Self::InCluster => f.write_str("in-cluster"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeConfig {
    pub source: KubeConfigSource,
    pub context: Option<String>,
}

#[derive(Debug)]
pub struct KubeInitializer {
    settings: KubeSettings,
    resolved: OnceCell<KubeConfig>,
}

impl KubeInitializer {
    pub fn new(settings: KubeSettings) -> Self {
        Self {
            settings,
            resolved: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &KubeSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Resolve the configuration on first use.
    pub fn init(&self) -> Result<&KubeConfig, DeckhandError> {
        self.resolved.get_or_try_init(|| {
            let source = resolve_source(&self.settings)?;
            debug!(?source, context = ?self.settings.context, "Kube config resolved");
            Ok(KubeConfig {
                source,
                context: self.settings.context.clone(),
            })
        })
    }
}

fn resolve_source(settings: &KubeSettings) -> Result<KubeConfigSource, DeckhandError> {
    if settings.config_base64.is_some() {
        return Ok(KubeConfigSource::Inline);
    }

    if let Some(path) = &settings.config_path {
        if !path.is_file() {
            return Err(DeckhandError::KubeConfig(format!(
                "kube config {path:?} does not exist"
            )));
        }
        return Ok(KubeConfigSource::Files(vec![path.clone()]));
    }

    if let Some(value) = std::env::var_os(KUBECONFIG_ENV) {
        let files: Vec<PathBuf> = std::env::split_paths(&value)
            .filter(|path| path.is_file())
            .collect();
        if !files.is_empty() {
            return Ok(KubeConfigSource::Files(files));
        }
    }

    if let Some(default) = default_config_path().filter(|path| path.is_file()) {
        return Ok(KubeConfigSource::Files(vec![default]));
    }

    if std::env::var_os(IN_CLUSTER_ENV).is_some() {
        return Ok(KubeConfigSource::InCluster);
    }

    Err(DeckhandError::KubeConfig(
        "no kube config found: pass --kube-config or set KUBECONFIG".into(),
    ))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(Path::new(".kube").join("config")))
}
