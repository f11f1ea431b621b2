//! Registry client handle used by chart dependency and OCI commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::DeckhandError;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryClient {
    config_file: Option<PathBuf>,
    insecure: bool,
    authenticated_hosts: Vec<String>,
}

impl RegistryClient {
    /// A client without credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Load credentials from the docker config directory.
    ///
    /// An explicitly configured directory must contain a config file; the
    /// default `~/.docker` is optional.
    pub fn from_docker_config(
        config_dir: Option<&Path>,
        insecure: bool,
    ) -> Result<Self, DeckhandError> {
        let (dir, explicit) = match config_dir {
            Some(dir) => (dir.to_path_buf(), true),
            None => match dirs::home_dir() {
                Some(home) => (home.join(".docker"), false),
                None => {
                    return Ok(Self {
                        insecure,
                        ..Self::default()
                    })
                }
            },
        };

        let file = dir.join(CONFIG_FILE);
        if !file.is_file() {
            if explicit {
                return Err(DeckhandError::Registry(format!(
                    "docker config {file:?} not found"
                )));
            }
            debug!("No docker config at {:?}, using anonymous registry access", file);
            return Ok(Self {
                insecure,
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(&file)?;
        let parsed: DockerConfigFile = serde_json::from_str(&content).map_err(|e| {
            DeckhandError::Registry(format!("invalid docker config {file:?}: {e}"))
        })?;

        Ok(Self {
            config_file: Some(file),
            insecure,
            authenticated_hosts: parsed.auths.into_keys().collect(),
        })
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    pub fn authenticated_hosts(&self) -> &[String] {
        &self.authenticated_hosts
    }
}
