//! Shared command-line options.
//!
//! Every decorated command accepts the same set of global flags. They are
//! registered once on the root of the tree and read back from the matched
//! arguments of whichever command runs.

use std::path::PathBuf;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches};

use crate::error::DeckhandError;

use super::kube::KubeSettings;

pub const TMP_DIR: &str = "tmp-dir";
pub const HOME_DIR: &str = "home-dir";
pub const KUBE_CONFIG: &str = "kube-config";
pub const KUBE_CONFIG_BASE64: &str = "kube-config-base64";
pub const KUBE_CONTEXT: &str = "kube-context";
pub const STATUS_PROGRESS_PERIOD: &str = "status-progress-period";
pub const HOOKS_STATUS_PROGRESS_PERIOD: &str = "hooks-status-progress-period";
pub const RELEASES_HISTORY_MAX: &str = "releases-history-max";
pub const INSECURE_HELM_DEPENDENCIES: &str = "insecure-helm-dependencies";
pub const DOCKER_CONFIG: &str = "docker-config";
pub const NAMESPACE: &str = "namespace";
pub const LOG_LEVEL: &str = "log-level";
pub const LOG_VERBOSE: &str = "log-verbose";
pub const LOG_DEBUG: &str = "log-debug";
pub const LOG_QUIET: &str = "log-quiet";

const DEFAULT_PROGRESS_PERIOD_SECONDS: u64 = 5;

/// Options shared by every decorated command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonOptions {
    pub tmp_dir: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
    pub kube: KubeSettings,
    pub status_progress_period: Duration,
    pub hooks_status_progress_period: Duration,
    pub releases_history_max: u32,
    pub insecure_helm_dependencies: bool,
    pub docker_config: Option<PathBuf>,
    pub namespace: Option<String>,
}

impl CommonOptions {
    /// Global arguments to register on the root command.
    pub fn args() -> Vec<Arg> {
        let mut args = vec![
            Arg::new(TMP_DIR)
                .long(TMP_DIR)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Directory for temporary files (default: system temp dir)"),
            Arg::new(HOME_DIR)
                .long(HOME_DIR)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Directory for persistent state (default: ~/.deckhand)"),
            Arg::new(KUBE_CONFIG)
                .long(KUBE_CONFIG)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Kubernetes config file path"),
            Arg::new(KUBE_CONFIG_BASE64)
                .long(KUBE_CONFIG_BASE64)
                .value_name("DATA")
                .global(true)
                .help("Kubernetes config data as base64 string"),
            Arg::new(KUBE_CONTEXT)
                .long(KUBE_CONTEXT)
                .value_name("NAME")
                .global(true)
                .help("Kubernetes config context"),
            Arg::new(STATUS_PROGRESS_PERIOD)
                .long(STATUS_PROGRESS_PERIOD)
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .default_value("5")
                .global(true)
                .help("Status progress period in seconds"),
            Arg::new(HOOKS_STATUS_PROGRESS_PERIOD)
                .long(HOOKS_STATUS_PROGRESS_PERIOD)
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .default_value("5")
                .global(true)
                .help("Hooks status progress period in seconds"),
            Arg::new(RELEASES_HISTORY_MAX)
                .long(RELEASES_HISTORY_MAX)
                .value_name("COUNT")
                .value_parser(value_parser!(u32))
                .default_value("0")
                .global(true)
                .help("Max releases to keep in release history (0 = unlimited)"),
            Arg::new(INSECURE_HELM_DEPENDENCIES)
                .long(INSECURE_HELM_DEPENDENCIES)
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Allow insecure oci registries to be used in chart dependencies"),
            Arg::new(DOCKER_CONFIG)
                .long(DOCKER_CONFIG)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Docker config directory holding registry credentials"),
        ];
        args.extend(LogOptions::args());
        args
    }

    /// The namespace argument, registered on the command group that scopes
    /// requests to a namespace.
    pub fn namespace_arg() -> Arg {
        Arg::new(NAMESPACE)
            .short('n')
            .long(NAMESPACE)
            .value_name("NAME")
            .global(true)
            .help("Namespace scope for this request")
    }

    /// Read the options back from matched arguments. Arguments the command
    /// tree never registered fall back to their defaults.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            tmp_dir: path_value(matches, TMP_DIR),
            home_dir: path_value(matches, HOME_DIR),
            kube: KubeSettings {
                context: string_value(matches, KUBE_CONTEXT),
                config_path: path_value(matches, KUBE_CONFIG),
                config_base64: string_value(matches, KUBE_CONFIG_BASE64),
            },
            status_progress_period: seconds_value(matches, STATUS_PROGRESS_PERIOD),
            hooks_status_progress_period: seconds_value(matches, HOOKS_STATUS_PROGRESS_PERIOD),
            releases_history_max: matches
                .try_get_one::<u32>(RELEASES_HISTORY_MAX)
                .ok()
                .flatten()
                .copied()
                .unwrap_or(0),
            insecure_helm_dependencies: flag_value(matches, INSECURE_HELM_DEPENDENCIES),
            docker_config: path_value(matches, DOCKER_CONFIG),
            namespace: string_value(matches, NAMESPACE),
        }
    }
}

/// Logging related options, applied on every command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub level: Option<String>,
    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
}

impl LogOptions {
    pub fn args() -> Vec<Arg> {
        vec![
            Arg::new(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("LEVEL")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .global(true)
                .help("Set log level"),
            Arg::new(LOG_VERBOSE)
                .long(LOG_VERBOSE)
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable verbose output"),
            Arg::new(LOG_DEBUG)
                .long(LOG_DEBUG)
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug output"),
            Arg::new(LOG_QUIET)
                .long(LOG_QUIET)
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Disable explanatory output"),
        ]
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            level: string_value(matches, LOG_LEVEL),
            verbose: flag_value(matches, LOG_VERBOSE),
            debug: flag_value(matches, LOG_DEBUG),
            quiet: flag_value(matches, LOG_QUIET),
        }
    }

    pub fn validate(&self) -> Result<(), DeckhandError> {
        if self.quiet && (self.verbose || self.debug) {
            return Err(DeckhandError::LogOptions(
                "--log-quiet cannot be combined with --log-verbose or --log-debug".into(),
            ));
        }
        if self.level.is_some() && (self.quiet || self.verbose || self.debug) {
            return Err(DeckhandError::LogOptions(
                "--log-level cannot be combined with --log-quiet, --log-verbose or --log-debug"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Filter directive requested by these options, `None` when the current
    /// filter should stay as it is.
    pub fn directive(&self) -> Option<&str> {
        if let Some(level) = self.level.as_deref() {
            return Some(level);
        }
        if self.quiet {
            Some("error")
        } else if self.debug {
            Some("debug")
        } else if self.verbose {
            Some("info")
        } else {
            None
        }
    }
}

fn string_value(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .try_get_one::<String>(id)
        .ok()
        .flatten()
        .filter(|value| !value.is_empty())
        .cloned()
}

fn path_value(matches: &ArgMatches, id: &str) -> Option<PathBuf> {
    matches.try_get_one::<PathBuf>(id).ok().flatten().cloned()
}

fn flag_value(matches: &ArgMatches, id: &str) -> bool {
    matches
        .try_get_one::<bool>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

fn seconds_value(matches: &ArgMatches, id: &str) -> Duration {
    let seconds = matches
        .try_get_one::<u64>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(DEFAULT_PROGRESS_PERIOD_SECONDS);
    Duration::from_secs(seconds)
}
