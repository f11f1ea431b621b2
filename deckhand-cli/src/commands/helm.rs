//! `deckhand helm` commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction};
use deckhand_core::command::{CommandNode, Invocation};
use deckhand_core::runtime::{CommonOptions, HELM3_MODE_ENV};
use deckhand_core::CodedError;
use serde::Deserialize;
use tracing::debug;

pub const NAME: &str = "helm";

/// Exit status of `diff --detailed-exitcode` when the inputs differ.
const DIFF_CHANGES_EXIT_CODE: i32 = 2;

const SECRET_KEY_BYTES: usize = 16;

pub fn command() -> CommandNode {
    CommandNode::new(NAME)
        .about("Manage application deployment with helm")
        .arg(CommonOptions::namespace_arg())
        .subcommand(
            CommandNode::new("get-namespace")
                .about("Print the namespace used for release operations")
                .run(get_namespace),
        )
        .subcommand(
            CommandNode::new("get-release")
                .about("Print the release name for a project and environment")
                .arg(
                    Arg::new("project")
                        .long("project")
                        .value_name("NAME")
                        .required(true)
                        .help("Project name"),
                )
                .arg(
                    Arg::new("env")
                        .long("env")
                        .value_name("ENV")
                        .help("Environment name"),
                )
                .run(get_release),
        )
        .subcommand(
            CommandNode::new("get-autogenerated-values")
                .about("Print the service values passed to chart rendering")
                .run(get_autogenerated_values),
        )
        .subcommand(
            CommandNode::new("env")
                .about("Print the environment prepared for helm")
                .run(env),
        )
        .subcommand(
            CommandNode::new("lint")
                .about("Examine a chart for possible issues")
                .arg(
                    Arg::new("chart")
                        .value_name("CHART")
                        .value_parser(value_parser!(PathBuf))
                        .default_value(".")
                        .help("Chart directory"),
                )
                .run(lint),
        )
        .subcommand(
            CommandNode::new("diff")
                .about("Show differences between two rendered manifests")
                .arg(
                    Arg::new("current")
                        .value_name("CURRENT")
                        .value_parser(value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("desired")
                        .value_name("DESIRED")
                        .value_parser(value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("detailed-exitcode")
                        .long("detailed-exitcode")
                        .action(ArgAction::SetTrue)
                        .help("Return exit code 2 when there are changes"),
                )
                .run(diff),
        )
        .subcommand(
            CommandNode::new("secret")
                .about("Work with secrets")
                .subcommand(
                    CommandNode::new("generate-secret-key")
                        .about("Generate a hex encoded secret key")
                        .run(generate_secret_key),
                ),
        )
}

async fn get_namespace(invocation: Invocation) -> Result<()> {
    let services = invocation.require_services()?;
    println!("{}", services.action.namespace);
    Ok(())
}

async fn get_release(invocation: Invocation) -> Result<()> {
    let matches = invocation.matches();
    let project = matches
        .get_one::<String>("project")
        .context("--project is required")?;
    let release = release_name(project, matches.get_one::<String>("env").map(String::as_str));
    println!("{release}");
    Ok(())
}

fn release_name(project: &str, env: Option<&str>) -> String {
    match env.filter(|env| !env.is_empty()) {
        Some(env) => format!("{project}-{env}"),
        None => project.to_string(),
    }
}

async fn get_autogenerated_values(invocation: Invocation) -> Result<()> {
    let services = invocation.require_services()?;
    let values = services
        .service_values()
        .context("service values were not prepared")?;
    print!("{}", serde_yaml_ng::to_string(values)?);
    Ok(())
}

async fn env(invocation: Invocation) -> Result<()> {
    let services = invocation.require_services()?;
    let helm3_mode = std::env::var(HELM3_MODE_ENV).unwrap_or_default();
    println!("{HELM3_MODE_ENV}={helm3_mode}");
    println!("tmp-dir={}", services.paths.tmp_dir.display());
    println!("home-dir={}", services.paths.home_dir.display());
    println!("namespace={}", services.action.namespace);
    if let Some(context) = &services.options.kube.context {
        println!("kube-context={context}");
    }
    match services.kube.init() {
        Ok(config) => println!("kube-config={}", config.source),
        Err(err) => debug!("Kube config unavailable: {err}"),
    }
    if let Some(file) = services.registry.config_file() {
        println!("registry-config={}", file.display());
        println!("registry-auths={}", services.registry.authenticated_hosts().join(","));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMetadata {
    api_version: Option<String>,
    name: Option<String>,
    version: Option<String>,
}

async fn lint(invocation: Invocation) -> Result<()> {
    let chart_dir = invocation
        .matches()
        .get_one::<PathBuf>("chart")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    println!("==> Linting {}", chart_dir.display());

    let problems = lint_chart(&chart_dir)?;
    if !problems.is_empty() {
        for problem in &problems {
            println!("[ERROR] Chart.yaml: {problem}");
        }
        bail!("1 chart(s) linted, 1 chart(s) failed");
    }
    println!("1 chart(s) linted, 0 chart(s) failed");
    Ok(())
}

fn lint_chart(chart_dir: &Path) -> Result<Vec<String>> {
    let chart_file = chart_dir.join("Chart.yaml");
    let content = std::fs::read_to_string(&chart_file)
        .with_context(|| format!("unable to read chart metadata {}", chart_file.display()))?;
    let metadata: ChartMetadata = serde_yaml_ng::from_str(&content)
        .with_context(|| format!("unable to parse {}", chart_file.display()))?;
    debug!(?metadata, "Loaded chart metadata");

    let mut problems = Vec::new();
    match metadata.api_version.as_deref() {
        None | Some("") => problems.push("apiVersion is required".to_string()),
        Some("v1" | "v2") => {}
        Some(other) => problems.push(format!("apiVersion {other:?} is not supported")),
    }
    if metadata.name.as_deref().map_or(true, str::is_empty) {
        problems.push("name is required".to_string());
    }
    if metadata.version.as_deref().map_or(true, str::is_empty) {
        problems.push("version is required".to_string());
    }
    Ok(problems)
}

async fn diff(invocation: Invocation) -> Result<()> {
    let matches = invocation.matches();
    let (Some(current), Some(desired)) = (
        matches.get_one::<PathBuf>("current"),
        matches.get_one::<PathBuf>("desired"),
    ) else {
        bail!("both CURRENT and DESIRED are required");
    };

    let current_text = std::fs::read_to_string(current)
        .with_context(|| format!("unable to read {}", current.display()))?;
    let desired_text = std::fs::read_to_string(desired)
        .with_context(|| format!("unable to read {}", desired.display()))?;

    let changes = line_changes(&current_text, &desired_text);
    for change in &changes {
        println!("{change}");
    }

    if !changes.is_empty() && matches.get_flag("detailed-exitcode") {
        return Err(CodedError::new(
            DIFF_CHANGES_EXIT_CODE,
            format!("{} line(s) changed", changes.len()),
        )
        .into());
    }
    Ok(())
}

/// Lines removed (`-`) and added (`+`), compared as multisets.
fn line_changes(current: &str, desired: &str) -> Vec<String> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for line in current.lines() {
        *counts.entry(line).or_default() += 1;
    }
    for line in desired.lines() {
        *counts.entry(line).or_default() -= 1;
    }

    let mut changes = Vec::new();
    for line in current.lines() {
        if let Some(count) = counts.get_mut(line) {
            if *count > 0 {
                *count -= 1;
                changes.push(format!("- {line}"));
            }
        }
    }
    for line in desired.lines() {
        if let Some(count) = counts.get_mut(line) {
            if *count < 0 {
                *count += 1;
                changes.push(format!("+ {line}"));
            }
        }
    }
    changes
}

async fn generate_secret_key(_invocation: Invocation) -> Result<()> {
    println!("{}", secret_key());
    Ok(())
}

/// Hex encoded bytes from the thread-local CSPRNG.
fn secret_key() -> String {
    let key: [u8; SECRET_KEY_BYTES] = rand::random();
    hex::encode(key)
}
