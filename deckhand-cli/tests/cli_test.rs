//! End-to-end tests running the `deckhand` binary.

use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// A `deckhand` command isolated from the user's environment.
fn deckhand(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_deckhand"));
    cmd.env("HOME", home)
        .env_remove("DECKHAND_TELEMETRY")
        .env_remove("DECKHAND_TELEMETRY_LOG_FILE")
        .env_remove("DECKHAND_HELM3_MODE")
        .env_remove("DECKHAND_LOG_LEVEL")
        .env_remove("RUST_LOG")
        .env_remove("KUBECONFIG")
        .env_remove("KUBERNETES_SERVICE_HOST");
    cmd
}

/// Run with process directories inside `dir`.
fn run(dir: &TempDir, args: &[&str]) -> Result<Output> {
    let output = deckhand(dir.path())
        .args(args)
        .arg("--home-dir")
        .arg(dir.path().join("home"))
        .arg("--tmp-dir")
        .arg(dir.path().join("tmp"))
        .output()?;
    Ok(output)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_version_is_not_decorated() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(&dir, &["version"])?;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output).trim(), format!("v{}", env!("CARGO_PKG_VERSION")));
    assert!(!dir.path().join("home").exists());
    Ok(())
}

#[test]
fn test_decorated_command_prepares_directories() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(&dir, &["helm", "get-namespace"])?;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "default");
    assert!(dir.path().join("home").is_dir());
    assert!(dir.path().join("tmp").is_dir());
    Ok(())
}

#[test]
fn test_namespace_flag() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(&dir, &["helm", "-n", "production", "get-namespace"])?;
    assert_eq!(stdout(&output).trim(), "production");

    let output = run(&dir, &["helm", "get-namespace", "--namespace", "staging"])?;
    assert_eq!(stdout(&output).trim(), "staging");
    Ok(())
}

#[test]
fn test_env_sets_helm3_mode() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(&dir, &["helm", "env"])?;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).lines().any(|line| line == "DECKHAND_HELM3_MODE=1"));
    Ok(())
}

#[test]
fn test_env_reports_kube_and_registry_config() -> Result<()> {
    let dir = TempDir::new()?;
    let kube_config = dir.path().join("kubeconfig");
    std::fs::write(&kube_config, "apiVersion: v1\n")?;
    let docker_dir = dir.path().join("docker");
    std::fs::create_dir_all(&docker_dir)?;
    std::fs::write(
        docker_dir.join("config.json"),
        r#"{"auths": {"registry.example.com": {}, "ghcr.io": {}}}"#,
    )?;

    let output = run(
        &dir,
        &[
            "helm",
            "env",
            "--kube-config",
            kube_config.to_str().unwrap(),
            "--docker-config",
            docker_dir.to_str().unwrap(),
        ],
    )?;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines.contains(&format!("kube-config={}", kube_config.display()).as_str()), "{out}");
    assert!(lines.contains(&"registry-auths=ghcr.io,registry.example.com"), "{out}");

    let output = run(&dir, &["helm", "env"])?;
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(!stdout(&output).contains("kube-config="));
    Ok(())
}

#[test]
fn test_get_release() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(&dir, &["helm", "get-release", "--project", "shop", "--env", "prod"])?;
    assert_eq!(stdout(&output).trim(), "shop-prod");

    let output = run(&dir, &["helm", "get-release"])?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_autogenerated_values() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(&dir, &["helm", "-n", "qa", "get-autogenerated-values"])?;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("namespace: qa"), "{out}");
    assert!(out.contains("global:"), "{out}");
    Ok(())
}

#[test]
fn test_diff_detailed_exitcode() -> Result<()> {
    let dir = TempDir::new()?;
    let current = dir.path().join("current.yaml");
    let desired = dir.path().join("desired.yaml");
    std::fs::write(&current, "replicas: 1\nimage: web:1\n")?;
    std::fs::write(&desired, "replicas: 3\nimage: web:1\n")?;
    let (current, desired) = (current.to_str().unwrap(), desired.to_str().unwrap());

    let output = run(&dir, &["helm", "diff", current, desired, "--detailed-exitcode"])?;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout(&output), "- replicas: 1\n+ replicas: 3\n");
    assert!(!stderr(&output).contains("Error:"), "{}", stderr(&output));

    let output = run(&dir, &["helm", "diff", current, desired])?;
    assert_eq!(output.status.code(), Some(0));

    let output = run(&dir, &["helm", "diff", current, current, "--detailed-exitcode"])?;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "");
    Ok(())
}

#[test]
fn test_lint() -> Result<()> {
    let dir = TempDir::new()?;
    let chart = dir.path().join("chart");
    std::fs::create_dir_all(&chart)?;

    let output = run(&dir, &["helm", "lint", chart.to_str().unwrap()])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error: unable to read chart metadata"));

    std::fs::write(chart.join("Chart.yaml"), "apiVersion: v2\nname: web\nversion: 1.0.0\n")?;
    let output = run(&dir, &["helm", "lint", chart.to_str().unwrap()])?;
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).contains("1 chart(s) linted, 0 chart(s) failed"));
    Ok(())
}

#[test]
fn test_generate_secret_key() -> Result<()> {
    let dir = TempDir::new()?;
    let first = stdout(&run(&dir, &["helm", "secret", "generate-secret-key"])?);
    let second = stdout(&run(&dir, &["helm", "secret", "generate-secret-key"])?);

    assert_eq!(first.trim().len(), 32);
    assert!(first.trim().chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(first, second);
    Ok(())
}

#[test]
fn test_conflicting_log_options_print_help() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(&dir, &["helm", "get-namespace", "--log-quiet", "--log-verbose"])?;

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Usage:"), "{err}");
    assert!(err.contains("Error: invalid log options"), "{err}");
    assert!(stdout(&output).is_empty());
    Ok(())
}

#[test]
fn test_usage_errors() -> Result<()> {
    let dir = TempDir::new()?;
    assert_eq!(run(&dir, &["helm", "no-such-command"])?.status.code(), Some(2));
    assert_eq!(run(&dir, &["--help"])?.status.code(), Some(0));
    Ok(())
}

#[test]
fn test_telemetry_log_file() -> Result<()> {
    let dir = TempDir::new()?;
    let log = dir.path().join("telemetry.log");
    let output = deckhand(dir.path())
        .env("DECKHAND_TELEMETRY", "1")
        .env("DECKHAND_TELEMETRY_LOG_FILE", &log)
        .args(["helm", "get-namespace", "--home-dir"])
        .arg(dir.path().join("home"))
        .arg("--tmp-dir")
        .arg(dir.path().join("tmp"))
        .output()?;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let content = std::fs::read_to_string(&log)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2, "{content}");
    assert!(lines[0].ends_with("Telemetry: command \"deckhand helm get-namespace\" started"));
    assert!(lines[1].ends_with("exited with code 0"));
    Ok(())
}

#[test]
fn test_unopenable_telemetry_log_does_not_fail_command() -> Result<()> {
    let dir = TempDir::new()?;
    let output = deckhand(dir.path())
        .env("DECKHAND_TELEMETRY", "1")
        .env("DECKHAND_TELEMETRY_LOG_FILE", dir.path().join("missing").join("t.log"))
        .args(["version"])
        .output()?;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    Ok(())
}
