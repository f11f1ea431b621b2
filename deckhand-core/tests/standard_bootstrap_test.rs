//! Decorated commands running with the real bootstrap.

mod common;

use std::path::PathBuf;

use anyhow::Result;
use common::StepLog;
use deckhand_core::command::{dispatch, CommandNode, Decorator, Outcome};
use deckhand_core::logging::LogControl;
use deckhand_core::runtime::{CommonOptions, StandardBootstrap};
use serial_test::serial;
use tempfile::tempdir;

fn tree(seen: &StepLog) -> CommandNode {
    let seen = seen.clone();
    let mut root = CommandNode::new("deckhand").args(CommonOptions::args()).subcommand(
        CommandNode::new("helm")
            .arg(CommonOptions::namespace_arg())
            .subcommand(CommandNode::new("get-namespace").run(move |invocation| {
                let seen = seen.clone();
                async move {
                    let services = invocation.require_services()?;
                    seen.push(services.action.namespace.clone());
                    seen.push(services.paths.tmp_dir.display().to_string());
                    seen.push(services.paths.home_dir.display().to_string());
                    let values = services.service_values().cloned().unwrap_or_default();
                    seen.push(values["global"]["deckhand"]["namespace"].to_string());
                    Ok(())
                }
            })),
    );
    Decorator::new(StandardBootstrap::new(LogControl::detached())).decorate(&mut root);
    root
}

fn argv(extra: &[&str]) -> Vec<String> {
    ["deckhand", "helm"]
        .iter()
        .chain(extra)
        .map(|s| s.to_string())
        .collect()
}

#[tokio::test]
#[serial]
async fn test_services_are_built_from_shared_flags() -> Result<()> {
    let dir = tempdir()?;
    let tmp = dir.path().join("tmp");
    let home = dir.path().join("home");
    let docker = dir.path().join("docker");
    std::fs::create_dir_all(&docker)?;
    std::fs::write(docker.join("config.json"), r#"{"auths":{"registry.example.com":{}}}"#)?;

    let seen = StepLog::default();
    let root = tree(&seen);
    let outcome = dispatch(
        &root,
        argv(&[
            "-n",
            "staging",
            "get-namespace",
            "--tmp-dir",
            tmp.to_str().unwrap(),
            "--home-dir",
            home.to_str().unwrap(),
            "--docker-config",
            docker.to_str().unwrap(),
        ]),
    )
    .await;

    assert!(outcome.is_ok(), "{outcome:?}");
    assert!(tmp.is_dir());
    assert!(home.is_dir());
    assert_eq!(
        seen.steps(),
        vec![
            "staging".to_string(),
            tmp.display().to_string(),
            home.display().to_string(),
            "\"staging\"".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_conflicting_log_options_fail() -> Result<()> {
    let dir = tempdir()?;
    let seen = StepLog::default();
    let root = tree(&seen);
    let home = dir.path().join("home");

    let outcome = dispatch(
        &root,
        argv(&[
            "get-namespace",
            "--home-dir",
            home.to_str().unwrap(),
            "--tmp-dir",
            dir.path().to_str().unwrap(),
            "--log-quiet",
            "--log-debug",
        ]),
    )
    .await;

    match outcome {
        Outcome::Error(err) => assert!(err.to_string().contains("--log-quiet"), "{err:#}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(seen.steps().is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_missing_docker_config_is_labelled() -> Result<()> {
    let dir = tempdir()?;
    let seen = StepLog::default();
    let root = tree(&seen);
    let missing: PathBuf = dir.path().join("no-docker");

    let outcome = dispatch(
        &root,
        argv(&[
            "get-namespace",
            "--home-dir",
            dir.path().join("home").to_str().unwrap(),
            "--tmp-dir",
            dir.path().to_str().unwrap(),
            "--docker-config",
            missing.to_str().unwrap(),
        ]),
    )
    .await;

    match outcome {
        Outcome::Error(err) => {
            assert!(err
                .to_string()
                .starts_with("unable to create helm registry client"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(seen.steps().is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_unwritable_home_fails_fast() -> Result<()> {
    let dir = tempdir()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "")?;
    let seen = StepLog::default();
    let root = tree(&seen);

    let outcome = dispatch(
        &root,
        argv(&[
            "get-namespace",
            "--home-dir",
            blocker.join("home").to_str().unwrap(),
            "--tmp-dir",
            dir.path().to_str().unwrap(),
        ]),
    )
    .await;

    assert_eq!(outcome.exit_code(), 1);
    assert!(seen.steps().is_empty());
    Ok(())
}
