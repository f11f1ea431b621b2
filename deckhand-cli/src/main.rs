//! deckhand - application deployment with helm
//!
//! Entry point: installs logging, starts telemetry, decorates the helm
//! command group and dispatches. This is the only place the process exits.

use std::time::{Duration, Instant};

use deckhand_core::command::{resolve, Decorator, Outcome, Resolution};
use deckhand_core::logging::init_logging;
use deckhand_core::runtime::StandardBootstrap;
use deckhand_core::telemetry::{self, TelemetryEvent, TelemetryOptions};
use deckhand_core::telemetry_log;
use tracing::{debug, warn};

mod commands;

const TELEMETRY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let log = init_logging();

    let options = TelemetryOptions::from_env()
        .with_error_handler(|err| debug!("Telemetry error: {err:#}"));
    if let Err(err) = telemetry::init(options).await {
        warn!("Telemetry disabled: {err:#}");
    }

    let mut root = commands::build_tree();
    if let Some(helm) = root.child_mut(commands::helm::NAME) {
        Decorator::new(StandardBootstrap::new(log)).decorate(helm);
    }

    let outcome = match resolve(&root, std::env::args_os()) {
        Resolution::Done(outcome) => outcome,
        Resolution::Run(resolved) => {
            let path = resolved.path().to_vec();
            telemetry::emit(TelemetryEvent::command_started(&path));
            telemetry_log!("command {:?} started", path.join(" "));

            let started = Instant::now();
            let outcome = resolved.run().await;
            let code = outcome.exit_code();

            telemetry::emit(TelemetryEvent::command_exited(&path, code, started.elapsed()));
            telemetry_log!("command {:?} exited with code {}", path.join(" "), code);
            outcome
        }
    };

    if let Err(err) = telemetry::shutdown(TELEMETRY_SHUTDOWN_TIMEOUT).await {
        telemetry::handle_error(&err);
    }

    match outcome {
        Outcome::Ok => 0,
        Outcome::ExitWithCode(code) => code,
        Outcome::Error(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    }
}
