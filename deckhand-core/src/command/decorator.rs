//! Uniform pre/post-amble for every runnable command.
//!
//! Subcommand authors only write business logic. [`Decorator::decorate`]
//! walks an assembled tree breadth-first and replaces every raw handler with
//! a wrapper that performs, in order:
//!
//! 1. process initialization (tmp/home directories), failing fast;
//! 2. log option processing, printing the command help on failure;
//! 3. the fixed compatibility environment toggle;
//! 4. construction of the ambient services (kube initializer, registry
//!    client, action configuration);
//! 5. stub service values;
//! 6. the original handler;
//! 7. translation of a structured exit code into [`Outcome::ExitWithCode`].
//!
//! The concrete work behind steps 1-5 sits behind the [`Bootstrap`] trait so
//! the wrapping logic can be exercised without touching the real
//! environment. Names, arguments and children of decorated nodes are never
//! modified.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::FutureExt;
use tracing::{debug, info};

use super::{CommandNode, DecoratedFn, Handler, Invocation, Outcome, RunFn};
use crate::exit_code::extract_exit_code;
use crate::runtime::{ProcessPaths, Services, HELM3_MODE_ENV};

/// Work performed before a decorated command's business logic.
pub trait Bootstrap: Send + Sync {
    /// Global process initialization. Errors abort the command.
    fn init_process(&self, invocation: &Invocation) -> anyhow::Result<ProcessPaths>;

    /// Apply pending log options.
    fn apply_log_options(&self, invocation: &Invocation) -> anyhow::Result<()>;

    /// Set the environment toggle expected by downstream helm code.
    fn set_compat_env(&self) {
        std::env::set_var(HELM3_MODE_ENV, "1");
    }

    /// Construct the services handed to business logic.
    fn build_services(
        &self,
        invocation: &Invocation,
        paths: ProcessPaths,
    ) -> anyhow::Result<Services>;

    /// Populate stub values required before delegating to business logic.
    fn stub_service_values(
        &self,
        invocation: &Invocation,
        services: &mut Services,
    ) -> anyhow::Result<()>;
}

/// Summary of one decoration pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecorationReport {
    /// Paths of the nodes decorated by this pass, in visiting order.
    pub decorated: Vec<String>,
    /// Runnable nodes that were already decorated and left alone.
    pub already_decorated: usize,
}

pub struct Decorator {
    bootstrap: Arc<dyn Bootstrap>,
}

impl Decorator {
    pub fn new(bootstrap: impl Bootstrap + 'static) -> Self {
        Self {
            bootstrap: Arc::new(bootstrap),
        }
    }

    pub fn from_arc(bootstrap: Arc<dyn Bootstrap>) -> Self {
        Self { bootstrap }
    }

    /// Rewrite, in place, the handler of every runnable node under `root`
    /// (inclusive).
    ///
    /// Nodes whose handler is already decorated are skipped, so a second pass
    /// over the same tree decorates nothing.
    pub fn decorate(&self, root: &mut CommandNode) -> DecorationReport {
        let mut report = DecorationReport::default();
        let mut queue: VecDeque<(String, &mut CommandNode)> = VecDeque::new();
        queue.push_back((root.name.clone(), root));

        while let Some((path, node)) = queue.pop_front() {
            match node.handler.take() {
                Some(Handler::Raw(original)) => {
                    node.handler = Some(Handler::Decorated(self.wrap(original)));
                    report.decorated.push(path.clone());
                }
                Some(decorated @ Handler::Decorated(_)) => {
                    node.handler = Some(decorated);
                    report.already_decorated += 1;
                }
                None => {}
            }

            for child in node.children.iter_mut() {
                let child_path = format!("{path} {}", child.name);
                queue.push_back((child_path, child));
            }
        }

        info!(
            decorated = report.decorated.len(),
            skipped = report.already_decorated,
            "Command tree decorated"
        );
        report
    }

    fn wrap(&self, original: RunFn) -> DecoratedFn {
        let bootstrap = Arc::clone(&self.bootstrap);
        Arc::new(move |invocation| {
            let bootstrap = Arc::clone(&bootstrap);
            let original = Arc::clone(&original);
            async move { run_decorated(bootstrap.as_ref(), &original, invocation).await }.boxed()
        })
    }
}

async fn run_decorated(
    bootstrap: &dyn Bootstrap,
    original: &RunFn,
    mut invocation: Invocation,
) -> Outcome {
    let paths = match bootstrap.init_process(&invocation) {
        Ok(paths) => paths,
        Err(err) => return Outcome::Error(err),
    };

    if let Err(err) = bootstrap.apply_log_options(&invocation) {
        eprintln!("{}", invocation.help());
        return Outcome::Error(err);
    }

    bootstrap.set_compat_env();

    let mut services = match bootstrap.build_services(&invocation, paths) {
        Ok(services) => services,
        Err(err) => return Outcome::Error(err),
    };

    if let Err(err) = bootstrap.stub_service_values(&invocation, &mut services) {
        return Outcome::Error(err);
    }

    invocation.attach_services(services);
    let command = invocation.command_line();

    match original(invocation).await {
        Ok(()) => Outcome::Ok,
        Err(err) => match extract_exit_code(&err) {
            Some(code) => {
                debug!(command = %command, code, "Command requested exit code");
                Outcome::ExitWithCode(code)
            }
            None => Outcome::Error(err),
        },
    }
}
