//! Command tree model.
//!
//! A [`CommandNode`] tree is assembled once by the CLI (names, arguments,
//! children and raw handlers), rewritten in place by the
//! [`Decorator`](decorator::Decorator), projected onto clap for parsing and
//! finally dispatched. Handlers never exit the process themselves: they
//! report an [`Outcome`] and the entry point turns it into an exit status.

pub mod decorator;
pub mod dispatch;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use clap::{Arg, ArgMatches};
use futures::future::{BoxFuture, FutureExt};

use crate::runtime::Services;

pub use decorator::{Bootstrap, DecorationReport, Decorator};
pub use dispatch::{dispatch, resolve, Resolution, Resolved};

/// Business logic of a command as written by its author.
pub type RunFn = Arc<dyn Fn(Invocation) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A handler after decoration.
pub type DecoratedFn = Arc<dyn Fn(Invocation) -> BoxFuture<'static, Outcome> + Send + Sync>;

/// Result of running a command.
#[must_use]
#[derive(Debug)]
pub enum Outcome {
    /// The command succeeded.
    Ok,
    /// The command asked for a specific, non-zero process exit status.
    ExitWithCode(i32),
    /// The command failed without a structured exit code.
    Error(anyhow::Error),
}

impl Outcome {
    /// Convert to exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::ExitWithCode(code) => *code,
            Outcome::Error(_) => 1,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

impl From<anyhow::Result<()>> for Outcome {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Outcome::Ok,
            Err(err) => Outcome::Error(err),
        }
    }
}

/// Execution function attached to a runnable node.
#[derive(Clone)]
pub enum Handler {
    Raw(RunFn),
    Decorated(DecoratedFn),
}

impl Handler {
    pub async fn call(&self, invocation: Invocation) -> Outcome {
        match self {
            Handler::Raw(run) => run(invocation).await.into(),
            Handler::Decorated(run) => run(invocation).await,
        }
    }

    pub fn is_decorated(&self) -> bool {
        matches!(self, Handler::Decorated(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Raw(_) => f.write_str("Handler::Raw"),
            Handler::Decorated(_) => f.write_str("Handler::Decorated"),
        }
    }
}

/// Everything a handler gets when its command is selected.
#[derive(Debug, Clone)]
pub struct Invocation {
    path: Vec<String>,
    matches: ArgMatches,
    help: String,
    services: Option<Arc<Services>>,
}

impl Invocation {
    pub fn new(path: Vec<String>, matches: ArgMatches, help: String) -> Self {
        Self {
            path,
            matches,
            help,
            services: None,
        }
    }

    /// Command path from the root, e.g. `["deckhand", "helm", "lint"]`.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Space separated command path.
    pub fn command_line(&self) -> String {
        self.path.join(" ")
    }

    /// Matched arguments of the selected command, global arguments included.
    pub fn matches(&self) -> &ArgMatches {
        &self.matches
    }

    /// Rendered help text of the selected command.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Services built by the decorator. `None` for undecorated commands.
    pub fn services(&self) -> Option<&Arc<Services>> {
        self.services.as_ref()
    }

    /// Like [`Invocation::services`] but fails for undecorated commands.
    pub fn require_services(&self) -> anyhow::Result<&Arc<Services>> {
        self.services.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "command {:?} requires runtime services but was not decorated",
                self.command_line()
            )
        })
    }

    pub fn attach_services(&mut self, services: Services) {
        self.services = Some(Arc::new(services));
    }
}

/// A node of the command tree.
pub struct CommandNode {
    name: String,
    about: Option<String>,
    args: Vec<Arg>,
    handler: Option<Handler>,
    children: Vec<CommandNode>,
}

impl CommandNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: None,
            args: Vec::new(),
            handler: None,
            children: Vec::new(),
        }
    }

    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
        self.args.extend(args);
        self
    }

    /// Attach the raw execution function.
    pub fn run<F, Fut>(mut self, run: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handler = Some(Handler::Raw(Arc::new(move |invocation| {
            run(invocation).boxed()
        })));
        self
    }

    pub fn subcommand(mut self, child: CommandNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn subcommands(mut self, children: impl IntoIterator<Item = CommandNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn about_text(&self) -> Option<&str> {
        self.about.as_deref()
    }

    pub fn arg_ids(&self) -> Vec<String> {
        self.args.iter().map(|arg| arg.get_id().to_string()).collect()
    }

    pub fn children(&self) -> &[CommandNode] {
        &self.children
    }

    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    pub fn is_runnable(&self) -> bool {
        self.handler.is_some()
    }

    pub fn is_decorated(&self) -> bool {
        self.handler.as_ref().is_some_and(Handler::is_decorated)
    }

    pub fn child(&self, name: &str) -> Option<&CommandNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut CommandNode> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    /// Follow a path of child names starting below this node.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&CommandNode> {
        match path.split_first() {
            None => Some(self),
            Some((first, rest)) => self.child(first.as_ref())?.find(rest),
        }
    }

    /// Visit every node breadth-first, yielding the space separated path.
    pub fn walk(&self) -> Vec<(String, &CommandNode)> {
        let mut visited = Vec::new();
        let mut queue = std::collections::VecDeque::from([(self.name.clone(), self)]);
        while let Some((path, node)) = queue.pop_front() {
            for child in &node.children {
                queue.push_back((format!("{path} {}", child.name), child));
            }
            visited.push((path, node));
        }
        visited
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("name", &self.name)
            .field("args", &self.arg_ids())
            .field("handler", &self.handler)
            .field("children", &self.children)
            .finish()
    }
}
