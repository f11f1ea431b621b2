//! Projection of the command tree onto clap and dispatch of the selected
//! command.

use std::ffi::OsString;

use clap::Command;
use tracing::debug;

use super::{CommandNode, Handler, Invocation, Outcome};

impl CommandNode {
    /// Build the clap command for this subtree.
    ///
    /// Groups without a handler of their own require a subcommand, so a
    /// successful parse always selects a runnable node.
    pub fn to_clap(&self) -> Command {
        let mut cmd = Command::new(self.name.clone()).args(self.args.iter().cloned());
        if let Some(about) = &self.about {
            cmd = cmd.about(about.clone());
        }
        if !self.children.is_empty() {
            cmd = cmd.subcommands(self.children.iter().map(CommandNode::to_clap));
            if self.handler.is_none() {
                cmd = cmd.subcommand_required(true).arg_required_else_help(true);
            }
        }
        cmd
    }
}

/// Result of parsing the command line against a tree.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// A runnable command was selected.
    Run(Resolved<'a>),
    /// Parsing ended the invocation (help, version or a usage error, already
    /// printed by clap).
    Done(Outcome),
}

/// A selected command, ready to run.
#[derive(Debug)]
pub struct Resolved<'a> {
    handler: &'a Handler,
    invocation: Invocation,
}

impl Resolved<'_> {
    pub fn path(&self) -> &[String] {
        self.invocation.path()
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub async fn run(self) -> Outcome {
        debug!(command = %self.invocation.command_line(), "Running command");
        self.handler.call(self.invocation).await
    }
}

/// Parse `argv` (program name first) against the tree rooted at `root`.
pub fn resolve<I, T>(root: &CommandNode, argv: I) -> Resolution<'_>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut cmd = root.to_clap();
    let matches = match cmd.try_get_matches_from_mut(argv) {
        Ok(matches) => matches,
        Err(err) => {
            let code = err.exit_code();
            if let Err(print_err) = err.print() {
                debug!("Unable to print usage error: {print_err}");
            }
            return Resolution::Done(if code == 0 {
                Outcome::Ok
            } else {
                Outcome::ExitWithCode(code)
            });
        }
    };

    let mut names = Vec::new();
    let mut selected = &matches;
    while let Some((name, sub)) = selected.subcommand() {
        names.push(name.to_string());
        selected = sub;
    }

    let mut path = vec![root.name.clone()];
    path.extend(names.iter().cloned());

    let Some(handler) = root.find(names.as_slice()).and_then(CommandNode::handler) else {
        return Resolution::Done(Outcome::Error(anyhow::anyhow!(
            "command {:?} is not runnable",
            path.join(" ")
        )));
    };

    let help = find_subcommand(&mut cmd, &names)
        .map(|sub| sub.render_help().to_string())
        .unwrap_or_default();

    Resolution::Run(Resolved {
        handler,
        invocation: Invocation::new(path, selected.clone(), help),
    })
}

/// Parse and run in one step.
pub async fn dispatch<I, T>(root: &CommandNode, argv: I) -> Outcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match resolve(root, argv) {
        Resolution::Run(resolved) => resolved.run().await,
        Resolution::Done(outcome) => outcome,
    }
}

fn find_subcommand<'c>(cmd: &'c mut Command, names: &[String]) -> Option<&'c mut Command> {
    match names.split_first() {
        None => Some(cmd),
        Some((first, rest)) => find_subcommand(cmd.find_subcommand_mut(first)?, rest),
    }
}
