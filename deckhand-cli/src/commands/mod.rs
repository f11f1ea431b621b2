//! Command tree assembly.
//!
//! Commands here only hold business logic. Shared initialization is added
//! afterwards by decorating the tree.

pub mod helm;

use deckhand_core::command::CommandNode;
use deckhand_core::runtime::CommonOptions;

pub const ROOT: &str = "deckhand";

pub fn build_tree() -> CommandNode {
    CommandNode::new(ROOT)
        .about("Application deployment with helm")
        .args(CommonOptions::args())
        .subcommand(version())
        .subcommand(helm::command())
}

fn version() -> CommandNode {
    CommandNode::new("version")
        .about("Print version")
        .run(|_invocation| async {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        })
}
