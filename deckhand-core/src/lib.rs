//! Deckhand core library exports

pub mod command;
pub mod error;
pub mod exit_code;
pub mod logging;
pub mod runtime;
pub mod telemetry;

pub use command::{CommandNode, Decorator, Handler, Invocation, Outcome};
pub use error::DeckhandError;
pub use exit_code::{extract_exit_code, CodedError, ExitCodeCarrier, ExitCodeExt};
