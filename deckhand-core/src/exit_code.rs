//! Structured exit codes carried by errors.
//!
//! Business logic that needs a process exit status other than the generic
//! failure status returns an error that opts into [`ExitCodeCarrier`]. The
//! decorated command wrapper asks [`extract_exit_code`] whether the failure
//! carries such a code; nothing else in the error path has to know about it.
//!
//! A code of `0` is treated exactly like "no code present".

use std::error::Error as StdError;
use std::fmt;

use crate::error::DeckhandError;

/// Capability of an error value to request a specific process exit status.
pub trait ExitCodeCarrier {
    /// The requested exit status. `0` means "no preference".
    fn exit_code(&self) -> i32;
}

/// An error that carries an exit code alongside its message or source.
#[derive(Debug)]
pub struct CodedError {
    code: i32,
    message: String,
    source: Option<anyhow::Error>,
}

impl CodedError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach an exit code to an existing error. The message of the wrapped
    /// error is kept as this error's message.
    pub fn wrap(code: i32, source: anyhow::Error) -> Self {
        Self {
            code,
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CodedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl ExitCodeCarrier for CodedError {
    fn exit_code(&self) -> i32 {
        self.code
    }
}

impl ExitCodeCarrier for DeckhandError {
    fn exit_code(&self) -> i32 {
        match self {
            DeckhandError::Exit { code, .. } => *code,
            _ => 0,
        }
    }
}

/// Extension for tagging a failing `Result` with an exit code.
pub trait ExitCodeExt<T> {
    fn with_exit_code(self, code: i32) -> anyhow::Result<T>;
}

impl<T, E> ExitCodeExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn with_exit_code(self, code: i32) -> anyhow::Result<T> {
        self.map_err(|e| CodedError::wrap(code, e.into()).into())
    }
}

/// Returns the exit code requested by `err`, if any.
///
/// The cause chain is walked outermost first and the first error that carries
/// a code decides. A zero code yields `None`.
pub fn extract_exit_code(err: &anyhow::Error) -> Option<i32> {
    err.chain()
        .find_map(carried_code)
        .filter(|code| *code != 0)
}

fn carried_code(cause: &(dyn StdError + 'static)) -> Option<i32> {
    if let Some(coded) = cause.downcast_ref::<CodedError>() {
        return Some(coded.exit_code());
    }
    if let Some(err @ DeckhandError::Exit { .. }) = cause.downcast_ref::<DeckhandError>() {
        return Some(err.exit_code());
    }
    None
}
