//! Server and handler error types.

// Aliased so thiserror's syntactic `Backtrace` detection doesn't emit the
// nightly-only `Error::provide` impl (error_generic_member_access).
use std::backtrace::Backtrace as CapturedBacktrace;
use std::backtrace::Backtrace;

use thiserror::Error;

/// What a handler returns: `Ok(true)` means the response is complete and
/// dispatch stops; `Ok(false)` passes the request to the next module.
pub type HandlerResult = Result<bool, HandlerError>;

/// Lifecycle errors of the web server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server already started")]
    AlreadyStarted,

    #[error("server not started")]
    NotStarted,

    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
}

/// A fault raised inside a handler. Captures the backtrace at construction
/// so the dispatcher can embed it in the fixed 500 document.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub backtrace: CapturedBacktrace,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
