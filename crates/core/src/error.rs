//! Error types for Chromium process supervision.

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Result type alias for supervision operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while supervising a Chromium process.
#[derive(Debug, Error)]
pub enum Error {
    /// `start` was called while the process is already running.
    #[error("chromium: process is already running")]
    AlreadyRunning,

    /// `stop` or `wait` was called without a running process.
    #[error("chromium: process is not running")]
    NotRunning,

    /// The debugging port was read before startup resolved it.
    #[error("chromium: no port assigned to process")]
    NoPortAssigned,

    /// A structured error parsed from the Chromium stderr stream.
    ///
    /// Surfaced from `start` when it arrives during the readiness race,
    /// otherwise delivered through the asynchronous error channel.
    #[error("chromium: {}", .0.message)]
    Diagnostic(Diagnostic),

    /// The filesystem watch on the user data directory failed.
    #[error("data directory watch failed: {0}")]
    Watch(#[from] notify::Error),

    /// The process exited before its debugging endpoint came up.
    #[error("chromium exited during startup: {status}")]
    EarlyExit { status: ExitStatus },

    /// The readiness race did not resolve within the start timeout.
    #[error("timed out after {}ms waiting for the debugging endpoint", .timeout.as_millis())]
    StartupTimeout { timeout: Duration },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the parsed diagnostic if this is a [`Error::Diagnostic`].
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Error::Diagnostic(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }

    /// Returns true if this error indicates startup did not resolve in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::StartupTimeout { .. })
    }
}
