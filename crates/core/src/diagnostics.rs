//! Chromium stderr diagnostics.
//!
//! Chromium logs errors to stderr in the shape `[PREFIX:file(line)] message`
//! (see <https://support.google.com/chrome/a/answer/6271282>). The scanner
//! consumes the stream line by line for the whole process lifetime,
//! forwarding structured [`Diagnostic`]s through a bounded channel and
//! dropping everything else.

use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use crate::error::Error;

static LOG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*:(.+)\((\d+)\)\]\s+(.+)").unwrap());

/// A structured error record parsed from a Chromium log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source file inside the Chromium tree, e.g. `socket_posix.cc`.
    pub file: String,
    /// Line number within `file`.
    pub line: u32,
    /// Message text after the bracketed prefix.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}): {}", self.file, self.line, self.message)
    }
}

/// Parses a single stderr line into a [`Diagnostic`].
///
/// Returns `None` for lines that do not match the Chromium log shape.
/// Stateless and re-entrant; the pattern is compiled once.
pub fn parse_line(line: &str) -> Option<Diagnostic> {
    let captures = LOG_LINE.captures(line)?;
    let line_number = captures[2].parse().ok()?;

    Some(Diagnostic {
        file: captures[1].to_string(),
        line: line_number,
        message: captures[3].to_string(),
    })
}

/// Sending half of the diagnostic channel.
///
/// The channel is bounded; when the consumer lags behind, the newest
/// event is dropped, the shared counter incremented, and a warning
/// logged. The scanner never blocks on a slow consumer.
#[derive(Clone)]
pub(crate) struct DiagnosticSender {
    tx: mpsc::Sender<Error>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticSender {
    pub(crate) fn report(&self, error: Error) {
        match self.tx.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(error)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "cr", %error, "diagnostic channel full, dropping event");
            }
            // Receiver gone: nobody is interested anymore.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

pub(crate) fn channel(
    capacity: usize,
    dropped: Arc<AtomicU64>,
) -> (DiagnosticSender, mpsc::Receiver<Error>) {
    let (tx, rx) = mpsc::channel(capacity);
    (DiagnosticSender { tx, dropped }, rx)
}

/// Scans a diagnostic stream until it is exhausted or closed.
///
/// Matching lines are reported as [`Error::Diagnostic`]; non-matching
/// lines are dropped (visible at `trace` level); a terminal read error
/// is forwarded verbatim. The stream is released on every exit path.
pub(crate) async fn scan<R>(stream: R, errors: DiagnosticSender)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Some(diagnostic) => errors.report(Error::Diagnostic(diagnostic)),
                None => trace!(target: "cr", %line, "unmatched stderr line"),
            },
            Ok(None) => break,
            Err(error) => {
                errors.report(Error::Io(error));
                break;
            }
        }
    }
}
