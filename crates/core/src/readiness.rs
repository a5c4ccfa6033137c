//! Startup readiness watch on the user data directory.
//!
//! Chromium writes a `DevToolsActivePort` file into its user data
//! directory once the remote debugging endpoint is live. During startup
//! the supervisor watches the directory for that file; the watch is torn
//! down as soon as the readiness race resolves, either way.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::Result;

/// A filesystem entry created or modified under the watched directory.
#[derive(Debug, Clone)]
pub(crate) struct WatchEvent {
    /// Final path component.
    pub name: String,
    /// Full path of the entry.
    pub path: PathBuf,
}

/// A live, non-recursive watch on a single directory.
///
/// Dropping the value stops the notify dispatch thread and releases the
/// OS watch; the supervisor does so the moment startup resolves.
pub(crate) struct ReadinessWatch {
    _watcher: RecommendedWatcher,
    pub events: mpsc::Receiver<WatchEvent>,
    pub errors: mpsc::Receiver<notify::Error>,
}

/// Establishes a watch for created or modified entries under `dir`.
pub(crate) fn watch(dir: &Path) -> Result<ReadinessWatch> {
    let (event_tx, events) = mpsc::channel(16);
    let (error_tx, errors) = mpsc::channel(4);

    // notify callbacks run on a notify-internal thread; forward into
    // tokio channels and process on the async executor.
    let mut watcher = RecommendedWatcher::new(
        move |result: std::result::Result<Event, notify::Error>| match result {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                        continue;
                    };
                    let event = WatchEvent {
                        name: name.to_string(),
                        path: path.clone(),
                    };
                    let _ = event_tx.blocking_send(event);
                }
            }
            Err(error) => {
                let _ = error_tx.blocking_send(error);
            }
        },
        Config::default().with_poll_interval(Duration::from_millis(20)),
    )?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    Ok(ReadinessWatch {
        _watcher: watcher,
        events,
        errors,
    })
}
