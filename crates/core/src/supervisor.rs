//! Chromium process supervision.
//!
//! [`Chromium`] owns the browser subprocess, its user data directory and
//! the observed remote-debugging port. `start` resolves the readiness
//! race: the process is spawned with stderr scanned concurrently and a
//! filesystem watch on the data directory, then the first of marker
//! file, watcher error, diagnostic error, process exit, or timeout
//! decides the outcome.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::diagnostics;
use crate::error::{Error, Result};
use crate::flag::{Flag, merge};
use crate::readiness;

/// File Chromium writes into the user data directory once the remote
/// debugging endpoint is live; its first line is the bound port.
const READY_MARKER: &str = "DevToolsActivePort";

/// Capacity of the diagnostic channel; overflow drops the newest event.
const DIAGNOSTIC_BUFFER: usize = 32;

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);

/// The user data directory backing a running process.
///
/// A supervisor-allocated temp dir is removed on cleanup; a
/// caller-supplied directory is left in place.
enum DataDir {
    Temp(TempDir),
    Explicit(PathBuf),
}

impl DataDir {
    fn path(&self) -> &Path {
        match self {
            DataDir::Temp(dir) => dir.path(),
            DataDir::Explicit(path) => path,
        }
    }

    fn cleanup(self) {
        if let DataDir::Temp(dir) = self {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(target: "cr", path = %path.display(), "removed user data directory"),
                Err(error) => {
                    warn!(target: "cr", path = %path.display(), %error, "failed to remove user data directory");
                }
            }
        }
    }
}

/// Configures and builds a [`Chromium`] supervisor.
///
/// All configuration flows through the flag list; the convenience
/// methods are shorthand for the corresponding [`Flag`] constructors.
#[derive(Debug)]
pub struct ChromiumBuilder {
    path: PathBuf,
    flags: Vec<Flag>,
    start_timeout: Duration,
}

impl ChromiumBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flags: Vec::new(),
            start_timeout: DEFAULT_START_TIMEOUT,
        }
    }

    /// Adds a single flag.
    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    /// Adds several flags in order.
    pub fn flags(mut self, flags: impl IntoIterator<Item = Flag>) -> Self {
        self.flags.extend(flags);
        self
    }

    /// Address the debugging endpoint binds; defaults to loopback.
    pub fn debugging_address(self, addr: std::net::IpAddr) -> Self {
        self.flag(Flag::remote_debugging_address(addr))
    }

    /// Port the debugging endpoint binds; defaults to 0, meaning any
    /// available port, discovered through the marker file.
    pub fn debugging_port(self, port: u16) -> Self {
        self.flag(Flag::remote_debugging_port(port))
    }

    /// Uses an existing user data directory instead of a fresh temp dir.
    ///
    /// The directory is created if missing and never removed on stop.
    pub fn user_data_dir(self, dir: impl AsRef<Path>) -> Self {
        self.flag(Flag::user_data_dir(dir))
    }

    /// Initial window size.
    pub fn window_size(self, width: u32, height: u32) -> Self {
        self.flag(Flag::window_size(width, height))
    }

    /// Bounds the whole readiness race; defaults to 30 seconds.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn build(self) -> Chromium {
        // A caller-requested fixed port is reportable before start,
        // whatever value type spelled it.
        let port = self
            .flags
            .iter()
            .find(|flag| flag.key == "remote-debugging-port")
            .and_then(|flag| flag.value.text())
            .and_then(|text| text.trim().parse::<u16>().ok())
            .filter(|port| *port > 0);

        Chromium {
            path: self.path,
            flags: self.flags,
            start_timeout: self.start_timeout,
            data_dir: None,
            child: None,
            port,
            errors: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// A supervised headless Chromium process.
///
/// Single-writer by construction: `start`, `stop` and `wait` take
/// `&mut self`, so concurrent invocation on one instance is rejected at
/// compile time. After `stop` or `wait` the instance is reusable; a
/// fresh temp data directory is allocated on the next `start` unless an
/// explicit one was configured.
pub struct Chromium {
    path: PathBuf,
    flags: Vec<Flag>,
    start_timeout: Duration,
    data_dir: Option<DataDir>,
    child: Option<Child>,
    port: Option<u16>,
    errors: Option<mpsc::Receiver<Error>>,
    dropped: Arc<AtomicU64>,
}

impl Chromium {
    /// Creates a supervisor for the binary at `path` with defaults:
    /// ephemeral debugging port on loopback, fresh temp data directory,
    /// 30 second start timeout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ChromiumBuilder::new(path).build()
    }

    pub fn builder(path: impl Into<PathBuf>) -> ChromiumBuilder {
        ChromiumBuilder::new(path)
    }

    /// Path to the Chromium binary.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The port of the remote debugging endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPortAssigned`] when an ephemeral port was
    /// requested and startup has not resolved it yet.
    pub fn port(&self) -> Result<u16> {
        match self.port {
            Some(port) if port != 0 => Ok(port),
            _ => Err(Error::NoPortAssigned),
        }
    }

    /// The user data directory of the running process.
    pub fn data_dir(&self) -> Result<&Path> {
        self.data_dir
            .as_ref()
            .map(DataDir::path)
            .ok_or(Error::NotRunning)
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Claims the asynchronous error channel.
    ///
    /// Available once per start, after `start` has returned
    /// successfully. Diagnostics parsed from stderr while the process
    /// runs are delivered here; they never surface from other calls.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<Error>> {
        self.errors.take()
    }

    /// Number of diagnostic events dropped because the error channel
    /// was full, since the last `start`.
    pub fn dropped_diagnostics(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Starts the process and blocks until its debugging endpoint is
    /// ready, returning the bound port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the process is running.
    /// Any startup failure (watch registration, spawn, a diagnostic or
    /// watcher error during the race, early process exit, timeout)
    /// kills the spawned process, removes an owned data directory, and
    /// leaves the supervisor idle.
    pub async fn start(&mut self) -> Result<u16> {
        if self.child.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let data_dir = self.resolve_data_dir().await?;

        let defaults = vec![
            Flag::user_data_dir(data_dir.path()),
            Flag::remote_debugging_address(std::net::Ipv4Addr::LOCALHOST.into()),
            Flag::remote_debugging_port(0),
        ];
        // Headless operation is non-negotiable; appended last so a
        // caller-supplied duplicate cannot suppress it.
        let mandatory = vec![
            Flag::switch("headless"),
            Flag::switch("disable-gpu"),
            Flag::switch("no-sandbox"),
        ];
        let flags = merge(defaults, self.flags.clone(), mandatory);

        let args: Vec<String> = flags
            .iter()
            .map(Flag::render)
            .filter(|arg| !arg.is_empty())
            .collect();

        // Watch before spawning so the marker file cannot appear in the
        // window between process start and watch registration.
        let mut watch = match readiness::watch(data_dir.path()) {
            Ok(watch) => watch,
            Err(error) => {
                data_dir.cleanup();
                return Err(error);
            }
        };

        info!(target: "cr", path = %self.path.display(), ?args, "spawning chromium");

        let mut command = Command::new(&self.path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                drop(watch);
                data_dir.cleanup();
                return Err(error.into());
            }
        };

        let Some(stderr) = child.stderr.take() else {
            Self::kill_quietly(&mut child).await;
            drop(watch);
            data_dir.cleanup();
            return Err(Error::Io(io::Error::other("chromium stderr pipe unavailable")));
        };

        // The scanner runs for the whole process lifetime, not just the
        // readiness race.
        self.dropped.store(0, Ordering::Relaxed);
        let (diagnostics_tx, mut diagnostics_rx) =
            diagnostics::channel(DIAGNOSTIC_BUFFER, self.dropped.clone());
        tokio::spawn(diagnostics::scan(stderr, diagnostics_tx));

        let raced = tokio::time::timeout(
            self.start_timeout,
            Self::await_readiness(&mut child, &mut watch, &mut diagnostics_rx),
        )
        .await;

        let port = match raced {
            Ok(Ok(port)) => port,
            Ok(Err(error)) => {
                Self::kill_quietly(&mut child).await;
                drop(watch);
                data_dir.cleanup();
                return Err(error);
            }
            Err(_elapsed) => {
                Self::kill_quietly(&mut child).await;
                drop(watch);
                data_dir.cleanup();
                return Err(Error::StartupTimeout {
                    timeout: self.start_timeout,
                });
            }
        };

        // Readiness resolved; release the watch immediately.
        drop(watch);

        info!(target: "cr", port, "chromium debugging endpoint ready");

        self.data_dir = Some(data_dir);
        self.child = Some(child);
        self.port = Some(port);
        self.errors = Some(diagnostics_rx);

        Ok(port)
    }

    /// Forcibly terminates the process.
    ///
    /// Cleanup (data directory removal, state reset) runs even when
    /// termination fails, and the termination error is still returned.
    pub async fn stop(&mut self) -> Result<()> {
        let child = self.child.as_mut().ok_or(Error::NotRunning)?;
        debug!(target: "cr", "stopping chromium");

        // The child stays in place until the kill resolves, so a
        // cancelled stop leaves the supervisor consistent.
        let killed = child.kill().await;
        self.child = None;
        self.cleanup();

        killed?;
        Ok(())
    }

    /// Blocks until the process exits naturally, then performs the same
    /// cleanup as [`Chromium::stop`].
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let child = self.child.as_mut().ok_or(Error::NotRunning)?;

        // Cancel safe: until the exit is observed the child remains
        // owned, so callers may race `wait` against a shutdown signal
        // and still `stop` afterwards.
        let status = child.wait().await;
        self.child = None;
        self.cleanup();

        Ok(status?)
    }

    /// Starts the process and waits for it to finish.
    pub async fn run(&mut self) -> Result<ExitStatus> {
        self.start().await?;
        self.wait().await
    }

    /// Multi-source wait resolving startup: first ready source wins.
    async fn await_readiness(
        child: &mut Child,
        watch: &mut readiness::ReadinessWatch,
        diagnostics: &mut mpsc::Receiver<Error>,
    ) -> Result<u16> {
        let mut diagnostics_open = true;

        loop {
            tokio::select! {
                event = watch.events.recv() => match event {
                    Some(event) if event.name == READY_MARKER => {
                        if let Some(port) = Self::read_marker_port(&event.path).await {
                            return Ok(port);
                        }
                        // Marker not fully written yet; the flush will
                        // fire another modify event.
                        debug!(target: "cr", path = %event.path.display(), "marker file not yet parsable");
                    }
                    Some(_) => {}
                    None => {
                        return Err(Error::Watch(notify::Error::generic(
                            "watch event channel closed",
                        )));
                    }
                },
                error = watch.errors.recv() => match error {
                    Some(error) => return Err(Error::Watch(error)),
                    None => {
                        return Err(Error::Watch(notify::Error::generic(
                            "watch error channel closed",
                        )));
                    }
                },
                error = diagnostics.recv(), if diagnostics_open => match error {
                    Some(error) => return Err(error),
                    // Scanner ended (stream closed); the child exit arm
                    // will observe the death.
                    None => diagnostics_open = false,
                },
                status = child.wait() => {
                    return Err(Error::EarlyExit { status: status? });
                }
            }
        }
    }

    async fn read_marker_port(path: &Path) -> Option<u16> {
        let contents = tokio::fs::read_to_string(path).await.ok()?;
        contents.lines().next()?.trim().parse().ok()
    }

    async fn kill_quietly(child: &mut Child) {
        if let Err(error) = child.kill().await {
            warn!(target: "cr", %error, "failed to kill chromium during startup rollback");
        }
    }

    async fn resolve_data_dir(&self) -> Result<DataDir> {
        match self
            .flags
            .iter()
            .find(|flag| flag.key == "user-data-dir")
            .and_then(|flag| flag.value.text())
        {
            Some(dir) => {
                let path = PathBuf::from(dir);
                tokio::fs::create_dir_all(&path).await?;
                Ok(DataDir::Explicit(path))
            }
            None => {
                let dir = tempfile::Builder::new().prefix("chromium-").tempdir()?;
                Ok(DataDir::Temp(dir))
            }
        }
    }

    fn cleanup(&mut self) {
        if let Some(data_dir) = self.data_dir.take() {
            data_dir.cleanup();
        }
        self.errors = None;
    }
}
