//! End-to-end supervisor tests against mock browser executables.
//!
//! Each test writes a small shell script standing in for the Chromium
//! binary: it parses `--user-data-dir` from its arguments and plays out
//! one startup scenario (write the marker, log an error, crash, hang).

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cr::{Chromium, Error};
use tempfile::TempDir;

/// Shell fragment extracting the user data dir and requested port from
/// the argument list, the way Chromium would (last occurrence wins).
const PARSE_ARGS: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --user-data-dir=*) dir="${arg#--user-data-dir=}" ;;
    --remote-debugging-port=*) port="${arg#--remote-debugging-port=}" ;;
  esac
done
"#;

fn write_mock_browser(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("mock-chromium");
    fs::write(&path, format!("#!/bin/sh\n{PARSE_ARGS}\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn ready_browser(dir: &Path) -> PathBuf {
    write_mock_browser(
        dir,
        r#"printf '%s\n' "$@" > "$dir/args.txt"
printf '33445\n/devtools/browser/mock' > "$dir/DevToolsActivePort"
exec sleep 30"#,
    )
}

#[tokio::test]
async fn start_resolves_port_from_marker_file() {
    let scratch = TempDir::new().unwrap();
    let mut browser = Chromium::new(ready_browser(scratch.path()));

    assert!(!browser.is_running());
    assert!(matches!(browser.port(), Err(Error::NoPortAssigned)));

    let port = browser.start().await.unwrap();
    assert_eq!(port, 33445);
    assert_eq!(browser.port().unwrap(), 33445);
    assert!(browser.is_running());

    // The mock recorded the argv it was launched with.
    let args = fs::read_to_string(browser.data_dir().unwrap().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert!(args.contains(&"--headless"));
    assert!(args.contains(&"--disable-gpu"));
    assert!(args.contains(&"--no-sandbox"));
    assert_eq!(
        args.iter()
            .filter(|arg| arg.starts_with("--remote-debugging-port="))
            .count(),
        1
    );
    // Mandatory switches trail everything else.
    assert_eq!(args.last(), Some(&"--no-sandbox"));

    let data_dir = browser.data_dir().unwrap().to_path_buf();
    assert!(data_dir.exists());

    browser.stop().await.unwrap();
    assert!(!browser.is_running());
    assert!(!data_dir.exists());
    assert!(matches!(browser.data_dir(), Err(Error::NotRunning)));

    // Stop is rejected once the process is gone.
    assert!(matches!(browser.stop().await, Err(Error::NotRunning)));
}

#[tokio::test]
async fn restart_allocates_a_fresh_data_dir() {
    let scratch = TempDir::new().unwrap();
    let mut browser = Chromium::new(ready_browser(scratch.path()));

    browser.start().await.unwrap();
    let first = browser.data_dir().unwrap().to_path_buf();
    browser.stop().await.unwrap();
    assert!(!first.exists());

    // The instance is reusable; the next start gets its own directory.
    browser.start().await.unwrap();
    let second = browser.data_dir().unwrap().to_path_buf();
    assert_ne!(first, second);
    assert!(second.exists());
    assert_eq!(browser.port().unwrap(), 33445);

    browser.stop().await.unwrap();
    assert!(!second.exists());
}

#[tokio::test]
async fn second_start_reports_already_running() {
    let scratch = TempDir::new().unwrap();
    let mut browser = Chromium::new(ready_browser(scratch.path()));

    let port = browser.start().await.unwrap();
    assert!(matches!(browser.start().await, Err(Error::AlreadyRunning)));
    // The first start's port is untouched by the rejected second call.
    assert_eq!(browser.port().unwrap(), port);

    browser.stop().await.unwrap();
}

#[tokio::test]
async fn stop_on_never_started_instance_is_rejected() {
    let mut browser = Chromium::new("/nonexistent/mock-chromium");
    assert!(matches!(browser.stop().await, Err(Error::NotRunning)));
    assert!(matches!(browser.wait().await, Err(Error::NotRunning)));
}

#[tokio::test]
async fn caller_port_flag_wins_over_ephemeral_default() {
    let scratch = TempDir::new().unwrap();
    let path = write_mock_browser(
        scratch.path(),
        r#"printf '%s\n' "$port" > "$dir/DevToolsActivePort"
exec sleep 30"#,
    );
    let mut browser = Chromium::builder(path).debugging_port(9223).build();

    // A fixed port is reportable before start.
    assert_eq!(browser.port().unwrap(), 9223);
    assert_eq!(browser.start().await.unwrap(), 9223);

    browser.stop().await.unwrap();
}

#[tokio::test]
async fn diagnostic_error_aborts_startup() {
    let scratch = TempDir::new().unwrap();
    let path = write_mock_browser(
        scratch.path(),
        r#"echo '[0819/120000.000:ERROR:socket_posix.cc(143)] Failed to bind socket' >&2
exec sleep 30"#,
    );
    let mut browser = Chromium::builder(path)
        .start_timeout(Duration::from_secs(10))
        .build();

    let error = browser.start().await.unwrap_err();
    match error {
        Error::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.file, "socket_posix.cc");
            assert_eq!(diagnostic.line, 143);
            assert_eq!(diagnostic.message, "Failed to bind socket");
        }
        other => panic!("expected diagnostic error, got {other:?}"),
    }
    assert!(!browser.is_running());
    assert!(matches!(browser.data_dir(), Err(Error::NotRunning)));
}

#[tokio::test]
async fn early_process_exit_aborts_startup() {
    let scratch = TempDir::new().unwrap();
    let path = write_mock_browser(scratch.path(), "exit 127");
    let mut browser = Chromium::builder(path)
        .start_timeout(Duration::from_secs(10))
        .build();

    let error = browser.start().await.unwrap_err();
    match error {
        Error::EarlyExit { status } => assert_eq!(status.code(), Some(127)),
        other => panic!("expected early exit error, got {other:?}"),
    }
    assert!(!browser.is_running());
}

#[tokio::test]
async fn startup_times_out_when_marker_never_appears() {
    let scratch = TempDir::new().unwrap();
    let path = write_mock_browser(scratch.path(), "exec sleep 30");
    let mut browser = Chromium::builder(path)
        .start_timeout(Duration::from_millis(300))
        .build();

    let error = browser.start().await.unwrap_err();
    assert!(error.is_timeout(), "expected timeout, got {error:?}");
    assert!(!browser.is_running());
}

#[tokio::test]
async fn spawn_failure_surfaces_as_io_error() {
    let mut browser = Chromium::new("/nonexistent/mock-chromium");
    assert!(matches!(browser.start().await, Err(Error::Io(_))));
    assert!(!browser.is_running());
}

#[tokio::test]
async fn explicit_data_dir_survives_stop() {
    let scratch = TempDir::new().unwrap();
    let profile = scratch.path().join("profile");
    let mut browser = Chromium::builder(ready_browser(scratch.path()))
        .user_data_dir(&profile)
        .build();

    browser.start().await.unwrap();
    assert_eq!(browser.data_dir().unwrap(), profile.as_path());

    browser.stop().await.unwrap();
    assert!(profile.exists());
    assert!(profile.join("DevToolsActivePort").exists());
}

#[tokio::test]
async fn wait_reaps_natural_exit_and_cleans_up() {
    let scratch = TempDir::new().unwrap();
    let path = write_mock_browser(
        scratch.path(),
        r#"printf '33445' > "$dir/DevToolsActivePort"
sleep 1
exit 0"#,
    );
    let mut browser = Chromium::new(path);

    browser.start().await.unwrap();
    let data_dir = browser.data_dir().unwrap().to_path_buf();

    let status = browser.wait().await.unwrap();
    assert!(status.success());
    assert!(!browser.is_running());
    assert!(!data_dir.exists());
}

#[tokio::test]
async fn runtime_diagnostics_flow_through_the_error_channel() {
    let scratch = TempDir::new().unwrap();
    let path = write_mock_browser(
        scratch.path(),
        r#"printf '33445' > "$dir/DevToolsActivePort"
sleep 1
echo '[0819/120001.000:ERROR:gpu_process_host.cc(991)] GPU process exited unexpectedly' >&2
exec sleep 30"#,
    );
    let mut browser = Chromium::new(path);

    browser.start().await.unwrap();
    let mut errors = browser.take_errors().expect("error channel available");
    // Only claimable once per start.
    assert!(browser.take_errors().is_none());

    let error = tokio::time::timeout(Duration::from_secs(10), errors.recv())
        .await
        .expect("no diagnostic before timeout")
        .expect("channel closed early");
    let diagnostic = error.diagnostic().expect("structured diagnostic");
    assert_eq!(diagnostic.file, "gpu_process_host.cc");
    assert_eq!(diagnostic.message, "GPU process exited unexpectedly");
    assert_eq!(browser.dropped_diagnostics(), 0);

    browser.stop().await.unwrap();
}
