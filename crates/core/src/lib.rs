//! Headless Chromium process supervision.
//!
//! Launches a Chromium binary in headless mode, discovers the
//! dynamically-assigned remote-debugging port through the
//! `DevToolsActivePort` marker file, forwards structured errors parsed
//! from its stderr, and removes its user data directory on stop.
//!
//! # Example
//!
//! ```ignore
//! use cr::Chromium;
//!
//! #[tokio::main]
//! async fn main() -> cr::Result<()> {
//!     let mut browser = Chromium::builder("chromium")
//!         .window_size(1920, 1080)
//!         .build();
//!
//!     let port = browser.start().await?;
//!     println!("DevTools endpoint on 127.0.0.1:{port}");
//!
//!     let mut errors = browser.take_errors().expect("channel claimed once");
//!     tokio::spawn(async move {
//!         while let Some(error) = errors.recv().await {
//!             eprintln!("chromium: {error}");
//!         }
//!     });
//!
//!     browser.stop().await
//! }
//! ```

pub mod diagnostics;
pub mod error;
pub mod flag;
mod readiness;
pub mod supervisor;

pub use diagnostics::Diagnostic;
pub use error::{Error, Result};
pub use flag::{Flag, FlagValue, merge};
pub use supervisor::{Chromium, ChromiumBuilder};
