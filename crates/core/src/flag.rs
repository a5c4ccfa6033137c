//! Typed command-line flags for the Chromium binary.
//!
//! A [`Flag`] is an opaque key with a typed value and a deterministic
//! rendering rule. The supervisor composes the final argument list with
//! [`merge`]: caller flags replace supervisor defaults in place, and the
//! mandatory safety switches are always appended last.
//!
//! A complete list of Chromium switches can be found at:
//! <https://peter.sh/experiments/chromium-command-line-switches/>

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

/// A single Chromium command-line flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    /// Switch name without the leading `--`.
    pub key: String,
    /// Typed value, rendered per [`FlagValue`].
    pub value: FlagValue,
}

/// The value carried by a [`Flag`].
///
/// The set of value types is closed; rendering is total over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// Boolean switch: `true` renders as `--key`, `false` renders as nothing.
    Switch(bool),
    /// Free-form string, rendered as `--key=value`.
    Str(String),
    /// Decimal integer, rendered as `--key=n`.
    Int(i64),
    /// IP address in its canonical textual form.
    Addr(IpAddr),
    /// Window dimensions, rendered as `--key=W,H`.
    Size { width: u32, height: u32 },
}

impl Flag {
    /// Creates a flag from a key and any supported value type.
    pub fn new(key: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates an enabled boolean switch, e.g. `--headless`.
    pub fn switch(key: impl Into<String>) -> Self {
        Self::new(key, true)
    }

    /// `--remote-debugging-address=<addr>`
    pub fn remote_debugging_address(addr: IpAddr) -> Self {
        Self::new("remote-debugging-address", addr)
    }

    /// `--remote-debugging-port=<port>`
    ///
    /// Port 0 asks Chromium to bind any available port; the bound port is
    /// then discovered through the `DevToolsActivePort` marker file.
    pub fn remote_debugging_port(port: u16) -> Self {
        Self::new("remote-debugging-port", port)
    }

    /// `--user-data-dir=<dir>`
    pub fn user_data_dir(dir: impl AsRef<Path>) -> Self {
        Self::new("user-data-dir", dir.as_ref().display().to_string())
    }

    /// `--window-size=<width>,<height>`
    pub fn window_size(width: u32, height: u32) -> Self {
        Self::new("window-size", FlagValue::Size { width, height })
    }

    /// Renders the flag to its argument string.
    ///
    /// A disabled switch renders to the empty string and is omitted from
    /// the final argument list.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl FlagValue {
    /// Textual form of the value as it appears after `=`, if any.
    ///
    /// Switches carry no value text.
    pub fn text(&self) -> Option<String> {
        match self {
            FlagValue::Switch(_) => None,
            FlagValue::Str(value) => Some(value.clone()),
            FlagValue::Int(value) => Some(value.to_string()),
            FlagValue::Addr(addr) => Some(addr.to_string()),
            FlagValue::Size { width, height } => Some(format!("{width},{height}")),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FlagValue::Switch(true) => write!(f, "--{}", self.key),
            FlagValue::Switch(false) => Ok(()),
            value => match value.text() {
                Some(text) => write!(f, "--{}={}", self.key, text),
                None => Ok(()),
            },
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Switch(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Str(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Str(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<u16> for FlagValue {
    fn from(value: u16) -> Self {
        FlagValue::Int(i64::from(value))
    }
}

impl From<IpAddr> for FlagValue {
    fn from(value: IpAddr) -> Self {
        FlagValue::Addr(value)
    }
}

impl From<Ipv4Addr> for FlagValue {
    fn from(value: Ipv4Addr) -> Self {
        FlagValue::Addr(IpAddr::V4(value))
    }
}

/// Merges three flag lists into the final ordered set.
///
/// Base entries are kept in their original positions unless an override
/// shares the key, in which case the override's value replaces the base
/// entry in place. Overrides with keys absent from the base are appended
/// after it, in their own order. Mandatory entries are always appended
/// last, even when that duplicates an earlier key; Chromium is assumed
/// to honor the last occurrence of a repeated switch.
pub fn merge(base: Vec<Flag>, overrides: Vec<Flag>, mandatory: Vec<Flag>) -> Vec<Flag> {
    let mut merged = base;

    for flag in overrides {
        match merged.iter_mut().find(|existing| existing.key == flag.key) {
            Some(slot) => *slot = flag,
            None => merged.push(flag),
        }
    }

    merged.extend(mandatory);
    merged
}
