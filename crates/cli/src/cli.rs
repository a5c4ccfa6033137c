use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use cr::Flag;

#[derive(Parser, Debug)]
#[command(name = "cr")]
#[command(about = "Launch a supervised headless Chromium and print its DevTools port")]
#[command(version)]
pub struct Cli {
    /// Path to the Chromium binary
    pub binary: PathBuf,

    /// Remote debugging address (defaults to loopback)
    #[arg(long, value_name = "IP")]
    pub addr: Option<IpAddr>,

    /// Remote debugging port (0 requests any available port)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Reuse an existing user data directory instead of a fresh temp dir
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Initial window size as WxH, e.g. 1920x1080
    #[arg(long, value_name = "WxH", value_parser = parse_window_size)]
    pub window_size: Option<(u32, u32)>,

    /// Extra Chromium flag, `key` or `key=value` (repeatable)
    #[arg(long = "flag", value_name = "KEY[=VALUE]", value_parser = parse_extra_flag)]
    pub flags: Vec<Flag>,

    /// Seconds to wait for the debugging endpoint before giving up
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Increase verbosity
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parses `WxH` (or `W,H`) into a width/height pair.
fn parse_window_size(input: &str) -> Result<(u32, u32), String> {
    let (width, height) = input
        .split_once(['x', ','])
        .ok_or_else(|| format!("expected WxH, got '{input}'"))?;

    let width = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{width}'"))?;
    let height = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{height}'"))?;

    Ok((width, height))
}

/// Parses `key` into a switch and `key=value` into a string-valued flag.
fn parse_extra_flag(input: &str) -> Result<Flag, String> {
    let input = input.trim_start_matches("--");
    if input.is_empty() {
        return Err("empty flag".to_string());
    }

    Ok(match input.split_once('=') {
        Some((key, value)) => Flag::new(key, value),
        None => Flag::switch(input),
    })
}
