use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cr::Chromium;
use tracing::{error, info, warn};

mod cli;
mod logging;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(target: "cr", error = %err, "launch failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut builder = Chromium::builder(&cli.binary)
        .flags(cli.flags.clone())
        .start_timeout(Duration::from_secs(cli.timeout));

    if let Some(addr) = cli.addr {
        builder = builder.debugging_address(addr);
    }
    if let Some(port) = cli.port {
        builder = builder.debugging_port(port);
    }
    if let Some(dir) = &cli.data_dir {
        builder = builder.user_data_dir(dir);
    }
    if let Some((width, height)) = cli.window_size {
        builder = builder.window_size(width, height);
    }

    let mut browser = builder.build();

    let port = browser
        .start()
        .await
        .with_context(|| format!("starting {}", cli.binary.display()))?;

    // The port on stdout is the machine-readable contract; everything
    // else goes to the log on stderr.
    println!("{port}");
    info!(target: "cr", port, data_dir = %browser.data_dir()?.display(), "chromium ready");

    let mut errors = browser.take_errors().expect("error channel claimed once");
    let drain = tokio::spawn(async move {
        while let Some(error) = errors.recv().await {
            warn!(target: "cr", %error, "chromium");
        }
    });

    let exited = tokio::select! {
        status = browser.wait() => Some(status?),
        result = tokio::signal::ctrl_c() => {
            result.context("listening for ctrl-c")?;
            None
        }
    };

    match exited {
        Some(status) => info!(target: "cr", %status, "chromium exited"),
        None => {
            info!(target: "cr", "interrupt received, stopping chromium");
            browser.stop().await?;
        }
    }

    drain.abort();
    Ok(())
}
