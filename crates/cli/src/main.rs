mod args;
mod input;
mod output;
mod runner;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use args::Opts;
use runner::run;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    init_logging(opts.verbose, opts.log.as_deref())?;
    run(opts).await
}

/// Route logs to stderr or a file. Results go to stdout, so logs never do.
/// An unopenable log file is fatal before any probing starts.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .compact()
                .init();
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
    }
    Ok(())
}
