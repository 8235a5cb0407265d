//! # cbuffctl
//!
//! # Usage
//!
//! ```bash
//! # Create a 5-slot buffer and feed it
//! cbuffctl create b --length 5
//! cbuffctl push b 50 10 20 30
//!
//! # Drain from another shell
//! cbuffctl pop b -n 4
//!
//! # Inspect
//! cbuffctl info b --json
//! cbuffctl list
//!
//! # Segments outside /dev/shm, verbose logging
//! cbuffctl --shm-dir /tmp/cbuff -v create scratch
//! ```

#![deny(warnings)]

use cbuff_common::config::LogLevel;
use cbuffctl::{Cli, CtlConfig, Settings, execute};
use clap::Parser;
use tracing::{debug, error, info_span};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("cbuffctl failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    // Config errors are reported after tracing is up
    let config = CtlConfig::for_cli(&args);
    let file_level = config.as_ref().ok().and_then(CtlConfig::log_level);
    setup_tracing(&args, file_level)?;
    let config = config?;
    let _span = info_span!("cbuffctl", service = %config.service_name()).entered();

    let settings = Settings::resolve(&args, &config);
    debug!("Effective settings: {:?}", settings);

    let stdout = std::io::stdout();
    execute(&args.command, &settings, &mut stdout.lock())?;
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the config file.
fn setup_tracing(
    args: &Cli,
    file_level: Option<LogLevel>,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        file_level.unwrap_or_default()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.as_directive().parse()?);

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
    Ok(())
}
