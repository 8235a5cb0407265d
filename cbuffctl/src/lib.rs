//! # cbuffctl
//!
//! Shell front end for shared memory circular buffers. Each subcommand opens
//! one handle, performs its operation and closes the handle again, so a
//! `push` claims the writer role only for the duration of the call.
//!
//! Data goes to the supplied writer (stdout in the binary); logs go to stderr.

use cbuff_common::config::{BufferConfig, ConfigError, ConfigLoader, LogLevel, SharedConfig};
use cbuff_common::consts::{DEFAULT_CONFIG_PATH, DEFAULT_SERVICE_NAME};
use cbuff_shared_memory::{
    BufferOptions, CbuffError, SegmentDiscovery, SegmentInfo, SharedCircularBuffer, ShmDir,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Poll interval of `create --hold` while waiting for a shutdown signal
const HOLD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command-line tool for shared memory circular buffers
#[derive(Parser, Debug)]
#[command(name = "cbuffctl")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Create, feed, drain and inspect shared memory circular buffers")]
#[command(long_about = None)]
pub struct Cli {
    /// TOML file with `[shared]` and `[buffer]` sections.
    /// Defaults to /etc/cbuff/cbuff.toml when that file exists.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding segment files (default /dev/shm)
    #[arg(long, value_name = "DIR")]
    pub shm_dir: Option<PathBuf>,

    /// Give up waiting for a segment lock after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub lock_timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    /// Operation to perform
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a new buffer and release the writer role again
    Create {
        /// Segment name
        name: String,
        /// Capacity in items (1..=256); falls back to the config file, then 2
        #[arg(short, long)]
        length: Option<usize>,
        /// Keep the writer role until interrupted, then destroy the buffer
        #[arg(long)]
        hold: bool,
    },
    /// Append items as the writer
    Push {
        /// Segment name
        name: String,
        /// Byte values to append, oldest first
        #[arg(required = true)]
        items: Vec<u8>,
    },
    /// Remove and print the oldest items
    Pop {
        /// Segment name
        name: String,
        /// Maximum number of items to remove
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Print a JSON array instead of one item per line
        #[arg(long)]
        json: bool,
    },
    /// Show the header of one buffer
    Info {
        /// Segment name
        name: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show every buffer in the segment directory
    List {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Unlink a buffer. Fails while another process holds the writer role.
    Destroy {
        /// Segment name
        name: String,
    },
}

/// Errors reported by the tool
#[derive(Error, Debug)]
pub enum CtlError {
    /// Buffer operation failed
    #[error(transparent)]
    Buffer(#[from] CbuffError),

    /// Configuration could not be loaded
    #[error("{}: {source}", path.display())]
    Config {
        /// Configuration file
        path: PathBuf,
        /// Underlying failure
        source: ConfigError,
    },

    /// Output could not be written
    #[error("Output error: {0}")]
    Io(#[from] io::Error),

    /// JSON output could not be produced
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signal handler could not be installed
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Contents of the configuration file. Both sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CtlConfig {
    /// Logging and identity
    #[serde(default)]
    pub shared: Option<SharedConfig>,

    /// Buffer defaults; `name` is ignored since every subcommand takes one
    #[serde(default)]
    pub buffer: Option<BufferConfig>,
}

impl CtlConfig {
    /// Load and validate `path`
    pub fn load_from(path: &Path) -> Result<Self, CtlError> {
        let wrap = |source| CtlError::Config {
            path: path.to_path_buf(),
            source,
        };

        let config = Self::load(path).map_err(wrap)?;
        if let Some(shared) = &config.shared {
            shared.validate().map_err(wrap)?;
        }
        if let Some(buffer) = &config.buffer {
            buffer.validate().map_err(wrap)?;
        }
        Ok(config)
    }

    /// Load `--config`, or the default file if present, or nothing
    pub fn for_cli(cli: &Cli) -> Result<Self, CtlError> {
        match &cli.config {
            Some(path) => Self::load_from(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Service name attached to every log line
    pub fn service_name(&self) -> &str {
        self.shared
            .as_ref()
            .map_or(DEFAULT_SERVICE_NAME, |shared| shared.service_name.as_str())
    }

    /// Log level requested by the file, if any
    pub fn log_level(&self) -> Option<LogLevel> {
        self.shared.as_ref().map(|shared| shared.log_level)
    }
}

/// Effective settings after merging the config file with command-line flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Segment directory
    pub shm_dir: Option<PathBuf>,
    /// Lock wait bound
    pub lock_timeout: Option<Duration>,
    /// Capacity used by `create` without `--length`
    pub default_length: usize,
}

impl Settings {
    /// Merge `config` with `cli`; flags win over file values
    pub fn resolve(cli: &Cli, config: &CtlConfig) -> Self {
        let file = config.buffer.as_ref();

        let shm_dir = cli
            .shm_dir
            .clone()
            .or_else(|| file.and_then(|buffer| buffer.shm_dir.clone()));
        let lock_timeout = cli
            .lock_timeout_ms
            .or_else(|| file.and_then(|buffer| buffer.lock_timeout_ms))
            .map(Duration::from_millis);
        let default_length = file
            .map(|buffer| buffer.length)
            .unwrap_or(cbuff_common::shm::consts::DEFAULT_CAPACITY);

        Self {
            shm_dir,
            lock_timeout,
            default_length,
        }
    }

    fn segment_dir(&self) -> ShmDir {
        self.shm_dir
            .as_ref()
            .map(|root| ShmDir::new(root.clone()))
            .unwrap_or_default()
    }

    fn options(&self) -> BufferOptions<ShmDir> {
        let options = BufferOptions::new().allocator(self.segment_dir());
        match self.lock_timeout {
            Some(timeout) => options.lock_timeout(timeout),
            None => options,
        }
    }

    fn discovery(&self) -> SegmentDiscovery {
        let discovery = SegmentDiscovery::with_dir(self.segment_dir());
        match self.lock_timeout {
            Some(timeout) => discovery.lock_timeout(timeout),
            None => discovery,
        }
    }
}

/// Run `command`, writing its data output to `out`
pub fn execute(command: &Command, settings: &Settings, out: &mut dyn Write) -> Result<(), CtlError> {
    match command {
        Command::Create { name, length, hold } => {
            let length = length.unwrap_or(settings.default_length);
            let mut writer = settings.options().create(name, length)?;
            writeln!(out, "{}", writer)?;

            if *hold {
                let running = Arc::new(AtomicBool::new(true));
                let flag = running.clone();
                ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;
                info!("Holding writer role on '{}', interrupt to destroy", name);
                hold_until_stopped(&running);
                writer.destroy()?;
            } else {
                writer.close()?;
            }
        }

        Command::Push { name, items } => {
            let mut writer = settings.options().attach_writer(name)?;
            let pushed = push_all(&mut writer, items);
            writer.close()?;
            pushed?;
            debug!("Pushed {} items to '{}'", items.len(), name);
        }

        Command::Pop { name, count, json } => {
            let mut reader = settings.options().attach(name)?;
            let items = reader.popmany(*count)?;
            reader.close()?;

            if *json {
                writeln!(out, "{}", serde_json::to_string(&items)?)?;
            } else {
                for item in &items {
                    writeln!(out, "{}", item)?;
                }
            }
        }

        Command::Info { name, json } => {
            let info = settings.discovery().inspect(name)?;
            if *json {
                writeln!(out, "{}", info.to_json()?)?;
            } else {
                write_info(out, &info)?;
            }
        }

        Command::List { json } => {
            let segments = settings.discovery().list()?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&segments)?)?;
            } else {
                write_table(out, &segments)?;
            }
        }

        Command::Destroy { name } => {
            let mut writer = settings.options().attach_writer(name)?;
            writer.destroy()?;
            writeln!(out, "Destroyed {}", name)?;
        }
    }
    Ok(())
}

/// Push `items` in order, stopping at the first failure
fn push_all(writer: &mut SharedCircularBuffer<ShmDir>, items: &[u8]) -> Result<(), CbuffError> {
    for (pushed, &item) in items.iter().enumerate() {
        if let Err(e) = writer.push(item) {
            debug!("Push stopped after {} of {} items", pushed, items.len());
            return Err(e);
        }
    }
    Ok(())
}

fn hold_until_stopped(running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(HOLD_POLL_INTERVAL);
    }
    info!("Received shutdown signal");
}

fn write_info(out: &mut dyn Write, info: &SegmentInfo) -> io::Result<()> {
    writeln!(out, "name:     {}", info.name)?;
    writeln!(out, "capacity: {}", info.capacity)?;
    writeln!(out, "items:    {}", info.len)?;
    writeln!(out, "head:     {}", info.head)?;
    writeln!(out, "writer:   {}", writer_column(info))?;
    writeln!(out, "size:     {} bytes", info.size_bytes)
}

fn write_table(out: &mut dyn Write, segments: &[SegmentInfo]) -> io::Result<()> {
    writeln!(out, "{:<24} {:>8} {:>6}  WRITER", "NAME", "CAPACITY", "ITEMS")?;
    for info in segments {
        writeln!(
            out,
            "{:<24} {:>8} {:>6}  {}",
            info.name,
            info.capacity,
            info.len,
            writer_column(info)
        )?;
    }
    Ok(())
}

fn writer_column(info: &SegmentInfo) -> String {
    match (info.writer_attached, info.writer_alive) {
        (false, _) => "-".to_string(),
        (true, true) => format!("pid {}", info.writer_pid),
        (true, false) => format!("pid {} (stale)", info.writer_pid),
    }
}
