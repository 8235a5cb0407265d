//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all cbuff applications.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cbuff_common::config::{BufferConfig, ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct MyAppConfig {
//!     shared: SharedConfig,
//!     buffer: BufferConfig,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MyAppConfig::load(Path::new("cbuff.toml"))?;
//!     config.buffer.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::shm::consts::{DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
use crate::shm::is_valid_segment_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all cbuff applications.
///
/// This struct should be embedded in application-specific configuration
/// structs to provide consistent base configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "sensor-feed-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Construction parameters of a circular buffer handle.
///
/// # TOML Example
///
/// ```toml
/// [buffer]
/// name = "sensor_bytes"
/// create = true
/// length = 64
/// lock_timeout_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// Segment name shared by every process using the buffer.
    pub name: String,

    /// Create the segment instead of attaching to an existing one.
    #[serde(default)]
    pub create: bool,

    /// Capacity in elements. Only read when `create` is set.
    #[serde(default = "default_length")]
    pub length: usize,

    /// Claim the writer role when attaching to an existing segment.
    #[serde(default)]
    pub writer: bool,

    /// Directory holding segment files. Defaults to `/dev/shm`.
    #[serde(default)]
    pub shm_dir: Option<PathBuf>,

    /// Upper bound on waiting for the segment lock. Unbounded when absent.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

fn default_length() -> usize {
    DEFAULT_CAPACITY
}

impl BufferConfig {
    /// Attach-as-reader parameters for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: false,
            length: DEFAULT_CAPACITY,
            writer: false,
            shm_dir: None,
            lock_timeout_ms: None,
        }
    }

    /// Lock timeout as a [`Duration`].
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `name` is empty, `.` or `..`, or contains `/` or NUL
    /// - `create` is set and `length` is outside `1..=256`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "buffer name cannot be empty".to_string(),
            ));
        }
        if !is_valid_segment_name(&self.name) {
            return Err(ConfigError::ValidationError(format!(
                "buffer name {:?} must not be '.' or '..' or contain '/' or NUL",
                self.name
            )));
        }
        if self.create && !(MIN_CAPACITY..=MAX_CAPACITY).contains(&self.length) {
            return Err(ConfigError::ValidationError(format!(
                "length {} out of range {}..={}",
                self.length, MIN_CAPACITY, MAX_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - Successfully loaded and parsed configuration
    /// * `Err(ConfigError)` - Loading or parsing failed
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        for (raw, expected) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed: TestWrapper = toml::from_str(&format!("level = \"{raw}\"")).unwrap();
            assert_eq!(parsed.level, expected);
            assert_eq!(expected.as_directive(), raw);
        }
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_buffer_config_defaults() {
        let config: BufferConfig = toml::from_str("name = \"b\"").unwrap();
        assert_eq!(config, BufferConfig::new("b"));
        assert_eq!(config.length, DEFAULT_CAPACITY);
        assert!(config.lock_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_config_rejects_bad_length_on_create() {
        let mut config = BufferConfig::new("b");
        config.create = true;
        config.length = 0;
        assert!(config.validate().is_err());
        config.length = MAX_CAPACITY + 1;
        assert!(config.validate().is_err());
        config.length = MAX_CAPACITY;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_config_ignores_length_on_attach() {
        let mut config = BufferConfig::new("b");
        config.length = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_config_rejects_bad_names() {
        assert!(BufferConfig::new("").validate().is_err());
        assert!(BufferConfig::new("a/b").validate().is_err());
        assert!(BufferConfig::new("a\0b").validate().is_err());
        assert!(BufferConfig::new(".").validate().is_err());
        assert!(BufferConfig::new("..").validate().is_err());
        assert!(BufferConfig::new("..b").validate().is_ok());
    }

    #[test]
    fn test_buffer_config_lock_timeout() {
        let config: BufferConfig =
            toml::from_str("name = \"b\"\nlock_timeout_ms = 250").unwrap();
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(250)));
    }
}
