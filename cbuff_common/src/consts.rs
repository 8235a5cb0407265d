//! Workspace-wide defaults.
//!
//! Numeric limits of the segment layout live in [`crate::shm::consts`];
//! this module only carries paths and names used by tooling.

/// Configuration file read by `cbuffctl` when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cbuff/cbuff.toml";

/// Service name reported in logs when the config file sets none.
pub const DEFAULT_SERVICE_NAME: &str = "cbuffctl";
