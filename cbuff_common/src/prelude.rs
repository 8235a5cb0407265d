//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use cbuff_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use cbuff_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{BufferConfig, ConfigError, ConfigLoader, SharedConfig};

// ─── Segment Layout ─────────────────────────────────────────────────
pub use crate::shm::consts::{ELEMENT_WIDTH, HEADER_SIZE, MAX_CAPACITY, MIN_CAPACITY};
