//! cbuff Common Library
//!
//! This crate provides shared constants and configuration loading utilities
//! for all cbuff workspace crates.
//!
//! # Module Structure
//!
//! - [`shm`] - Segment layout constants (magic, version, capacity bounds)
//! - [`consts`] - Workspace-wide defaults
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! cbuff = { package = "cbuff_common", path = "../cbuff_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use cbuff_common::shm::consts::*;
//! use cbuff_common::config::{BufferConfig, ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod shm;
