//! Error types for circular buffer operations

use crate::layout::HeaderFault;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while opening or operating a shared circular buffer
#[derive(Error, Debug)]
pub enum CbuffError {
    /// Capacity outside the supported range at create time
    #[error("Invalid capacity: {capacity} (must be {min}..={max})")]
    InvalidCapacity {
        /// Requested capacity
        capacity: usize,
        /// Smallest accepted capacity
        min: usize,
        /// Largest accepted capacity
        max: usize,
    },

    /// Segment name cannot be used as a shared memory object name
    #[error("Invalid segment name: {name:?}")]
    InvalidName {
        /// Offending name
        name: String,
    },

    /// A segment with this name already exists
    #[error("Segment already exists: {name}")]
    AlreadyExists {
        /// Segment name
        name: String,
    },

    /// No segment with this name exists
    #[error("Segment not found: {name}")]
    NotFound {
        /// Segment name
        name: String,
    },

    /// Header does not describe a compatible circular buffer
    #[error("Corrupt header in segment {name}: {reason}")]
    CorruptHeader {
        /// Segment name
        name: String,
        /// What failed to validate
        reason: String,
    },

    /// Operation reserved to the writer handle
    #[error("Handle on {name} is not the registered writer")]
    NotWriter {
        /// Segment name
        name: String,
    },

    /// Another handle already holds the writer role
    #[error("Writer already active on {name} (pid {pid})")]
    WriterAlreadyActive {
        /// Segment name
        name: String,
        /// Process recorded as the active writer
        pid: u32,
    },

    /// Push attempted while `count == capacity`
    #[error("Buffer full ({capacity} items)")]
    BufferFull {
        /// Buffer capacity
        capacity: usize,
    },

    /// Pop attempted while `count == 0`
    #[error("Buffer empty")]
    BufferEmpty,

    /// Segment lock not acquired within the configured timeout
    #[error("Timed out after {timeout:?} waiting for lock on {name}")]
    LockTimeout {
        /// Segment name
        name: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Handle was closed or its segment destroyed
    #[error("Handle on {name} is closed")]
    HandleClosed {
        /// Segment name
        name: String,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error
        #[from]
        source: serde_json::Error,
    },
}

impl CbuffError {
    pub(crate) fn corrupt(name: &str, fault: HeaderFault) -> Self {
        Self::CorruptHeader {
            name: name.to_string(),
            reason: fault.to_string(),
        }
    }
}

/// Result type for circular buffer operations
pub type CbuffResult<T> = Result<T, CbuffError>;
