//! # Shared Memory Circular Buffer
//!
//! A fixed-capacity FIFO of bytes stored in a named shared memory segment, so
//! that independent processes on one host can pass small values to each
//! other. One process creates the segment and owns the writer role; any
//! number of processes attach to it and consume items.
//!
//! ## Segment Layout
//!
//! ```text
//! offset  0        8     10    12     14   16    18  19  20     24       32
//!         ┌────────┬─────┬─────┬──────┬────┬─────┬───┬───┬──────┬────────┬──────────────┐
//!         │ magic  │ ver │ wid │ cap  │head│count│ w │ - │ pid  │  pad   │ slots[cap]   │
//!         └────────┴─────┴─────┴──────┴────┴─────┴───┴───┴──────┴────────┴──────────────┘
//! ```
//!
//! All header fields are little-endian. Storage starts at byte 32 and holds
//! `capacity` one-byte slots. Occupied slots run from `head` for `count`
//! positions, wrapping modulo `capacity`.
//!
//! ## Synchronization
//!
//! Every header read and every mutation runs under an exclusive `flock(2)` on
//! the segment's backing file. The lock spans processes, serializes separate
//! handles within one process, and is dropped by the kernel if its holder
//! dies.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cbuff_shared_memory::{CbuffError, SharedCircularBuffer};
//!
//! # fn main() -> Result<(), CbuffError> {
//! // Producer
//! let mut writer = SharedCircularBuffer::create("b", 5)?;
//! writer.push(50)?;
//! writer.push(10)?;
//!
//! // Consumer, usually in another process
//! let mut reader = SharedCircularBuffer::attach("b")?;
//! assert_eq!(reader.popitem()?, 50);
//! assert_eq!(reader.popmany(3)?, vec![10]);
//!
//! writer.destroy()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust,no_run
//! use cbuff_shared_memory::{CbuffError, SharedCircularBuffer};
//!
//! match SharedCircularBuffer::attach_writer("b") {
//!     Ok(writer) => { /* push */ }
//!     Err(CbuffError::WriterAlreadyActive { name, pid }) => {
//!         eprintln!("'{}' is already written by pid {}", name, pid);
//!     }
//!     Err(CbuffError::NotFound { name }) => {
//!         eprintln!("Segment '{}' not found - check the producer is running", name);
//!     }
//!     Err(e) => eprintln!("Unexpected error: {}", e),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! - **SharedCircularBuffer**: `Send`, not `Sync`; mutating calls take `&mut self`
//! - **SegmentDiscovery**: read-only, safe to run alongside live handles

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod discovery;
pub mod error;
pub mod layout;
pub mod lock;
pub mod platform;

pub use buffer::{BufferOptions, HandleState, OpenMode, Role, SharedCircularBuffer};
pub use discovery::{SegmentDiscovery, SegmentInfo};
pub use error::{CbuffError, CbuffResult};
pub use layout::{
    HeaderFault, SegmentHeader, SegmentLayout, layout_size, read_header, slot_offset,
    write_header,
};
pub use platform::{SegmentAllocator, ShmDir};

