//! SHM (Shared Memory) constants.
//!
//! These constants define the binary contract between every process that maps
//! a circular-buffer segment. They are the single source of truth - all other
//! crates should import from here.

use static_assertions::const_assert;

/// Magic bytes identifying a circular-buffer segment: `"CBUFF\0\0\0"`.
pub const CBUFF_MAGIC: [u8; 8] = *b"CBUFF\0\0\0";

/// Version of the header layout.
///
/// Bumped whenever a field moves or changes meaning. Attaching to a segment
/// with a different version fails closed.
pub const LAYOUT_VERSION: u16 = 1;

/// Size of the segment header in bytes. Storage slots start right after it.
pub const HEADER_SIZE: usize = 32;

/// Width of one stored element in bytes.
///
/// Stored in the header so wider elements can be introduced without breaking
/// the attach check. Only single-byte elements are supported today.
pub const ELEMENT_WIDTH: usize = 1;

/// Smallest capacity a buffer can be created with.
pub const MIN_CAPACITY: usize = 1;

/// Largest capacity a buffer can be created with.
pub const MAX_CAPACITY: usize = 256;

/// Capacity used when a caller does not ask for one.
pub const DEFAULT_CAPACITY: usize = 2;

/// Directory holding POSIX shared memory objects on Linux.
pub const SHM_DIR: &str = "/dev/shm";

/// Prefix prepended to every segment name inside [`SHM_DIR`].
pub const SHM_PREFIX: &str = "cbuff_";

const_assert!(MIN_CAPACITY >= 1);
const_assert!(MAX_CAPACITY <= u16::MAX as usize);
const_assert!(DEFAULT_CAPACITY >= MIN_CAPACITY && DEFAULT_CAPACITY <= MAX_CAPACITY);
const_assert!(HEADER_SIZE % 8 == 0);
