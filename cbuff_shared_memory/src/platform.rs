//! Operating-system facilities the buffer depends on
//!
//! The controller only needs four operations from the OS: create a named
//! region, open an existing one, map it, and unlink the name. They are
//! expressed by [`SegmentAllocator`] so tests can point the buffer at a
//! scratch directory instead of `/dev/shm`.

pub mod linux;

pub use linux::{ShmDir, get_current_pid, is_process_alive};

use crate::error::CbuffResult;
use memmap2::MmapMut;
use std::fs::File;

/// Named shared-memory region provider
pub trait SegmentAllocator {
    /// Create and publish a new region of `size` zeroed bytes.
    ///
    /// Fails with `AlreadyExists` if the name is taken. The returned file
    /// already holds the exclusive segment lock, so no other handle can
    /// observe the region before the caller has written its header; the
    /// caller adopts and releases that lock.
    fn create(&self, name: &str, size: usize) -> CbuffResult<File>;

    /// Open an existing region. Fails with `NotFound` if absent.
    fn open(&self, name: &str) -> CbuffResult<File>;

    /// Map an opened region read-write into this process
    fn map(&self, file: &File) -> CbuffResult<MmapMut>;

    /// Remove the name. Existing mappings stay valid until unmapped.
    fn unlink(&self, name: &str) -> CbuffResult<()>;
}
