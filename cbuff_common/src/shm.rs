//! Shared memory subsystem.
//!
//! This module contains:
//! - `consts`: segment magic, layout version, capacity bounds and naming.
//! - [`is_valid_segment_name`]: the naming rule shared by config and allocator.

pub mod consts;

/// Whether `name` can be used as a segment name.
///
/// The name becomes a single path component under the segment directory, so
/// it must be non-empty, free of `/` and NUL, and not `.` or `..`.
pub fn is_valid_segment_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\0']) && name != "." && name != ".."
}
