//! Segment layout: header fields and ring storage offsets
//!
//! ```text
//! 0        8        10       12       14     16      18  19  20         24        32
//! ┌────────┬────────┬────────┬────────┬──────┬───────┬───┬───┬──────────┬─────────┬──────────────┐
//! │ magic  │version │ width  │capacity│ head │ count │ W │ - │writer_pid│ padding │ storage ...  │
//! └────────┴────────┴────────┴────────┴──────┴───────┴───┴───┴──────────┴─────────┴──────────────┘
//! ```
//!
//! Integers are little-endian. Every process mapping the same segment must
//! agree on this layout; [`read_header`] fails closed on any mismatch.

use cbuff::shm::consts::{
    CBUFF_MAGIC, ELEMENT_WIDTH, HEADER_SIZE, LAYOUT_VERSION, MAX_CAPACITY, MIN_CAPACITY,
};
use static_assertions::const_assert;
use thiserror::Error;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_WIDTH: usize = 10;
const OFF_CAPACITY: usize = 12;
const OFF_HEAD: usize = 14;
const OFF_COUNT: usize = 16;
const OFF_WRITER: usize = 18;
const OFF_RESERVED: usize = 19;
const OFF_WRITER_PID: usize = 20;
const OFF_PADDING: usize = 24;

const_assert!(OFF_PADDING <= HEADER_SIZE);
const_assert!(OFF_MAGIC + CBUFF_MAGIC.len() == OFF_VERSION);

/// Reasons a mapped region is not a usable circular buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderFault {
    /// Region too small to hold a header
    #[error("segment is {len} bytes, shorter than the {}-byte header", HEADER_SIZE)]
    TooShort {
        /// Mapped length
        len: usize,
    },
    /// Magic bytes do not match
    #[error("magic mismatch")]
    BadMagic,
    /// Layout version differs from this build
    #[error("layout version {found}, expected {}", LAYOUT_VERSION)]
    VersionMismatch {
        /// Version stored in the segment
        found: u16,
    },
    /// Element width not supported by this build
    #[error("element width {found}, expected {}", ELEMENT_WIDTH)]
    UnsupportedWidth {
        /// Width stored in the segment
        found: u16,
    },
    /// Stored capacity outside the valid range
    #[error("capacity {found} outside {}..={}", MIN_CAPACITY, MAX_CAPACITY)]
    BadCapacity {
        /// Capacity stored in the segment
        found: u16,
    },
    /// Head or count inconsistent with capacity
    #[error("head {head} / count {count} inconsistent with capacity {capacity}")]
    BadIndices {
        /// Stored head
        head: u16,
        /// Stored count
        count: u16,
        /// Stored capacity
        capacity: u16,
    },
    /// Region size does not match the size implied by the header
    #[error("segment is {actual} bytes, header implies {expected}")]
    SizeMismatch {
        /// Size computed from the header
        expected: usize,
        /// Actual mapped size
        actual: usize,
    },
}

/// Decoded header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Bytes per storage slot
    pub element_width: u16,
    /// Number of slots, fixed at creation
    pub capacity: u16,
    /// Index of the oldest item
    pub head: u16,
    /// Number of occupied slots
    pub count: u16,
    /// Whether a writer-role handle currently holds the segment
    pub writer_attached: bool,
    /// Process that last claimed the writer role
    pub writer_pid: u32,
}

impl SegmentHeader {
    /// Header of a freshly created, empty buffer owned by `writer_pid`
    pub fn new(capacity: u16, writer_pid: u32) -> Self {
        Self {
            element_width: ELEMENT_WIDTH as u16,
            capacity,
            head: 0,
            count: 0,
            writer_attached: true,
            writer_pid,
        }
    }

    /// Index where the next pushed item lands
    pub fn tail(&self) -> u16 {
        ((self.head as u32 + self.count as u32) % self.capacity as u32) as u16
    }

    /// `count == capacity`
    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// `count == 0`
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Layout described by this header
    pub fn layout(&self) -> SegmentLayout {
        SegmentLayout {
            capacity: self.capacity as usize,
            element_width: self.element_width as usize,
        }
    }
}

/// Capacity and element width of a segment, the two inputs of every offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    /// Number of slots
    pub capacity: usize,
    /// Bytes per slot
    pub element_width: usize,
}

impl SegmentLayout {
    /// Layout with the element width supported by this build
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            element_width: ELEMENT_WIDTH,
        }
    }

    /// Total bytes: header plus storage
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.capacity * self.element_width
    }

    /// Byte offset of slot `index`. `index < capacity` is the caller's contract.
    #[inline]
    pub fn slot_offset(&self, index: usize) -> usize {
        debug_assert!(index < self.capacity);
        HEADER_SIZE + index * self.element_width
    }
}

/// Bytes needed for a segment of `capacity` single-byte slots
pub fn layout_size(capacity: usize) -> usize {
    SegmentLayout::new(capacity).size()
}

/// Byte offset of slot `index` in a segment of `capacity` single-byte slots
#[inline]
pub fn slot_offset(capacity: usize, index: usize) -> usize {
    SegmentLayout::new(capacity).slot_offset(index)
}

#[inline]
fn get_u16(segment: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([segment[offset], segment[offset + 1]])
}

#[inline]
fn put_u16(segment: &mut [u8], offset: usize, value: u16) {
    segment[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Decode and validate the header at the start of `segment`
pub fn read_header(segment: &[u8]) -> Result<SegmentHeader, HeaderFault> {
    if segment.len() < HEADER_SIZE {
        return Err(HeaderFault::TooShort { len: segment.len() });
    }
    if segment[OFF_MAGIC..OFF_VERSION] != CBUFF_MAGIC {
        return Err(HeaderFault::BadMagic);
    }

    let version = get_u16(segment, OFF_VERSION);
    if version != LAYOUT_VERSION {
        return Err(HeaderFault::VersionMismatch { found: version });
    }

    let header = SegmentHeader {
        element_width: get_u16(segment, OFF_WIDTH),
        capacity: get_u16(segment, OFF_CAPACITY),
        head: get_u16(segment, OFF_HEAD),
        count: get_u16(segment, OFF_COUNT),
        writer_attached: segment[OFF_WRITER] != 0,
        writer_pid: u32::from_le_bytes([
            segment[OFF_WRITER_PID],
            segment[OFF_WRITER_PID + 1],
            segment[OFF_WRITER_PID + 2],
            segment[OFF_WRITER_PID + 3],
        ]),
    };

    if header.element_width as usize != ELEMENT_WIDTH {
        return Err(HeaderFault::UnsupportedWidth {
            found: header.element_width,
        });
    }
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&(header.capacity as usize)) {
        return Err(HeaderFault::BadCapacity {
            found: header.capacity,
        });
    }
    if header.head >= header.capacity || header.count > header.capacity {
        return Err(HeaderFault::BadIndices {
            head: header.head,
            count: header.count,
            capacity: header.capacity,
        });
    }

    Ok(header)
}

/// Check that `actual` bytes match the size implied by `header`
pub fn validate_size(header: &SegmentHeader, actual: usize) -> Result<(), HeaderFault> {
    let expected = header.layout().size();
    if actual != expected {
        return Err(HeaderFault::SizeMismatch { expected, actual });
    }
    Ok(())
}

/// Write the header fields. The caller must hold the segment lock.
pub fn write_header(segment: &mut [u8], header: &SegmentHeader) {
    put_u16(segment, OFF_WIDTH, header.element_width);
    put_u16(segment, OFF_CAPACITY, header.capacity);
    put_u16(segment, OFF_HEAD, header.head);
    put_u16(segment, OFF_COUNT, header.count);
    segment[OFF_WRITER] = header.writer_attached as u8;
    segment[OFF_RESERVED] = 0;
    segment[OFF_WRITER_PID..OFF_PADDING].copy_from_slice(&header.writer_pid.to_le_bytes());
}

/// Stamp magic and version, then write the header fields
pub fn init_header(segment: &mut [u8], header: &SegmentHeader) {
    segment[OFF_MAGIC..OFF_VERSION].copy_from_slice(&CBUFF_MAGIC);
    put_u16(segment, OFF_VERSION, LAYOUT_VERSION);
    write_header(segment, header);
    segment[OFF_PADDING..HEADER_SIZE].fill(0);
}

/// Read the item stored in slot `index`
#[inline]
pub fn read_slot(segment: &[u8], layout: &SegmentLayout, index: usize) -> u8 {
    segment[layout.slot_offset(index)]
}

/// Store `item` in slot `index`
#[inline]
pub fn write_slot(segment: &mut [u8], layout: &SegmentLayout, index: usize, item: u8) {
    segment[layout.slot_offset(index)] = item;
}
