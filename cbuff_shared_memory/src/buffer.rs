//! Ring buffer controller over a shared memory segment
//!
//! One handle creates the segment and becomes its writer; any number of
//! handles in other processes attach to it. Every handle may pop, only the
//! writer may push or destroy. All header and slot accesses happen while the
//! segment lock is held.

use crate::error::{CbuffError, CbuffResult};
use crate::layout::{
    HeaderFault, SegmentHeader, SegmentLayout, init_header, read_header, read_slot,
    validate_size, write_header, write_slot,
};
use crate::lock::{SegmentLockGuard, lock};
use crate::platform::{SegmentAllocator, ShmDir, get_current_pid};
use cbuff::config::BufferConfig;
use cbuff::shm::consts::{DEFAULT_CAPACITY, HEADER_SIZE, MAX_CAPACITY, MIN_CAPACITY};
use memmap2::MmapMut;
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// How a handle joins a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Allocate a new segment and become its writer
    Create,
    /// Map an existing segment as a reader
    Attach,
    /// Map an existing segment and claim the vacant writer role
    AttachWriter,
}

/// Role of an open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// May push, pop and destroy
    Writer,
    /// May pop
    Reader,
}

/// Lifecycle state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Mapped and usable
    Open(Role),
    /// Unmapped, segment left in place
    Closed,
    /// Unmapped and segment unlinked
    Destroyed,
}

struct Mapping {
    file: File,
    mmap: MmapMut,
}

/// Builder for [`SharedCircularBuffer`] handles
#[derive(Debug, Clone)]
pub struct BufferOptions<A: SegmentAllocator = ShmDir> {
    allocator: A,
    lock_timeout: Option<Duration>,
}

impl BufferOptions<ShmDir> {
    /// Options using `/dev/shm` and unbounded lock waits
    pub fn new() -> Self {
        Self {
            allocator: ShmDir::default(),
            lock_timeout: None,
        }
    }

    /// Options built from construction parameters
    pub fn from_config(config: &BufferConfig) -> Self {
        let allocator = config
            .shm_dir
            .as_ref()
            .map(|root| ShmDir::new(root.clone()))
            .unwrap_or_default();

        Self {
            allocator,
            lock_timeout: config.lock_timeout(),
        }
    }
}

impl Default for BufferOptions<ShmDir> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SegmentAllocator> BufferOptions<A> {
    /// Use another region provider
    pub fn allocator<B: SegmentAllocator>(self, allocator: B) -> BufferOptions<B> {
        BufferOptions {
            allocator,
            lock_timeout: self.lock_timeout,
        }
    }

    /// Keep segment files under `root` instead of `/dev/shm`
    pub fn shm_dir(self, root: impl Into<PathBuf>) -> BufferOptions<ShmDir> {
        self.allocator(ShmDir::new(root))
    }

    /// Fail with `LockTimeout` instead of waiting forever for the segment lock
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Open `name` in `mode`. `capacity` is only read by `Create`.
    pub fn open(
        self,
        name: &str,
        mode: OpenMode,
        capacity: Option<usize>,
    ) -> CbuffResult<SharedCircularBuffer<A>> {
        match mode {
            OpenMode::Create => self.create(name, capacity.unwrap_or(DEFAULT_CAPACITY)),
            OpenMode::Attach => self.attach(name),
            OpenMode::AttachWriter => self.attach_writer(name),
        }
    }

    /// Allocate a new segment of `capacity` slots and become its writer
    pub fn create(self, name: &str, capacity: usize) -> CbuffResult<SharedCircularBuffer<A>> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(CbuffError::InvalidCapacity {
                capacity,
                min: MIN_CAPACITY,
                max: MAX_CAPACITY,
            });
        }

        let layout = SegmentLayout::new(capacity);
        let writer_pid = get_current_pid();

        // The allocator hands the file back already locked
        let file = self.allocator.create(name, layout.size())?;
        let mut mmap = match self.allocator.map(&file) {
            Ok(mmap) => mmap,
            Err(e) => {
                let _ = self.allocator.unlink(name);
                return Err(e);
            }
        };

        {
            let _guard = SegmentLockGuard::adopt(&file);
            init_header(&mut mmap, &SegmentHeader::new(capacity as u16, writer_pid));
        }

        info!(
            "Created circular buffer '{}' (capacity {}, {} bytes)",
            name,
            capacity,
            layout.size()
        );

        Ok(SharedCircularBuffer {
            name: name.to_string(),
            allocator: self.allocator,
            mapping: Some(Mapping { file, mmap }),
            layout,
            state: HandleState::Open(Role::Writer),
            lock_timeout: self.lock_timeout,
        })
    }

    /// Map an existing segment as a reader
    pub fn attach(self, name: &str) -> CbuffResult<SharedCircularBuffer<A>> {
        self.attach_as(name, Role::Reader)
    }

    /// Map an existing segment and claim its writer role.
    ///
    /// Fails with `WriterAlreadyActive` if another handle holds the role.
    pub fn attach_writer(self, name: &str) -> CbuffResult<SharedCircularBuffer<A>> {
        self.attach_as(name, Role::Writer)
    }

    fn attach_as(self, name: &str, role: Role) -> CbuffResult<SharedCircularBuffer<A>> {
        let file = self.allocator.open(name)?;

        let (mmap, header) = {
            let _guard = lock(&file, name, self.lock_timeout)?;

            let len = file.metadata()?.len() as usize;
            if len < HEADER_SIZE {
                return Err(CbuffError::corrupt(name, HeaderFault::TooShort { len }));
            }

            let mut mmap = self.allocator.map(&file)?;
            let mut header = read_header(&mmap).map_err(|f| CbuffError::corrupt(name, f))?;
            validate_size(&header, mmap.len()).map_err(|f| CbuffError::corrupt(name, f))?;

            if role == Role::Writer {
                if header.writer_attached {
                    warn!(
                        "Writer role on '{}' already held by pid {}",
                        name, header.writer_pid
                    );
                    return Err(CbuffError::WriterAlreadyActive {
                        name: name.to_string(),
                        pid: header.writer_pid,
                    });
                }
                header.writer_attached = true;
                header.writer_pid = get_current_pid();
                write_header(&mut mmap, &header);
            }

            (mmap, header)
        };

        info!(
            "Attached to circular buffer '{}' as {:?} (capacity {}, {} queued)",
            name, role, header.capacity, header.count
        );

        Ok(SharedCircularBuffer {
            name: name.to_string(),
            allocator: self.allocator,
            mapping: Some(Mapping { file, mmap }),
            layout: header.layout(),
            state: HandleState::Open(role),
            lock_timeout: self.lock_timeout,
        })
    }
}

/// Handle on a fixed-capacity byte ring stored in a named shared memory segment
pub struct SharedCircularBuffer<A: SegmentAllocator = ShmDir> {
    name: String,
    allocator: A,
    mapping: Option<Mapping>,
    layout: SegmentLayout,
    state: HandleState,
    lock_timeout: Option<Duration>,
}

impl SharedCircularBuffer<ShmDir> {
    /// Create segment `name` in `/dev/shm` with `capacity` slots
    pub fn create(name: &str, capacity: usize) -> CbuffResult<Self> {
        BufferOptions::new().create(name, capacity)
    }

    /// Attach to segment `name` in `/dev/shm` as a reader
    pub fn attach(name: &str) -> CbuffResult<Self> {
        BufferOptions::new().attach(name)
    }

    /// Attach to segment `name` in `/dev/shm` and claim the writer role
    pub fn attach_writer(name: &str) -> CbuffResult<Self> {
        BufferOptions::new().attach_writer(name)
    }

    /// Open `name` in `/dev/shm`. `capacity` is only read by `Create`.
    pub fn open(name: &str, mode: OpenMode, capacity: Option<usize>) -> CbuffResult<Self> {
        BufferOptions::new().open(name, mode, capacity)
    }

    /// Open a handle described by construction parameters
    pub fn from_config(config: &BufferConfig) -> CbuffResult<Self> {
        let mode = if config.create {
            OpenMode::Create
        } else if config.writer {
            OpenMode::AttachWriter
        } else {
            OpenMode::Attach
        };
        BufferOptions::from_config(config).open(&config.name, mode, Some(config.length))
    }
}

impl<A: SegmentAllocator> SharedCircularBuffer<A> {
    /// Segment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots, fixed at creation
    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Role of this handle; `HandleClosed` once closed or destroyed
    pub fn role(&self) -> CbuffResult<Role> {
        match self.state {
            HandleState::Open(role) => Ok(role),
            _ => Err(self.closed_error()),
        }
    }

    /// Whether this handle holds the writer role
    pub fn is_writer(&self) -> bool {
        self.state == HandleState::Open(Role::Writer)
    }

    /// Snapshot of the shared header
    pub fn header(&self) -> CbuffResult<SegmentHeader> {
        self.read_locked(|_, header| *header)
    }

    /// Number of queued items
    pub fn len(&self) -> CbuffResult<usize> {
        self.read_locked(|_, header| header.count as usize)
    }

    /// Whether no item is queued
    pub fn is_empty(&self) -> CbuffResult<bool> {
        self.read_locked(|_, header| header.is_empty())
    }

    /// Whether every slot is occupied
    pub fn is_full(&self) -> CbuffResult<bool> {
        self.read_locked(|_, header| header.is_full())
    }

    /// Fill level in percent
    pub fn usage_percent(&self) -> CbuffResult<f64> {
        let len = self.len()?;
        Ok(len as f64 / self.capacity() as f64 * 100.0)
    }

    /// Append `item` at the tail.
    ///
    /// Fails with `NotWriter` on a reader handle and with `BufferFull` when
    /// every slot is occupied; nothing is overwritten.
    pub fn push(&mut self, item: u8) -> CbuffResult<()> {
        if self.role()? != Role::Writer {
            return Err(CbuffError::NotWriter {
                name: self.name.clone(),
            });
        }

        self.modify_locked(|segment, header| {
            if header.is_full() {
                return Err(CbuffError::BufferFull {
                    capacity: header.capacity as usize,
                });
            }
            let tail = header.tail() as usize;
            write_slot(segment, &header.layout(), tail, item);
            header.count += 1;
            trace!("push {} at slot {} (count {})", item, tail, header.count);
            Ok(())
        })
    }

    /// Remove and return the oldest item. Fails with `BufferEmpty`.
    pub fn popitem(&mut self) -> CbuffResult<u8> {
        self.role()?;

        self.modify_locked(|segment, header| {
            if header.is_empty() {
                return Err(CbuffError::BufferEmpty);
            }
            Ok(pop_front(segment, header))
        })
    }

    /// Remove up to `n` of the oldest items, oldest first.
    ///
    /// Drains under a single lock acquisition. Returns fewer than `n` items
    /// (possibly none) when the buffer runs dry; that is not an error.
    pub fn popmany(&mut self, n: usize) -> CbuffResult<Vec<u8>> {
        self.role()?;

        self.modify_locked(|segment, header| {
            let take = n.min(header.count as usize);
            let mut items = Vec::with_capacity(take);
            for _ in 0..take {
                items.push(pop_front(segment, header));
            }
            Ok(items)
        })
    }

    /// Unmap the segment. A writer first gives up its role so a later
    /// `AttachWriter` can claim it. The segment itself stays allocated.
    ///
    /// Closing a closed handle is a no-op.
    pub fn close(&mut self) -> CbuffResult<()> {
        let role = match self.state {
            HandleState::Open(role) => role,
            _ => return Ok(()),
        };

        // The mapping goes away even if the role cannot be released
        let released = match role {
            Role::Writer => self.release_writer_role(),
            Role::Reader => Ok(()),
        };

        self.mapping = None;
        self.state = HandleState::Closed;
        debug!("Closed handle on '{}' ({:?})", self.name, role);
        released
    }

    /// Unlink the segment and unmap it. Writer only.
    ///
    /// Later attaches by any process fail with `NotFound`; handles that are
    /// already attached keep their mapping until they close.
    pub fn destroy(&mut self) -> CbuffResult<()> {
        if self.role()? != Role::Writer {
            return Err(CbuffError::NotWriter {
                name: self.name.clone(),
            });
        }

        self.release_writer_role()?;
        let unlinked = self.allocator.unlink(&self.name);

        self.mapping = None;
        self.state = HandleState::Destroyed;
        info!("Destroyed circular buffer '{}'", self.name);
        unlinked
    }

    fn release_writer_role(&mut self) -> CbuffResult<()> {
        self.modify_locked(|_, header| {
            header.writer_attached = false;
            Ok(())
        })
    }

    fn closed_error(&self) -> CbuffError {
        CbuffError::HandleClosed {
            name: self.name.clone(),
        }
    }

    /// Run `f` on the segment under the lock; header changes are written back
    fn modify_locked<T>(
        &mut self,
        f: impl FnOnce(&mut [u8], &mut SegmentHeader) -> CbuffResult<T>,
    ) -> CbuffResult<T> {
        let Some(mapping) = self.mapping.as_mut() else {
            return Err(CbuffError::HandleClosed {
                name: self.name.clone(),
            });
        };

        let _guard = lock(&mapping.file, &self.name, self.lock_timeout)?;
        let mut header = read_mapped_header(&self.name, &mapping.mmap)?;
        let before = header;

        let out = f(&mut mapping.mmap, &mut header)?;
        if header != before {
            write_header(&mut mapping.mmap, &header);
        }
        Ok(out)
    }

    /// Run `f` on the segment under the lock without modifying it
    fn read_locked<T>(&self, f: impl FnOnce(&[u8], &SegmentHeader) -> T) -> CbuffResult<T> {
        let mapping = self.mapping.as_ref().ok_or_else(|| self.closed_error())?;

        let _guard = lock(&mapping.file, &self.name, self.lock_timeout)?;
        let header = read_mapped_header(&self.name, &mapping.mmap)?;
        Ok(f(&mapping.mmap, &header))
    }
}

/// Decode the header and check it still matches the size of this mapping.
///
/// Another process may rewrite the header at any time; a capacity that no
/// longer fits the mapped region would send slot indices out of bounds.
fn read_mapped_header(name: &str, segment: &[u8]) -> CbuffResult<SegmentHeader> {
    let header = read_header(segment).map_err(|fault| CbuffError::corrupt(name, fault))?;
    validate_size(&header, segment.len()).map_err(|fault| CbuffError::corrupt(name, fault))?;
    Ok(header)
}

/// Take the item at `head` and advance. Caller checked `count > 0`.
fn pop_front(segment: &[u8], header: &mut SegmentHeader) -> u8 {
    let head = header.head as usize;
    let item = read_slot(segment, &header.layout(), head);
    header.head = ((head + 1) % header.capacity as usize) as u16;
    header.count -= 1;
    trace!("pop {} from slot {} (count {})", item, head, header.count);
    item
}

impl<A: SegmentAllocator> fmt::Display for SharedCircularBuffer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_writer() {
            return write!(f, "SharedCircularBuffer ({})", self.name);
        }
        match self.usage_percent() {
            Ok(percent) => write!(f, "SharedCircularBuffer ({}) ({:.2}% full)", self.name, percent),
            Err(_) => write!(f, "SharedCircularBuffer ({})", self.name),
        }
    }
}

impl<A: SegmentAllocator> fmt::Debug for SharedCircularBuffer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCircularBuffer")
            .field("name", &self.name)
            .field("capacity", &self.layout.capacity)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<A: SegmentAllocator> Drop for SharedCircularBuffer<A> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close handle on '{}': {}", self.name, e);
        }
    }
}
