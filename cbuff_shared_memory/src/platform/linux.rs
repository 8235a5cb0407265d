//! Linux-specific shared memory operations

use crate::error::{CbuffError, CbuffResult};
use crate::lock;
use crate::platform::SegmentAllocator;
use cbuff::shm::consts::{SHM_DIR, SHM_PREFIX};
use cbuff::shm::is_valid_segment_name;
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

static STAGING_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Segments stored as files in a tmpfs directory, `/dev/shm` by default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmDir {
    root: PathBuf,
}

impl ShmDir {
    /// Allocator rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the segment files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backing file path of segment `name`
    pub fn path(&self, name: &str) -> CbuffResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(format!("{SHM_PREFIX}{name}")))
    }

    /// Names of all segments present in the directory, sorted
    pub fn list_names(&self) -> CbuffResult<Vec<String>> {
        let mut names = Vec::new();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        for entry in entries.flatten() {
            if let Ok(file_name) = entry.file_name().into_string() {
                if let Some(name) = file_name.strip_prefix(SHM_PREFIX) {
                    if validate_name(name).is_ok() {
                        names.push(name.to_string());
                    }
                }
            }
        }

        names.sort();
        Ok(names)
    }

    fn staging_path(&self, name: &str) -> PathBuf {
        let seq = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{SHM_PREFIX}{name}.{}.{seq}", get_current_pid()))
    }
}

impl Default for ShmDir {
    fn default() -> Self {
        Self::new(SHM_DIR)
    }
}

impl SegmentAllocator for ShmDir {
    fn create(&self, name: &str, size: usize) -> CbuffResult<File> {
        let path = self.path(name)?;
        if path.exists() {
            return Err(CbuffError::AlreadyExists {
                name: name.to_string(),
            });
        }

        // Size and lock the file under a private name, then publish it with
        // link(2), which fails atomically if the name was taken meanwhile.
        let staging = self.staging_path(name);
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .mode(0o600) // Owner read/write only
            .open(&staging)?;

        let published = file
            .set_len(size as u64)
            .and_then(|()| lock::acquire_raw(&file))
            .and_then(|()| std::fs::hard_link(&staging, &path));
        let _ = std::fs::remove_file(&staging);

        match published {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(CbuffError::AlreadyExists {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn open(&self, name: &str) -> CbuffResult<File> {
        let path = self.path(name)?;
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CbuffError::NotFound {
                    name: name.to_string(),
                },
                _ => e.into(),
            })
    }

    fn map(&self, file: &File) -> CbuffResult<MmapMut> {
        let mmap = unsafe { MmapOptions::new().map_mut(file)? };
        Ok(mmap)
    }

    fn unlink(&self, name: &str) -> CbuffResult<()> {
        let path = self.path(name)?;
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CbuffError::NotFound {
                name: name.to_string(),
            },
            _ => e.into(),
        })
    }
}

/// Reject names that cannot be a single path component
pub fn validate_name(name: &str) -> CbuffResult<()> {
    if !is_valid_segment_name(name) {
        return Err(CbuffError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if pid == 0 {
            return false;
        }

        // Null signal tests for existence without delivering anything
        match kill(Pid::from_raw(pid as i32), None) {
            Ok(_) => true,
            Err(nix::Error::ESRCH) => false, // No such process
            Err(nix::Error::EPERM) => true,  // Process exists but no permission to signal
            Err(_) => false,
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        false
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
