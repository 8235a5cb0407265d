//! Cross-process segment lock
//!
//! The lock is an exclusive `flock(2)` on the segment's backing file. Each
//! handle opens its own file description, so the lock serializes handles in
//! different processes as well as separate handles inside one process. The
//! kernel drops it when the holder exits, crashed or not.

use crate::error::{CbuffError, CbuffResult};
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{Ordering, fence};
use std::time::{Duration, Instant};

/// Poll interval while waiting for a contended lock with a timeout
const LOCK_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Held segment lock, released on drop
#[must_use = "the segment is unlocked as soon as the guard is dropped"]
pub struct SegmentLockGuard<'a> {
    file: &'a File,
}

impl<'a> SegmentLockGuard<'a> {
    /// Take over a lock already acquired on `file` (see [`acquire_raw`])
    pub(crate) fn adopt(file: &'a File) -> Self {
        fence(Ordering::SeqCst);
        Self { file }
    }
}

impl Drop for SegmentLockGuard<'_> {
    fn drop(&mut self) {
        // Publish every header and slot store before other processes get in
        fence(Ordering::SeqCst);
        if unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) } != 0 {
            tracing::warn!(
                "Failed to release segment lock: {}",
                io::Error::last_os_error()
            );
        }
    }
}

fn try_flock(file: &File, operation: libc::c_int) -> io::Result<bool> {
    loop {
        if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EWOULDBLOCK) => return Ok(false),
            _ => return Err(err),
        }
    }
}

/// Block until the exclusive lock on `file` is held
pub(crate) fn acquire_raw(file: &File) -> io::Result<()> {
    try_flock(file, libc::LOCK_EX).map(|_| ())
}

/// Acquire the segment lock, waiting at most `timeout` when one is given
pub fn lock<'a>(
    file: &'a File,
    name: &str,
    timeout: Option<Duration>,
) -> CbuffResult<SegmentLockGuard<'a>> {
    match timeout {
        None => acquire_raw(file)?,
        Some(timeout) => {
            let deadline = Instant::now() + timeout;
            while !try_flock(file, libc::LOCK_EX | libc::LOCK_NB)? {
                if Instant::now() >= deadline {
                    return Err(CbuffError::LockTimeout {
                        name: name.to_string(),
                        timeout,
                    });
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
        }
    }
    Ok(SegmentLockGuard::adopt(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_lock_excludes_second_description() {
        let tmp = NamedTempFile::new().unwrap();
        let first = File::open(tmp.path()).unwrap();
        let second = File::open(tmp.path()).unwrap();

        let guard = lock(&first, "t", None).unwrap();
        let contended = lock(&second, "t", Some(Duration::from_millis(5)));
        assert!(matches!(contended, Err(CbuffError::LockTimeout { .. })));

        drop(guard);
        assert!(lock(&second, "t", Some(Duration::from_millis(5))).is_ok());
    }

    #[test]
    fn test_adopted_lock_is_released_on_drop() {
        let tmp = NamedTempFile::new().unwrap();
        let first = File::open(tmp.path()).unwrap();
        let second = File::open(tmp.path()).unwrap();

        acquire_raw(&first).unwrap();
        {
            let _guard = SegmentLockGuard::adopt(&first);
            assert!(!try_flock(&second, libc::LOCK_EX | libc::LOCK_NB).unwrap());
        }
        assert!(try_flock(&second, libc::LOCK_EX | libc::LOCK_NB).unwrap());
    }
}
