//! Segment discovery and inspection

use crate::buffer::BufferOptions;
use crate::error::CbuffResult;
use crate::platform::{ShmDir, is_process_alive};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Snapshot of one segment's header
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment name
    pub name: String,
    /// Number of slots
    pub capacity: usize,
    /// Number of queued items
    pub len: usize,
    /// Index of the oldest item
    pub head: usize,
    /// Whether the writer role is held
    pub writer_attached: bool,
    /// Process that last claimed the writer role
    pub writer_pid: u32,
    /// Whether that process still exists
    pub writer_alive: bool,
    /// Total segment size in bytes
    pub size_bytes: usize,
}

impl SegmentInfo {
    /// Writer role is held by a process that no longer exists.
    ///
    /// This happens when a writer dies without closing. Nothing clears the
    /// flag automatically; the segment has to be destroyed and recreated.
    pub fn has_stale_writer(&self) -> bool {
        self.writer_attached && !self.writer_alive
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> CbuffResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Read-only view over the segments of one directory
#[derive(Debug, Clone, Default)]
pub struct SegmentDiscovery {
    shm: ShmDir,
    lock_timeout: Option<Duration>,
}

impl SegmentDiscovery {
    /// Discovery over `/dev/shm`
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovery over another segment directory
    pub fn with_dir(shm: ShmDir) -> Self {
        Self {
            shm,
            lock_timeout: None,
        }
    }

    /// Bound the wait for each segment's lock
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Header snapshot of segment `name`
    pub fn inspect(&self, name: &str) -> CbuffResult<SegmentInfo> {
        let mut options = BufferOptions::new().allocator(self.shm.clone());
        if let Some(timeout) = self.lock_timeout {
            options = options.lock_timeout(timeout);
        }

        let mut reader = options.attach(name)?;
        let header = reader.header()?;
        reader.close()?;

        Ok(SegmentInfo {
            name: name.to_string(),
            capacity: header.capacity as usize,
            len: header.count as usize,
            head: header.head as usize,
            writer_attached: header.writer_attached,
            writer_pid: header.writer_pid,
            writer_alive: is_process_alive(header.writer_pid),
            size_bytes: header.layout().size(),
        })
    }

    /// Snapshots of every valid segment, sorted by name.
    ///
    /// Entries that vanish or fail validation while scanning are skipped.
    pub fn list(&self) -> CbuffResult<Vec<SegmentInfo>> {
        let mut segments = Vec::new();
        for name in self.shm.list_names()? {
            match self.inspect(&name) {
                Ok(info) => segments.push(info),
                Err(e) => tracing::debug!("Skipping segment '{}': {}", name, e),
            }
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CbuffError;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_reports_header() {
        let dir = TempDir::new().unwrap();
        let mut writer = BufferOptions::new()
            .shm_dir(dir.path())
            .create("seen", 4)
            .unwrap();
        writer.push(1).unwrap();
        writer.push(2).unwrap();

        let discovery = SegmentDiscovery::with_dir(ShmDir::new(dir.path()));
        let info = discovery.inspect("seen").unwrap();

        assert_eq!(info.capacity, 4);
        assert_eq!(info.len, 2);
        assert_eq!(info.head, 0);
        assert!(info.writer_attached);
        assert!(info.writer_alive);
        assert!(!info.has_stale_writer());
        assert_eq!(info.size_bytes, crate::layout::layout_size(4));

        // Inspection must not consume items
        assert_eq!(writer.len().unwrap(), 2);
    }

    #[test]
    fn test_list_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let _a = BufferOptions::new().shm_dir(dir.path()).create("a", 2).unwrap();
        let _b = BufferOptions::new().shm_dir(dir.path()).create("b", 3).unwrap();
        std::fs::write(dir.path().join("cbuff_junk"), b"not a buffer").unwrap();

        let discovery = SegmentDiscovery::with_dir(ShmDir::new(dir.path()));
        let names: Vec<_> = discovery
            .list()
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_inspect_missing() {
        let dir = TempDir::new().unwrap();
        let discovery = SegmentDiscovery::with_dir(ShmDir::new(dir.path()));
        assert!(matches!(
            discovery.inspect("missing"),
            Err(CbuffError::NotFound { .. })
        ));
    }

    #[test]
    fn test_json() {
        let info = SegmentInfo {
            name: "b".to_string(),
            capacity: 5,
            len: 1,
            head: 0,
            writer_attached: true,
            writer_pid: 0,
            writer_alive: false,
            size_bytes: 37,
        };
        assert!(info.has_stale_writer());
        let json = info.to_json().unwrap();
        let back: SegmentInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
