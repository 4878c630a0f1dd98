//! File fingerprints: cheap structural change detection.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::workspace::Status;

/// A file modification timestamp as whole seconds plus nanoseconds since
/// the Unix epoch. Kept as a plain pair so the persisted form is explicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTime {
    pub secs: u64,
    pub nanos: u32,
}

impl From<SystemTime> for FileTime {
    fn from(time: SystemTime) -> Self {
        // Timestamps before the epoch collapse to zero, same as the
        // sentinel for an absent file.
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                secs: d.as_secs(),
                nanos: d.subsec_nanos(),
            },
            Err(_) => Self::default(),
        }
    }
}

/// A (path, timestamp, size) structural fingerprint.
///
/// Two states are equal iff all three fields match. This is a cheap proxy
/// for "unchanged", not a content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub path: PathBuf,
    pub last_modified: FileTime,
    pub size: u64,
}

impl FileState {
    /// Fingerprint a file as it currently exists on disk. A missing path or
    /// a non-regular file yields the absent sentinel rather than an error.
    pub fn read(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Self {
                path: path.to_path_buf(),
                last_modified: meta.modified().map(FileTime::from).unwrap_or_default(),
                size: meta.len(),
            },
            _ => Self::absent(path),
        }
    }

    /// The sentinel fingerprint for a file that does not exist.
    pub fn absent(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_modified: FileTime::default(),
            size: 0,
        }
    }

    /// Whether this fingerprint is the absent sentinel.
    pub fn is_absent(&self) -> bool {
        self.last_modified == FileTime::default() && self.size == 0
    }

    /// Compare this recorded fingerprint against the live filesystem.
    ///
    /// Reads the disk directly rather than going through a workspace, so an
    /// escalated workspace cannot influence the answer. Used by the commit
    /// consistency check.
    pub fn status_on_disk(&self) -> Status {
        let live = Self::read(&self.path);
        if live.is_absent() {
            if self.is_absent() {
                Status::Unmodified
            } else {
                Status::Removed
            }
        } else if live == *self {
            Status::Unmodified
        } else {
            Status::Modified
        }
    }
}
