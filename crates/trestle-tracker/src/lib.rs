#![forbid(unsafe_code)]
//! Incremental build state tracking for trestle.
//!
//! A [`BuildContext`] records which input resources produced which output
//! resources, detects staleness through cheap file fingerprints, carries
//! unchanged work forward across builds, and cleans up outputs whose inputs
//! have gone away. State is persisted between builds as a versioned,
//! checksummed snapshot; a missing or damaged snapshot simply means the
//! next build is a full one.

pub mod context;
pub mod error;
pub mod filestate;
pub mod matcher;
pub mod sink;
pub mod snapshot;
pub mod state;
pub mod workspace;

pub use context::{BuildContext, InputMetadata, OutputMetadata};
pub use error::TrackerError;
pub use filestate::{FileState, FileTime};
pub use matcher::FileMatcher;
pub use sink::{NullSink, Sink};
pub use state::{BuildState, Message, Severity};
pub use workspace::{escalate, FilesystemWorkspace, Mode, Status, WalkEntry, Workspace};
