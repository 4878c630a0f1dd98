//! The diagnostics sink notified at commit.

use std::path::Path;

use crate::state::Message;

/// Receives diagnostic state changes when a build commits.
///
/// An embedding build system implements this to mirror tracker messages
/// into its own problem markers: `clear` drops stale markers for a resource
/// that was reprocessed or removed, `messages` delivers the messages now
/// attached to a resource, with `replayed = true` when they were carried
/// forward from a previous build rather than produced by this one.
pub trait Sink {
    fn clear(&mut self, path: &Path);

    fn messages(&mut self, path: &Path, replayed: bool, messages: &[Message]);
}

/// A sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn clear(&mut self, _path: &Path) {}

    fn messages(&mut self, _path: &Path, _replayed: bool, _messages: &[Message]) {}
}
