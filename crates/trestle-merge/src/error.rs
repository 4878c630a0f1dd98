//! Error types for trestle-merge.

/// Errors produced by the merge engine.
///
/// Merging itself is total: ambiguous or malformed combination directives
/// degrade to safe defaults rather than failing, because configuration
/// trees are user-authored. Only the XML wire format can reject input.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The configuration XML could not be parsed.
    #[error("invalid configuration XML: {source}")]
    Xml {
        #[from]
        source: roxmltree::Error,
    },
}
