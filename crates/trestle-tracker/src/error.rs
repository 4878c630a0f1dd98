//! Error types for trestle-tracker.

/// Errors produced by the incremental build tracker.
///
/// Consistency violations (double registration, role conflicts, mutating a
/// closed context) indicate a caller bug and are fatal to the build; they
/// are still surfaced as `Err` so the driver can report them. I/O failures
/// carry the offending path. A missing or corrupt state snapshot is NOT an
/// error — it degrades to an empty state and a full rebuild.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// A filesystem operation failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// An input was registered for a file that does not exist.
    #[error("input does not exist: {path}")]
    ResourceNotFound { path: String },

    /// A path already registered as an output was registered as an input.
    #[error("resource is already registered as an output: {path}")]
    AlreadyRegisteredAsOutput { path: String },

    /// A path already registered as a plain input was processed as an output.
    #[error("resource is already registered as an input: {path}")]
    AlreadyRegisteredAsInput { path: String },

    /// An output path was registered more than once in one build.
    #[error("output is already registered: {path}")]
    OutputAlreadyRegistered { path: String },

    /// An association was attempted with an input that is itself an output.
    #[error("cannot associate an output as an input: {path}")]
    InputIsOutput { path: String },

    /// An output was associated with a second, different set of inputs.
    #[error("output is already associated with a different input set: {path}")]
    OutputInputsConflict { path: String },

    /// An include or exclude pattern could not be compiled.
    #[error("invalid pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// The context was mutated after commit or skip.
    #[error("build context is closed")]
    ContextClosed,

    /// Skip execution was requested after a resource had been processed.
    #[error("cannot skip execution after processing has started")]
    SkipAfterProcessing,

    /// A registered input changed on disk between registration and commit.
    #[error("input changed during the build: {path}")]
    UnexpectedInputChange { path: String },

    /// The committed state is internally inconsistent.
    #[error("inconsistent resource state for {path}: {detail}")]
    InconsistentResourceState { path: String, detail: String },

    /// The state snapshot could not be encoded.
    #[error("cannot serialize build state: {message}")]
    Snapshot { message: String },

    /// Error-severity diagnostics were reported and fail-on-error is set.
    #[error("build failed with {count} error message(s)")]
    ErrorsReported { count: usize },
}

impl From<trestle_util::error::UtilError> for TrackerError {
    fn from(err: trestle_util::error::UtilError) -> Self {
        match err {
            trestle_util::error::UtilError::Io { path, source } => Self::Io { path, source },
        }
    }
}
