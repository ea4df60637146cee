use thiserror::Error;

/// Errors returned by clustering algorithms and tasks in this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input collection is empty.
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// Tuples in a collection have inconsistent length.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected tuple length.
        expected: usize,
        /// Found tuple length.
        found: usize,
    },

    /// A tuple index outside `[0, len)`.
    #[error("tuple index {index} out of bounds for {len} tuples")]
    IndexOutOfBounds {
        /// Offending index.
        index: usize,
        /// Number of tuples.
        len: usize,
    },

    /// A numeric update produced NaN or infinity.
    #[error("non-finite value produced during {stage}")]
    NonFinite {
        /// Stage of the computation that failed.
        stage: &'static str,
    },

    /// A worker partition panicked.
    #[error("worker partition {start}..{end} failed: {message}")]
    WorkerFailed {
        /// First index of the partition.
        start: usize,
        /// One past the last index of the partition.
        end: usize,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// The worker pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(String),

    /// An operation was invoked in a state that does not allow it.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// The run was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the cancellation signal, which is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn invalid(name: &'static str, message: &'static str) -> Self {
        Error::InvalidParameter { name, message }
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Error::ThreadPool(e.to_string())
    }
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
