//! Error types shared by the data manager, the readers and the AMR tree.

use thiserror::Error;

/// Result type alias using GridError.
pub type Result<T> = std::result::Result<T, GridError>;

/// Primary error type for grid data operations.
#[derive(Debug, Error)]
pub enum GridError {
    /// Backend open/read failure or filesystem error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Corrupt or unreadable persisted tree or metadata.
    #[error("format error: {0}")]
    Format(String),

    /// The request cannot fit in the memory budget even after evicting
    /// every evictable cache entry.
    #[error("region of {requested} bytes does not fit in a cache budget of {budget} bytes ({pinned} bytes pinned)")]
    Capacity {
        requested: usize,
        budget: usize,
        pinned: usize,
    },

    /// Unknown variable, timestep or cell id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed block range, illegal mutation or out-of-domain coordinate.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl GridError {
    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Short, stable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            GridError::Io(_) => "IOError",
            GridError::Format(_) => "FormatError",
            GridError::Capacity { .. } => "CapacityError",
            GridError::NotFound(_) => "NotFoundError",
            GridError::InvalidArgument(_) => "InvalidArgument",
        }
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Format(format!("JSON error: {}", err))
    }
}
