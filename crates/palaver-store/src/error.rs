use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Generic I/O error (reading or writing the session file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The session file exists but does not parse.
    #[error("Session file corrupt: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// A previous holder of the store lock panicked.
    #[error("Session store lock poisoned")]
    Poisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
