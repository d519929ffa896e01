use thiserror::Error;

/// Errors surfaced by the HTTP gateway.
///
/// `SessionExpired` means the store has been cleared and the caller should
/// route the user back to the landing screen.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing/expired credentials that a refresh could not recover.
    #[error("Session expired, please sign in again")]
    SessionExpired,

    /// The requested resource does not exist (HTTP 404).
    #[error("Not found")]
    NotFound,

    /// The server rejected the request and said why (HTTP 400).
    #[error("{0}")]
    BadRequest(String),

    /// Any other non-success status.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The backend was unreachable or the connection broke.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A response body that does not match the expected shape.
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Session store failure while reading or writing tokens.
    #[error("Store error: {0}")]
    Store(#[from] palaver_store::StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;
