use thiserror::Error;

/// Errors produced while establishing the channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The configured endpoint is not a `ws://`/`wss://` URL.
    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    /// URL parsing failure.
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Handshake or transport failure from the websocket stack.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChannelError>;
