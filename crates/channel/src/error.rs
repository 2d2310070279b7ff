use std::time::Duration;

/// Errors produced while opening or running a channel connection.
///
/// None of these reach the caller of [`crate::RealtimeChannel`] directly;
/// the connection task reports them through the `error` event.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
