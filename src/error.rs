use thiserror::Error;

/// Errors crossing subsystem boundaries. Route handlers map these onto
/// HTTP statuses or WebSocket close codes; background loops log and
/// continue per the propagation policy (no error in one room or client
/// escapes to another).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Invalid, missing or expired bearer token. Terminal for the connection.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Bus publish/consume failure. Retryable.
    #[error("bus error: {0}")]
    Bus(#[from] lapin::Error),

    /// Tail cache failure. Advisory only.
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Durable store failure. The digestion batch is retained and retried.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Malformed incoming frame or payload. The frame is dropped.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
