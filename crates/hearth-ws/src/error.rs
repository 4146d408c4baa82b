//! WebSocket upgrade errors.

use thiserror::Error;

/// Reasons an upgrade request is rejected before any frames flow.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("upgrade requests must use GET, got {0}")]
    WrongMethod(String),

    #[error("not a websocket upgrade request")]
    NotAnUpgrade,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("unsupported Sec-WebSocket-Version: {0}")]
    UnsupportedVersion(String),
}
