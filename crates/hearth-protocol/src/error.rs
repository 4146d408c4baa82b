//! Protocol error types.

use thiserror::Error;

/// Errors raised while reading or parsing an HTTP request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),
}

impl ProtocolError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }
}

/// Errors raised by the WebSocket frame decoder.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("reserved bits set in frame header")]
    ReservedBits,

    #[error("unknown opcode: {0:#x}")]
    UnknownOpcode(u8),

    #[error("control frame payload exceeds 125 bytes ({0})")]
    ControlTooLong(usize),

    #[error("frame payload length {0} exceeds the decoder limit")]
    PayloadTooLong(u64),
}
