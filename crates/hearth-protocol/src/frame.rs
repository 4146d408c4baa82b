//! RFC 6455 frame codec.
//!
//! The decoder is incremental: the receive loop feeds it raw reads of up to
//! [`RECV_BUFFER_SIZE`] bytes and drains complete frames as they become
//! available. Client-to-server frames arrive masked and are unmasked in
//! place; server-to-client frames are emitted unmasked.

use bytes::{Buf, BytesMut};

use crate::error::FrameError;

/// Size of each read from the transport into the decoder.
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Largest single-frame payload the decoder accepts. Message-level limits
/// are enforced by the connection's accumulator, not here.
const MAX_FRAME_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Close status codes used by this server.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_bits(bits: u8) -> Result<Opcode, FrameError> {
        match bits {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }

    fn bits(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    pub fn is_data(self) -> bool {
        !self.is_control()
    }
}

/// One decoded (or to-be-encoded) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn text(text: &str) -> Frame {
        Frame {
            fin: true,
            opcode: Opcode::Text,
            payload: text.as_bytes().to_vec(),
        }
    }

    pub fn binary(payload: Vec<u8>) -> Frame {
        Frame {
            fin: true,
            opcode: Opcode::Binary,
            payload,
        }
    }

    pub fn ping() -> Frame {
        Frame {
            fin: true,
            opcode: Opcode::Ping,
            payload: Vec::new(),
        }
    }

    pub fn pong(payload: Vec<u8>) -> Frame {
        Frame {
            fin: true,
            opcode: Opcode::Pong,
            payload,
        }
    }

    /// Close frame: two-byte big-endian status code plus a UTF-8 reason.
    pub fn close(code: u16, reason: &str) -> Frame {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Frame {
            fin: true,
            opcode: Opcode::Close,
            payload,
        }
    }

    /// Status code of a close frame, if present.
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Reason text of a close frame, if present and valid UTF-8.
    pub fn close_reason(&self) -> Option<&str> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        std::str::from_utf8(&self.payload[2..]).ok()
    }
}

/// Serialize a frame for the server-to-client direction (never masked).
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let len = frame.payload.len();
    let mut out = Vec::with_capacity(len + 10);

    let b0 = if frame.fin { 0x80 } else { 0x00 } | frame.opcode.bits();
    out.push(b0);

    if len < 126 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(&frame.payload);
    out
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to decode the next complete frame. `Ok(None)` means more bytes
    /// are needed; nothing is consumed until a whole frame is available.
    pub fn next(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }

        let b0 = self.buf[0];
        let b1 = self.buf[1];

        if b0 & 0x70 != 0 {
            return Err(FrameError::ReservedBits);
        }
        let fin = b0 & 0x80 != 0;
        let opcode = Opcode::from_bits(b0 & 0x0F)?;

        let masked = b1 & 0x80 != 0;
        let len7 = (b1 & 0x7F) as u64;

        let (payload_len, len_bytes) = match len7 {
            126 => {
                if self.buf.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([self.buf[2], self.buf[3]])), 2)
            }
            127 => {
                if self.buf.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&self.buf[2..10]);
                (u64::from_be_bytes(raw), 8)
            }
            n => (n, 0),
        };

        if opcode.is_control() && payload_len > 125 {
            return Err(FrameError::ControlTooLong(payload_len as usize));
        }
        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(FrameError::PayloadTooLong(payload_len));
        }

        let mask_bytes = if masked { 4 } else { 0 };
        let header_len = 2 + len_bytes + mask_bytes;
        let total = header_len + payload_len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let mut mask = [0u8; 4];
        if masked {
            mask.copy_from_slice(&self.buf[2 + len_bytes..2 + len_bytes + 4]);
        }

        self.buf.advance(header_len);
        let mut payload = self.buf.split_to(payload_len as usize).to_vec();
        if masked {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= mask[i % 4];
            }
        }

        Ok(Some(Frame {
            fin,
            opcode,
            payload,
        }))
    }
}
