//! One upgraded connection.
//!
//! A `SocketConnection` owns the write half of the transport behind an async
//! mutex; the read half stays with the receive loop. State transitions are
//! `Connecting → Open → Closing → Closed` and only ever move forward.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use hearth_protocol::frame::{encode_frame, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SocketState {
    fn from_u8(value: u8) -> SocketState {
        match value {
            0 => SocketState::Connecting,
            1 => SocketState::Open,
            2 => SocketState::Closing,
            _ => SocketState::Closed,
        }
    }
}

pub struct SocketConnection {
    id: Uuid,
    peer: SocketAddr,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    state: AtomicU8,
    /// Guards the disconnect callback: whichever path observes the close
    /// first (receive loop, reaper, or disposal) fires it, the rest skip.
    disconnect_fired: AtomicBool,
}

impl SocketConnection {
    pub fn new(peer: SocketAddr, writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            writer: Mutex::new(writer),
            state: AtomicU8::new(SocketState::Connecting as u8),
            disconnect_fired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SocketState {
        SocketState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SocketState::Open
    }

    pub(crate) fn set_state(&self, state: SocketState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Force the terminal state without a close handshake. Used when the
    /// transport is already gone.
    pub(crate) fn mark_closed(&self) {
        self.set_state(SocketState::Closed);
    }

    /// Returns true exactly once per connection; the caller that gets true
    /// owns firing the disconnect callback.
    pub(crate) fn take_disconnect(&self) -> bool {
        !self.disconnect_fired.swap(true, Ordering::SeqCst)
    }

    /// Write one frame. Errors are surfaced so broadcast can report them;
    /// fire-and-forget callers log and move on.
    pub async fn send_frame(&self, frame: &Frame) -> std::io::Result<()> {
        let bytes = encode_frame(frame);
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await
    }

    pub async fn send_text(&self, text: &str) -> std::io::Result<()> {
        self.send_frame(&Frame::text(text)).await
    }

    pub async fn send_binary(&self, payload: Vec<u8>) -> std::io::Result<()> {
        self.send_frame(&Frame::binary(payload)).await
    }

    /// Best-effort close handshake: send a close frame and mark the
    /// connection closed. Send failures only mean the peer is already gone.
    pub async fn close(&self, code: u16, reason: &str) {
        if self.state() == SocketState::Closed {
            return;
        }
        self.set_state(SocketState::Closing);
        if let Err(e) = self.send_frame(&Frame::close(code, reason)).await {
            debug!("Close frame to {} not delivered: {e}", self.id);
        }
        self.set_state(SocketState::Closed);
    }
}

impl std::fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
