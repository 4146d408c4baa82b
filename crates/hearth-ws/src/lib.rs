//! Hearth persistent-connection server.
//!
//! Implements the WebSocket side of the server: the upgrade handshake, the
//! per-connection receive loop, the mutex-guarded live-connection set, the
//! background reaper, and fire-and-forget send/broadcast. The HTTP layer
//! hands a connection over through the [`SocketEndpoint`] trait once the
//! dispatcher sees an upgrade request on a registered socket path.

pub mod connection;
pub mod error;
pub mod handshake;
pub mod server;

pub use connection::{SocketConnection, SocketState};
pub use error::HandshakeError;
pub use server::{
    BroadcastReport, SendFailure, SocketEndpoint, SocketHandler, SocketServer,
    SocketServerConfig, PING_INTERVAL, REAP_INTERVAL,
};
