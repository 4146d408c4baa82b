//! The persistent-connection server.
//!
//! A `SocketServer` owns the live-connection set for one upgrade path, runs
//! a receive loop per connection, and reaps connections that died without a
//! close handshake. The HTTP layer talks to it through the object-safe
//! [`SocketEndpoint`] trait so differently-typed servers can share one
//! registration table.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hearth_protocol::frame::{close_code, Frame, FrameDecoder, Opcode, RECV_BUFFER_SIZE};
use hearth_protocol::{Request, Response};

use crate::connection::{SocketConnection, SocketState};
use crate::handshake;

/// Reaper wake interval. Fixed, not per-connection configurable.
pub const REAP_INTERVAL: Duration = Duration::from_secs(30);
/// Keep-alive ping interval per connection.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Per-connection and per-server callbacks a concrete socket server
/// implements. All methods default to no-ops except `server_name`, which is
/// used in logs only.
pub trait SocketHandler: Send + Sync + 'static {
    fn server_name(&self) -> &str;

    fn on_client_connected(
        &self,
        connection: &Arc<SocketConnection>,
    ) -> impl Future<Output = ()> + Send {
        let _ = connection;
        async {}
    }

    /// Fires for every decoded frame, complete message or not.
    fn on_frame_received(
        &self,
        connection: &Arc<SocketConnection>,
        frame: &[u8],
    ) -> impl Future<Output = ()> + Send {
        let _ = (connection, frame);
        async {}
    }

    /// Fires once per complete message with the accumulated payload.
    fn on_message_received(
        &self,
        connection: &Arc<SocketConnection>,
        message: &[u8],
    ) -> impl Future<Output = ()> + Send {
        let _ = (connection, message);
        async {}
    }

    fn on_client_disconnected(
        &self,
        connection: &Arc<SocketConnection>,
    ) -> impl Future<Output = ()> + Send {
        let _ = connection;
        async {}
    }
}

#[derive(Debug, Clone)]
pub struct SocketServerConfig {
    /// Maximum accumulated message size in bytes (0 = unlimited). The
    /// accumulator check in the receive loop is the only inbound size
    /// enforcement point.
    pub max_message_size: usize,
    /// Whether the background reaper runs for this server.
    pub reaper_enabled: bool,
}

impl Default for SocketServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: 0,
            reaper_enabled: true,
        }
    }
}

/// Outcome of a broadcast. Send failures are collected per connection
/// instead of aborting the remaining sends.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failures: Vec<SendFailure>,
}

#[derive(Debug)]
pub struct SendFailure {
    pub connection: Uuid,
    pub error: String,
}

/// One persistent-connection server bound to one upgrade path.
pub struct SocketServer<H: SocketHandler> {
    handler: H,
    config: SocketServerConfig,
    /// Live-connection set. The only lock in the server; iteration for
    /// broadcast and reaping snapshots the set and releases it before any
    /// send.
    live: Mutex<Vec<Arc<SocketConnection>>>,
    disposed: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<H: SocketHandler> SocketServer<H> {
    pub fn new(handler: H) -> Arc<Self> {
        Self::with_config(handler, SocketServerConfig::default())
    }

    pub fn with_config(handler: H, config: SocketServerConfig) -> Arc<Self> {
        Arc::new(Self {
            handler,
            config,
            live: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            reaper: Mutex::new(None),
        })
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn connection_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Point-in-time copy of the live set.
    pub fn connections(&self) -> Vec<Arc<SocketConnection>> {
        self.live.lock().clone()
    }

    /// Remove every connection that is no longer open and fire its
    /// disconnect callback. The reaper calls this every [`REAP_INTERVAL`];
    /// it also runs opportunistically before each new connection is added.
    pub async fn sweep(&self) {
        let stale: Vec<Arc<SocketConnection>> = {
            let mut live = self.live.lock();
            let (open, stale): (Vec<_>, Vec<_>) = live.drain(..).partition(|c| c.is_open());
            *live = open;
            stale
        };
        for conn in stale {
            debug!(
                "Reaping connection {} ({})",
                conn.id(),
                self.handler.server_name()
            );
            conn.mark_closed();
            self.finish_disconnect(&conn).await;
        }
    }

    /// Send to one connection, fire-and-forget. Failures are logged only.
    pub async fn send_text(&self, connection: &Arc<SocketConnection>, text: &str) {
        if let Err(e) = connection.send_text(text).await {
            warn!("Send to {} failed: {e}", connection.id());
        }
    }

    pub async fn send_binary(&self, connection: &Arc<SocketConnection>, payload: Vec<u8>) {
        if let Err(e) = connection.send_binary(payload).await {
            warn!("Send to {} failed: {e}", connection.id());
        }
    }

    pub async fn broadcast_text(&self, text: &str) -> BroadcastReport {
        self.broadcast(&Frame::text(text)).await
    }

    pub async fn broadcast_binary(&self, payload: Vec<u8>) -> BroadcastReport {
        self.broadcast(&Frame::binary(payload)).await
    }

    /// Send one frame to every open connection in a snapshot of the live
    /// set. One peer's failure never affects delivery to the others.
    async fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        let snapshot = self.connections();
        let mut report = BroadcastReport::default();
        for conn in snapshot {
            if !conn.is_open() {
                continue;
            }
            match conn.send_frame(frame).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {e}", conn.id());
                    report.failures.push(SendFailure {
                        connection: conn.id(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Close one connection from the server side and drop it from the live
    /// set.
    pub async fn close_connection(&self, connection: &Arc<SocketConnection>) {
        connection.close(close_code::NORMAL, "").await;
        self.live.lock().retain(|c| c.id() != connection.id());
        self.finish_disconnect(connection).await;
    }

    /// Close every live connection best-effort and drain the live set.
    /// Idempotent: the second call observes the disposed flag and returns.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.reaper.lock().take() {
            handle.abort();
        }

        let drained: Vec<Arc<SocketConnection>> = {
            let mut live = self.live.lock();
            std::mem::take(&mut *live)
        };
        info!(
            "Disposing {} ({} live connections)",
            self.handler.server_name(),
            drained.len()
        );
        for conn in &drained {
            conn.close(close_code::GOING_AWAY, "").await;
        }
        for conn in &drained {
            self.finish_disconnect(conn).await;
        }
    }

    /// Take over an upgraded connection: complete the handshake, admit the
    /// connection into the live set, and run its receive loop to completion.
    /// `leftover` holds any bytes the request parser read past the head —
    /// an eager client's first frames.
    pub async fn run_connection<S>(
        self: Arc<Self>,
        stream: S,
        request: Request,
        leftover: BytesMut,
        peer: SocketAddr,
    ) where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.disposed.load(Ordering::SeqCst) {
            debug!("Rejecting {peer}: {} is disposed", self.handler.server_name());
            return;
        }

        let (mut reader, mut writer) = tokio::io::split(stream);

        let key = match handshake::validate(&request) {
            Ok(key) => key.to_string(),
            Err(e) => {
                warn!("Rejected upgrade from {peer}: {e}");
                let mut response = Response::new();
                response.set_status(400);
                let _ = response.write_to(&mut writer).await;
                return;
            }
        };

        let accept = handshake::accept_response(&key);
        if let Err(e) = writer.write_all(accept.as_bytes()).await {
            warn!("Handshake write to {peer} failed: {e}");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!("Handshake flush to {peer} failed: {e}");
            return;
        }

        let conn = Arc::new(SocketConnection::new(peer, Box::new(writer)));
        conn.set_state(SocketState::Open);

        // Stale entries are swept before the new connection is admitted.
        self.sweep().await;
        self.live.lock().push(conn.clone());

        info!(
            "Client connected: {} as {} ({})",
            peer,
            conn.id(),
            self.handler.server_name()
        );
        self.handler.on_client_connected(&conn).await;

        self.receive_loop(&mut reader, &conn, leftover).await;

        self.live.lock().retain(|c| c.id() != conn.id());
        conn.mark_closed();
        self.finish_disconnect(&conn).await;
    }

    async fn receive_loop<R>(
        &self,
        reader: &mut R,
        conn: &Arc<SocketConnection>,
        leftover: BytesMut,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&leftover);
        let mut accumulator: Vec<u8> = Vec::new();
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut ping = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);

        'conn: loop {
            // Drain every complete frame before blocking on the transport.
            loop {
                match decoder.next() {
                    Ok(Some(frame)) => {
                        if !self.process_frame(conn, frame, &mut accumulator).await {
                            break 'conn;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Frame error from {}: {e}", conn.id());
                        conn.close(close_code::PROTOCOL_ERROR, "").await;
                        break 'conn;
                    }
                }
            }

            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!("Connection {} closed by peer", conn.id());
                        break;
                    }
                    Ok(n) => decoder.extend(&buf[..n]),
                    Err(e) => {
                        warn!("Receive error on {}: {e}", conn.id());
                        break;
                    }
                },
                _ = ping.tick() => {
                    if let Err(e) = conn.send_frame(&Frame::ping()).await {
                        debug!("Ping to {} failed: {e}", conn.id());
                        break;
                    }
                }
            }
        }
    }

    /// Handle one decoded frame. Returns false when the receive loop should
    /// exit.
    async fn process_frame(
        &self,
        conn: &Arc<SocketConnection>,
        frame: Frame,
        accumulator: &mut Vec<u8>,
    ) -> bool {
        self.handler.on_frame_received(conn, &frame.payload).await;

        match frame.opcode {
            Opcode::Close => {
                conn.close(close_code::NORMAL, "").await;
                false
            }
            Opcode::Ping => {
                if let Err(e) = conn.send_frame(&Frame::pong(frame.payload)).await {
                    debug!("Pong to {} failed: {e}", conn.id());
                    return false;
                }
                true
            }
            Opcode::Pong => true,
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                accumulator.extend_from_slice(&frame.payload);
                let max = self.config.max_message_size;
                if max > 0 && accumulator.len() > max {
                    warn!(
                        "Connection {} exceeded the {max}-byte message cap",
                        conn.id()
                    );
                    let reason = format!("Message too big. Maximum is {max} bytes.");
                    conn.close(close_code::MESSAGE_TOO_BIG, &reason).await;
                    return false;
                }
                if frame.fin {
                    let message = std::mem::take(accumulator);
                    self.handler.on_message_received(conn, &message).await;
                }
                true
            }
        }
    }

    /// Fire the disconnect callback if no other exit path beat us to it.
    async fn finish_disconnect(&self, conn: &Arc<SocketConnection>) {
        if conn.take_disconnect() {
            self.handler.on_client_disconnected(conn).await;
            info!(
                "Client disconnected: {} ({})",
                conn.id(),
                self.handler.server_name()
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Object-safe endpoint surface
// ─────────────────────────────────────────────────────────────────────────────

/// What the HTTP layer needs from a socket server, independent of its
/// handler type. One instance is bound per upgrade path; binding the same
/// path again replaces the previous instance.
pub trait SocketEndpoint: Send + Sync {
    /// Identity for logs.
    fn name(&self) -> &str;

    /// Spawn the background reaper if enabled. Idempotent.
    fn start(self: Arc<Self>);

    /// Take over an upgraded connection until it closes.
    fn attach(
        self: Arc<Self>,
        stream: TcpStream,
        request: Request,
        leftover: BytesMut,
        peer: SocketAddr,
    ) -> BoxFuture<'static, ()>;

    fn dispose(self: Arc<Self>) -> BoxFuture<'static, ()>;
}

impl<H: SocketHandler> SocketEndpoint for SocketServer<H> {
    fn name(&self) -> &str {
        self.handler.server_name()
    }

    fn start(self: Arc<Self>) {
        if !self.config.reaper_enabled {
            return;
        }
        let mut guard = self.reaper.lock();
        if guard.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self);
        *guard = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + REAP_INTERVAL, REAP_INTERVAL);
            loop {
                tick.tick().await;
                let Some(server) = weak.upgrade() else { break };
                if server.disposed.load(Ordering::SeqCst) {
                    break;
                }
                server.sweep().await;
            }
        }));
    }

    fn attach(
        self: Arc<Self>,
        stream: TcpStream,
        request: Request,
        leftover: BytesMut,
        peer: SocketAddr,
    ) -> BoxFuture<'static, ()> {
        Box::pin(self.run_connection(stream, request, leftover, peer))
    }

    fn dispose(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move { SocketServer::dispose(&self).await })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use hearth_protocol::frame::encode_frame;
    use hearth_protocol::Verb;
    use tokio::io::DuplexStream;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct Recorder {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
        frames: AtomicUsize,
        messages: Mutex<Vec<Vec<u8>>>,
    }

    impl SocketHandler for Recorder {
        fn server_name(&self) -> &str {
            "Recorder"
        }

        async fn on_client_connected(&self, _connection: &Arc<SocketConnection>) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_frame_received(&self, _connection: &Arc<SocketConnection>, _frame: &[u8]) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_message_received(&self, _connection: &Arc<SocketConnection>, message: &[u8]) {
            self.messages.lock().push(message.to_vec());
        }

        async fn on_client_disconnected(&self, _connection: &Arc<SocketConnection>) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:54321".parse().unwrap()
    }

    fn no_reaper(max_message_size: usize) -> SocketServerConfig {
        SocketServerConfig {
            max_message_size,
            reaper_enabled: false,
        }
    }

    /// A connection wired to an in-memory duplex; the returned stream is
    /// the client side.
    fn seeded_connection(
        server: &Arc<SocketServer<Recorder>>,
        state: SocketState,
    ) -> (Arc<SocketConnection>, DuplexStream) {
        let (client, server_side) = tokio::io::duplex(4096);
        let (_discard, writer) = tokio::io::split(server_side);
        let conn = Arc::new(SocketConnection::new(peer(), Box::new(writer)));
        conn.set_state(state);
        server.live.lock().push(conn.clone());
        (conn, client)
    }

    fn upgrade_request() -> Request {
        Request {
            verb: Verb::Get,
            target: "/chat".into(),
            path: "/chat".into(),
            query: None,
            headers: vec![
                ("Host".into(), "localhost".into()),
                ("Upgrade".into(), "websocket".into()),
                ("Connection".into(), "Upgrade".into()),
                ("Sec-WebSocket-Version".into(), "13".into()),
                ("Sec-WebSocket-Key".into(), "dGhlIHNhbXBsZSBub25jZQ==".into()),
            ],
            body: Vec::new(),
        }
    }

    async fn read_http_head(stream: &mut DuplexStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            let n = timeout(TICK, stream.read(&mut byte)).await.unwrap().unwrap();
            assert_ne!(n, 0, "stream closed before the head completed");
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    async fn read_frame(stream: &mut DuplexStream) -> Frame {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 256];
        loop {
            if let Some(frame) = decoder.next().unwrap() {
                return frame;
            }
            let n = timeout(TICK, stream.read(&mut buf)).await.unwrap().unwrap();
            assert_ne!(n, 0, "stream closed before a full frame arrived");
            decoder.extend(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn broadcast_skips_closed_connections() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let mut clients = Vec::new();
        for _ in 0..3 {
            let (_conn, client) = seeded_connection(&server, SocketState::Open);
            clients.push(client);
        }
        let (_closed, _closed_client) = seeded_connection(&server, SocketState::Closed);

        let report = server.broadcast_text("ping").await;
        assert_eq!(report.delivered, 3);
        assert!(report.failures.is_empty());

        for client in &mut clients {
            let frame = read_frame(client).await;
            assert_eq!(frame.opcode, Opcode::Text);
            assert_eq!(frame.payload, b"ping");
        }
    }

    #[tokio::test]
    async fn sweep_removes_non_open_connections_once() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let (_open, _c1) = seeded_connection(&server, SocketState::Open);
        let (_dead, _c2) = seeded_connection(&server, SocketState::Closed);

        server.sweep().await;
        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 1);

        // A second sweep finds nothing new.
        server.sweep().await;
        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let (_a, mut client_a) = seeded_connection(&server, SocketState::Open);
        let (_b, _client_b) = seeded_connection(&server, SocketState::Open);

        server.clone().dispose().await;
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 2);

        let frame = read_frame(&mut client_a).await;
        assert_eq!(frame.close_code(), Some(close_code::GOING_AWAY));

        server.clone().dispose().await;
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fragmented_message_fires_callback_once() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let (mut client, server_side) = tokio::io::duplex(8192);
        let task = tokio::spawn(server.clone().run_connection(
            server_side,
            upgrade_request(),
            BytesMut::new(),
            peer(),
        ));

        let head = read_http_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols"));
        assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        let first = Frame {
            fin: false,
            opcode: Opcode::Text,
            payload: b"Hel".to_vec(),
        };
        let second = Frame {
            fin: true,
            opcode: Opcode::Continuation,
            payload: b"lo".to_vec(),
        };
        client.write_all(&encode_frame(&first)).await.unwrap();
        client.write_all(&encode_frame(&second)).await.unwrap();
        client
            .write_all(&encode_frame(&Frame::close(close_code::NORMAL, "")))
            .await
            .unwrap();

        let reply = read_frame(&mut client).await;
        assert_eq!(reply.close_code(), Some(close_code::NORMAL));

        timeout(TICK, task).await.unwrap().unwrap();

        assert_eq!(server.handler().connected.load(Ordering::SeqCst), 1);
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 1);
        // Two data frames plus the close frame.
        assert_eq!(server.handler().frames.load(Ordering::SeqCst), 3);
        assert_eq!(*server.handler().messages.lock(), vec![b"Hello".to_vec()]);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn oversized_message_closes_with_1009() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(8));
        let (mut client, server_side) = tokio::io::duplex(8192);
        let task = tokio::spawn(server.clone().run_connection(
            server_side,
            upgrade_request(),
            BytesMut::new(),
            peer(),
        ));

        read_http_head(&mut client).await;
        client
            .write_all(&encode_frame(&Frame::text("ninebytes")))
            .await
            .unwrap();

        let frame = read_frame(&mut client).await;
        assert_eq!(frame.close_code(), Some(close_code::MESSAGE_TOO_BIG));
        assert_eq!(
            frame.close_reason(),
            Some("Message too big. Maximum is 8 bytes.")
        );

        timeout(TICK, task).await.unwrap().unwrap();

        // The oversized message never reached the message callback.
        assert!(server.handler().messages.lock().is_empty());
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn external_close_sends_normal_closure_and_removes_the_connection() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let (mut client, server_side) = tokio::io::duplex(8192);
        let task = tokio::spawn(server.clone().run_connection(
            server_side,
            upgrade_request(),
            BytesMut::new(),
            peer(),
        ));

        read_http_head(&mut client).await;

        // The connection is admitted shortly after the handshake is written.
        let conn = timeout(TICK, async {
            loop {
                if let Some(conn) = server.connections().first().cloned() {
                    return conn;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        server.close_connection(&conn).await;
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 1);
        assert!(!conn.is_open());

        let frame = read_frame(&mut client).await;
        assert_eq!(frame.close_code(), Some(close_code::NORMAL));

        // The still-running receive loop unwinds without firing the
        // disconnect callback a second time.
        drop(client);
        timeout(TICK, task).await.unwrap().unwrap();
        assert_eq!(server.handler().disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn ping_from_peer_gets_pong() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let (mut client, server_side) = tokio::io::duplex(8192);
        let task = tokio::spawn(server.clone().run_connection(
            server_side,
            upgrade_request(),
            BytesMut::new(),
            peer(),
        ));

        read_http_head(&mut client).await;
        client
            .write_all(&encode_frame(&Frame {
                fin: true,
                opcode: Opcode::Ping,
                payload: b"hb".to_vec(),
            }))
            .await
            .unwrap();

        let pong = read_frame(&mut client).await;
        assert_eq!(pong.opcode, Opcode::Pong);
        assert_eq!(pong.payload, b"hb");

        drop(client);
        timeout(TICK, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejects_non_upgrade_request_with_400() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let (mut client, server_side) = tokio::io::duplex(8192);
        let mut request = upgrade_request();
        request.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Upgrade"));

        let task = tokio::spawn(server.clone().run_connection(
            server_side,
            request,
            BytesMut::new(),
            peer(),
        ));

        let head = read_http_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
        timeout(TICK, task).await.unwrap().unwrap();
        assert_eq!(server.handler().connected.load(Ordering::SeqCst), 0);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn leftover_bytes_are_decoded_before_the_first_read() {
        let server = SocketServer::with_config(Recorder::default(), no_reaper(0));
        let (mut client, server_side) = tokio::io::duplex(8192);

        // The client sent its first frame in the same packet as the request.
        let mut leftover = BytesMut::new();
        leftover.extend_from_slice(&encode_frame(&Frame::text("eager")));

        let task = tokio::spawn(server.clone().run_connection(
            server_side,
            upgrade_request(),
            leftover,
            peer(),
        ));

        read_http_head(&mut client).await;
        client
            .write_all(&encode_frame(&Frame::close(close_code::NORMAL, "")))
            .await
            .unwrap();
        let reply = read_frame(&mut client).await;
        assert_eq!(reply.close_code(), Some(close_code::NORMAL));

        timeout(TICK, task).await.unwrap().unwrap();
        assert_eq!(*server.handler().messages.lock(), vec![b"eager".to_vec()]);
    }
}
