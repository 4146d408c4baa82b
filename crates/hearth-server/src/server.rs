//! The web server: shared core state and the accept loop.
//!
//! `ServerCore` is the shared state handlers see: the module registry and
//! the socket-endpoint table. `WebServer` owns the listener lifecycle
//! around it. One tokio task per accepted connection; an accept failure is
//! logged and the loop keeps going, so one bad accept never takes the
//! server down.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hearth_protocol::request::read_request;
use hearth_protocol::{normalize_path, HttpContext, Response};
use hearth_ws::SocketEndpoint;

use crate::dispatcher::dispatch;
use crate::error::ServerError;
use crate::module::{Module, ModuleId};
use crate::registry::ModuleRegistry;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Hostname to bind to.
    pub hostname: String,
    /// Port to listen on (0 for OS-assigned).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Shared server state: the module registry and the upgrade-path table.
///
/// Registration is setup-time single-writer; dispatch only ever takes read
/// locks.
pub struct ServerCore {
    config: ServerConfig,
    registry: RwLock<ModuleRegistry>,
    sockets: RwLock<HashMap<String, Arc<dyn SocketEndpoint>>>,
}

impl ServerCore {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: RwLock::new(ModuleRegistry::new()),
            sockets: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub(crate) fn registry(&self) -> &RwLock<ModuleRegistry> {
        &self.registry
    }

    /// Register a module; its owning-server back-reference is bound here,
    /// strictly at registration time.
    pub fn register_module(self: &Arc<Self>, module: Arc<dyn Module>) {
        self.registry.write().register(module, Arc::downgrade(self));
    }

    pub fn unregister_module(&self, id: ModuleId) {
        self.registry.write().unregister(id);
    }

    pub fn module(&self, id: ModuleId) -> Option<Arc<dyn Module>> {
        self.registry.read().lookup(id)
    }

    /// The active session module's store, if one is registered.
    pub fn session_module(&self) -> Option<Arc<dyn Module>> {
        self.registry.read().session_module()
    }

    /// Bind a persistent-connection server to an upgrade path. Binding the
    /// same path again replaces the previous endpoint.
    pub fn register_socket_server(&self, path: &str, endpoint: Arc<dyn SocketEndpoint>) {
        let path = normalize_path(path);
        info!("Socket server {} bound to {path}", endpoint.name());
        if self.sockets.write().insert(path.clone(), endpoint).is_some() {
            warn!("Replaced the socket server previously bound to {path}");
        }
    }

    pub fn socket_endpoint(&self, path: &str) -> Option<Arc<dyn SocketEndpoint>> {
        self.sockets.read().get(path).cloned()
    }

    fn socket_endpoints(&self) -> Vec<Arc<dyn SocketEndpoint>> {
        self.sockets.read().values().cloned().collect()
    }
}

/// The embeddable web server: a `ServerCore` plus the accept loop around
/// it.
pub struct WebServer {
    core: Arc<ServerCore>,
    started: AtomicBool,
    port: Mutex<Option<u16>>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl WebServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            core: ServerCore::new(config),
            started: AtomicBool::new(false),
            port: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            accept_task: Mutex::new(None),
        }
    }

    pub fn core(&self) -> &Arc<ServerCore> {
        &self.core
    }

    pub fn register_module(&self, module: Arc<dyn Module>) {
        self.core.register_module(module);
    }

    pub fn register_socket_server(&self, path: &str, endpoint: Arc<dyn SocketEndpoint>) {
        self.core.register_socket_server(path, endpoint);
    }

    /// Actual bound port, once started.
    pub fn port(&self) -> Option<u16> {
        *self.port.lock()
    }

    /// Bind the listener and spawn the accept loop. Returns the bound port.
    /// Starting twice is a usage error, not a restart.
    pub async fn start(&self) -> Result<u16, ServerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = format!("{}:{}", self.core.config.hostname, self.core.config.port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                // A failed bind leaves the server stopped; the next start()
                // must report the bind error again, not AlreadyStarted.
                self.started.store(false, Ordering::SeqCst);
                return Err(ServerError::Bind(e));
            }
        };
        let port = match listener.local_addr() {
            Ok(local) => local.port(),
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(ServerError::Bind(e));
            }
        };

        for endpoint in self.core.socket_endpoints() {
            endpoint.start();
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let core = self.core.clone();

        let task = tokio::spawn(async move {
            info!(
                "Listening on http://{}:{port}",
                core.config.hostname
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let core = core.clone();
                            tokio::spawn(handle_connection(core, stream, peer));
                        }
                        Err(e) => {
                            // Transient accept failures must not stop the loop.
                            warn!("Accept error: {e}");
                        }
                    }
                }
            }
            info!("Accept loop stopped");
        });

        *self.port.lock() = Some(port);
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *self.accept_task.lock() = Some(task);
        Ok(port)
    }

    /// Stop accepting connections and dispose every socket server.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let Some(tx) = self.shutdown_tx.lock().take() else {
            return Err(ServerError::NotStarted);
        };
        let _ = tx.send(()).await;
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        for endpoint in self.core.socket_endpoints() {
            endpoint.dispose().await;
        }
        info!("Server stopped");
        Ok(())
    }
}

/// One connection: parse the request, then either hand the stream to a
/// socket endpoint (upgrade takeover) or dispatch and write the response.
async fn handle_connection(core: Arc<ServerCore>, mut stream: TcpStream, peer: SocketAddr) {
    let mut buf = BytesMut::with_capacity(4096);

    let request = match read_request(&mut stream, &mut buf).await {
        Ok(request) => request,
        Err(e) => {
            // Dispatch-wide fault: log, answer best-effort, close.
            warn!("Bad request from {peer}: {e}");
            let mut response = Response::new();
            response.set_status(400);
            let _ = response.write_to(&mut stream).await;
            let _ = stream.shutdown().await;
            return;
        }
    };

    if request.is_upgrade() {
        if let Some(endpoint) = core.socket_endpoint(&request.path) {
            endpoint.attach(stream, request, buf, peer).await;
            return;
        }
        debug!("Upgrade request for unbound path {} from {peer}", request.path);
    }

    let mut ctx = HttpContext::new(request, peer);
    dispatch(&core, &mut ctx).await;

    if let Err(e) = ctx.response.write_to(&mut stream).await {
        debug!("[{}] Response write to {peer} failed: {e}", ctx.token);
    }
    let _ = stream.shutdown().await;
}
