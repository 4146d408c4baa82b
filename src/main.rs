//! Hearth — embeddable HTTP server with ordered module dispatch and
//! WebSocket persistent connections.
//!
//! This binary wires up a small demonstration server: a session module, a
//! callback module with a couple of routes, and an echo WebSocket endpoint
//! at `/echo`.
//!
//! Usage:
//!   hearth                       # Default port 8080
//!   hearth --port 9090           # Custom port
//!   hearth --verbose             # Debug logging

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hearth_protocol::{HttpContext, Verb};
use hearth_server::{
    CallbackModule, HandlerResult, ServerConfig, ServerCore, SessionModule, SessionStore,
    WebServer,
};
use hearth_ws::{SocketConnection, SocketHandler, SocketServer, SocketServerConfig};

#[derive(Parser, Debug)]
#[command(name = "hearth", about = "Hearth — embeddable modular web server")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum WebSocket message size in bytes (0 = unlimited)
    #[arg(long, default_value = "1048576")]
    max_message_size: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

type BoxedResult<'a> = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;

fn hello<'a>(_core: &'a ServerCore, ctx: &'a mut HttpContext) -> BoxedResult<'a> {
    Box::pin(async move {
        ctx.response
            .set_header("Content-Type", "text/plain; charset=utf-8");
        ctx.response.write_str("Hello from hearth!\n");
        Ok(true)
    })
}

/// Counts visits per session, exercising the session store.
fn whoami<'a>(core: &'a ServerCore, ctx: &'a mut HttpContext) -> BoxedResult<'a> {
    Box::pin(async move {
        ctx.response
            .set_header("Content-Type", "text/plain; charset=utf-8");
        let Some(session_id) = ctx.session_id.clone() else {
            ctx.response.write_str("no session module registered\n");
            return Ok(true);
        };
        let visits = core
            .session_module()
            .and_then(|module| {
                module.as_session().map(|store| {
                    let count = store
                        .get(&session_id, "visits")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0)
                        + 1;
                    store.put(&session_id, "visits", serde_json::json!(count));
                    count
                })
            })
            .unwrap_or(0);
        ctx.response
            .write_str(&format!("session {session_id}, visit {visits}\n"));
        Ok(true)
    })
}

/// Echoes every complete message back to its sender.
struct EchoHandler;

impl SocketHandler for EchoHandler {
    fn server_name(&self) -> &str {
        "Echo Server"
    }

    async fn on_message_received(&self, connection: &Arc<SocketConnection>, message: &[u8]) {
        let text = String::from_utf8_lossy(message);
        if let Err(e) = connection.send_text(&text).await {
            warn!("Echo to {} failed: {e}", connection.id());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = WebServer::new(ServerConfig {
        hostname: cli.hostname.clone(),
        port: cli.port,
    });

    // Registration order is dispatch order: the session passthrough runs
    // before the route handlers.
    server.register_module(Arc::new(SessionModule::new()));
    server.register_module(Arc::new(
        CallbackModule::new("demo", "Demo Module")
            .on("/", Verb::Get, Box::new(hello))
            .on("/whoami", Verb::Get, Box::new(whoami)),
    ));

    let echo = SocketServer::with_config(
        EchoHandler,
        SocketServerConfig {
            max_message_size: cli.max_message_size,
            reaper_enabled: true,
        },
    );
    server.register_socket_server("/echo", echo);

    let port = match server.start().await {
        Ok(port) => port,
        Err(e) => {
            error!("Failed to start: {e}");
            std::process::exit(1);
        }
    };

    info!("hearth ready on http://{}:{port} (echo socket at /echo)", cli.hostname);
    println!("hearth running on http://{}:{port} — press Ctrl+C to stop", cli.hostname);

    let _ = tokio::signal::ctrl_c().await;

    println!("Shutting down...");
    if let Err(e) = server.stop().await {
        warn!("Shutdown: {e}");
    }
    println!("Server stopped.");
}
