//! Cookie-correlated session module.
//!
//! Registers a wildcard passthrough handler that attaches a session id to
//! every request context and always returns `Ok(false)`, so dispatch
//! continues to the modules that do the real work. Session state is a
//! `DashMap` of JSON values keyed by session id.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use hearth_protocol::{HttpContext, Verb};

use crate::error::HandlerResult;
use crate::module::{Handler, HandlerMap, Module, ModuleId};
use crate::server::ServerCore;

/// Name of the session-correlation cookie.
pub const SESSION_COOKIE: &str = "hearth-session";

/// The session capability a module may expose through `Module::as_session`.
pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str, key: &str) -> Option<Value>;
    fn put(&self, session_id: &str, key: &str, value: Value);
    /// Drop a session and all its values.
    fn remove(&self, session_id: &str);
    fn session_count(&self) -> usize;
}

type SessionMap = DashMap<String, HashMap<String, Value>>;

pub struct SessionModule {
    handlers: HandlerMap,
    sessions: Arc<SessionMap>,
    server: OnceLock<Weak<ServerCore>>,
}

impl Default for SessionModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionModule {
    pub fn new() -> Self {
        let sessions: Arc<SessionMap> = Arc::new(DashMap::new());
        let mut handlers = HandlerMap::new();
        let map = Arc::clone(&sessions);
        let passthrough: Handler =
            Box::new(move |_core, ctx| attach_session(map.clone(), ctx));
        handlers.on("*", Verb::Any, passthrough);

        Self {
            handlers,
            sessions,
            server: OnceLock::new(),
        }
    }
}

/// Correlate the request with a session: reuse the cookie's session if
/// presented, otherwise mint a new one and set the cookie.
fn attach_session<'a>(
    sessions: Arc<SessionMap>,
    ctx: &'a mut HttpContext,
) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>> {
    Box::pin(async move {
        let presented = ctx.cookie(SESSION_COOKIE).map(str::to_string);
        let id = match presented {
            Some(id) => {
                // A presented id is honored even if the store lost it
                // (e.g. across a restart); the entry is recreated empty.
                sessions.entry(id.clone()).or_default();
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                sessions.insert(id.clone(), HashMap::new());
                ctx.response.set_header(
                    "Set-Cookie",
                    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly"),
                );
                debug!("[{}] Session created: {id}", ctx.token);
                id
            }
        };
        ctx.session_id = Some(id);
        Ok(false)
    })
}

impl Module for SessionModule {
    fn id(&self) -> ModuleId {
        "session"
    }

    fn name(&self) -> &str {
        "Session Module"
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    fn bind(&self, server: Weak<ServerCore>) {
        let _ = self.server.set(server);
    }

    fn as_session(&self) -> Option<&dyn SessionStore> {
        Some(self)
    }
}

impl SessionStore for SessionModule {
    fn get(&self, session_id: &str, key: &str) -> Option<Value> {
        self.sessions
            .get(session_id)
            .and_then(|values| values.get(key).cloned())
    }

    fn put(&self, session_id: &str, key: &str, value: Value) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
