//! Modules and their handler maps.
//!
//! A module is a named unit exposing path/verb-keyed handlers. Wildcard
//! path and verb entries are fallback-only: exact entries always win, and
//! between the two tables the exact-path table is consulted first.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};

use tracing::warn;

use hearth_protocol::{HttpContext, PathPattern, Verb};

use crate::error::HandlerResult;
use crate::server::ServerCore;
use crate::session::SessionStore;

/// Stable module identifier. Registration is validated by identifier
/// uniqueness: a registry holds at most one module per id.
pub type ModuleId = &'static str;

/// A handler callback bound to a (path, verb) pair.
pub type Handler = Box<
    dyn for<'a> Fn(
            &'a ServerCore,
            &'a mut HttpContext,
        ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>
        + Send
        + Sync,
>;

/// Per-module mapping from path pattern to a verb-to-handler table.
#[derive(Default)]
pub struct HandlerMap {
    entries: HashMap<PathPattern, HashMap<Verb, Handler>>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a (pattern, verb) pair. At most one handler
    /// per pair; a duplicate registration replaces the old one with a
    /// warning.
    pub fn on(&mut self, pattern: impl Into<PathPattern>, verb: Verb, handler: Handler) {
        let pattern = pattern.into();
        let table = self.entries.entry(pattern.clone()).or_default();
        if table.insert(verb, handler).is_some() {
            warn!("Handler replaced for {pattern} {verb}");
        }
    }

    /// Resolve the single applicable handler for a request. Precedence:
    /// exact-path+exact-verb, exact-path+any-verb, any-path+exact-verb,
    /// any-path+any-verb.
    pub fn resolve(&self, path: &str, verb: Verb) -> Option<&Handler> {
        let patterns = [PathPattern::Exact(path.to_string()), PathPattern::Any];
        for pattern in &patterns {
            if let Some(table) = self.entries.get(pattern) {
                if let Some(handler) = table.get(&verb) {
                    return Some(handler);
                }
                if let Some(handler) = table.get(&Verb::Any) {
                    return Some(handler);
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A named unit of request handling, registered into one server.
pub trait Module: Send + Sync {
    /// Stable identity; at most one module per id in a registry.
    fn id(&self) -> ModuleId;

    /// Display name used in logs and the fixed 500 document.
    fn name(&self) -> &str;

    fn handlers(&self) -> &HandlerMap;

    /// Called exactly once when the module is registered, handing it the
    /// owning server core.
    fn bind(&self, server: Weak<ServerCore>) {
        let _ = server;
    }

    /// The session capability, if this module provides one.
    fn as_session(&self) -> Option<&dyn SessionStore> {
        None
    }
}

/// Generic callback-based module: a display name plus a handler map filled
/// in by the embedding application.
pub struct CallbackModule {
    id: ModuleId,
    name: String,
    handlers: HandlerMap,
    server: OnceLock<Weak<ServerCore>>,
}

impl CallbackModule {
    pub fn new(id: ModuleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            handlers: HandlerMap::new(),
            server: OnceLock::new(),
        }
    }

    /// Builder-style handler registration.
    pub fn on(mut self, pattern: impl Into<PathPattern>, verb: Verb, handler: Handler) -> Self {
        self.handlers.on(pattern, verb, handler);
        self
    }

    /// The owning server, once registered.
    pub fn server(&self) -> Option<Arc<ServerCore>> {
        self.server.get().and_then(Weak::upgrade)
    }
}

impl Module for CallbackModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    fn bind(&self, server: Weak<ServerCore>) {
        if self.server.set(server).is_err() {
            warn!("Module {} bound twice", self.id);
        }
    }
}
