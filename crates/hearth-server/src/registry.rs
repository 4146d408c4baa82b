//! Ordered module registry.
//!
//! Insertion order is evaluation order for dispatch. Registration conflicts
//! are logged and ignored, never fatal: a server with a misconfigured module
//! still serves everything else.

use std::sync::{Arc, Weak};

use tracing::warn;

use crate::module::{Module, ModuleId};
use crate::server::ServerCore;

#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
    /// The single active session module, if one is registered.
    session: Option<ModuleId>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module. A duplicate id is a no-op; the first registration
    /// stays active. Session-capable modules become the active session
    /// module (a later one, after unregister+register, wins).
    pub fn register(&mut self, module: Arc<dyn Module>, server: Weak<ServerCore>) {
        if self.modules.iter().any(|m| m.id() == module.id()) {
            warn!("Module already registered: {}", module.id());
            return;
        }
        module.bind(server);
        if module.as_session().is_some() {
            if let Some(previous) = self.session {
                warn!(
                    "Session module {} replaces {} as the active session module",
                    module.id(),
                    previous
                );
            }
            self.session = Some(module.id());
        }
        self.modules.push(module);
    }

    /// Remove the module with the given id. Absent ids are a logged no-op.
    pub fn unregister(&mut self, id: ModuleId) {
        let Some(index) = self.modules.iter().position(|m| m.id() == id) else {
            warn!("Module not registered: {id}");
            return;
        };
        self.modules.remove(index);
        if self.session == Some(id) {
            self.session = None;
        }
    }

    pub fn lookup(&self, id: ModuleId) -> Option<Arc<dyn Module>> {
        self.modules.iter().find(|m| m.id() == id).cloned()
    }

    /// Modules in registration order.
    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    pub fn session_module(&self) -> Option<Arc<dyn Module>> {
        self.session.and_then(|id| self.lookup(id))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
