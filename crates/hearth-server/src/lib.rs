//! Hearth server core — module registry, request dispatcher, web server.
//!
//! The embedding application builds modules, registers them into a
//! [`WebServer`] in the order they should be consulted, and starts the
//! accept loop. Dispatch walks the registry in registration order and the
//! first handler that reports "handled" wins; handler faults are contained
//! per request and rendered as the fixed 500 document.

pub mod dispatcher;
pub mod error;
pub mod module;
pub mod registry;
pub mod server;
pub mod session;

pub use dispatcher::dispatch;
pub use error::{HandlerError, HandlerResult, ServerError};
pub use module::{CallbackModule, Handler, HandlerMap, Module, ModuleId};
pub use registry::ModuleRegistry;
pub use server::{ServerConfig, ServerCore, WebServer};
pub use session::{SessionModule, SessionStore, SESSION_COOKIE};
