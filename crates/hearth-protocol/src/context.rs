//! Per-request context handed to handlers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Instant;

use crate::request::Request;
use crate::response::Response;

/// Reference point for token timestamps. The monotonic clock never steps
/// backwards, unlike wall time.
static CLOCK_START: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Request-correlation token. Log-only — it has no functional role.
///
/// Derived from a monotonic timestamp plus a hash of the peer address, so
/// concurrent requests from different peers stay distinguishable in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn next(peer: SocketAddr) -> Self {
        let nanos = CLOCK_START.elapsed().as_nanos() as u64;
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        peer.hash(&mut hasher);
        RequestToken(nanos.wrapping_add(hasher.finish()))
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Mutable request/response context threaded through dispatch.
pub struct HttpContext {
    pub request: Request,
    pub response: Response,
    pub peer: SocketAddr,
    pub token: RequestToken,
    /// Set to true once a handler (or the dispatcher's terminal paths)
    /// produced the full response.
    pub handled: bool,
    /// Session id attached by a session-capable module, if one is
    /// registered. Later handlers read it to reach their session state.
    pub session_id: Option<String>,
}

impl HttpContext {
    pub fn new(request: Request, peer: SocketAddr) -> Self {
        Self {
            request,
            response: Response::new(),
            peer,
            token: RequestToken::next(peer),
            handled: false,
            session_id: None,
        }
    }

    /// Cookie value by name, parsed from the `Cookie` request header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let header = self.request.header("Cookie")?;
        header.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then_some(v)
        })
    }
}
