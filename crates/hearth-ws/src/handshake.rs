//! RFC 6455 opening handshake.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use hearth_protocol::{Request, Verb};

use crate::error::HandshakeError;

/// Fixed GUID appended to the client key before hashing (RFC 6455 §4.2.2).
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derive the `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Validate an upgrade request and return the client's key.
pub fn validate(request: &Request) -> Result<&str, HandshakeError> {
    if request.verb != Verb::Get {
        return Err(HandshakeError::WrongMethod(request.verb.to_string()));
    }
    if !request.is_upgrade() {
        return Err(HandshakeError::NotAnUpgrade);
    }
    match request.header("Sec-WebSocket-Version") {
        Some("13") => {}
        Some(other) => return Err(HandshakeError::UnsupportedVersion(other.to_string())),
        None => return Err(HandshakeError::UnsupportedVersion("missing".into())),
    }
    request
        .header("Sec-WebSocket-Key")
        .ok_or(HandshakeError::MissingKey)
}

/// The full `101 Switching Protocols` response head. Subprotocol negotiation
/// is not used, so no `Sec-WebSocket-Protocol` header is ever emitted.
pub fn accept_response(client_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(client_key)
    )
}
