//! HTTP request reading and parsing.
//!
//! The parser reads the request head from the raw stream into a caller-owned
//! buffer, then drains the Content-Length body. Bytes left in the buffer
//! after parsing belong to the next protocol layer — for upgrade requests
//! that is the first WebSocket frames of an eager client, so the buffer must
//! be handed to whatever takes over the connection.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;
use crate::verb::Verb;

/// Upper bound on the request head (request line + headers).
pub const MAX_HEAD_BYTES: usize = 16 * 1024;
/// Upper bound on an in-memory request body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// A parsed inbound request.
#[derive(Debug)]
pub struct Request {
    pub verb: Verb,
    /// Raw request target as sent by the client, query string included.
    pub target: String,
    /// Normalized path: query stripped, duplicate slashes collapsed,
    /// trailing slash removed (except for the root).
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Look up a header value by name (case-insensitive per RFC 7230).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this request asks for a WebSocket upgrade.
    pub fn is_upgrade(&self) -> bool {
        let upgrade = self
            .header("Upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection = self
            .header("Connection")
            .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
        upgrade && connection
    }
}

/// Normalize a request path for matching: strip the query string, collapse
/// duplicate slashes, drop the trailing slash (the root stays `/`), and
/// ensure a leading slash.
pub fn normalize_path(raw: &str) -> String {
    let without_query = raw.split('?').next().unwrap_or("");

    let mut path = String::with_capacity(without_query.len() + 1);
    path.push('/');
    for segment in without_query.split('/').filter(|s| !s.is_empty()) {
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(segment);
    }
    path
}

/// Read and parse one request from `reader`.
///
/// `buf` is owned by the caller and may already contain bytes; on return it
/// holds whatever arrived past the end of this request.
pub async fn read_request<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Request, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    // Accumulate until the blank line terminating the head.
    let head_end = loop {
        if let Some(pos) = find_head_end(buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(ProtocolError::HeadTooLarge(MAX_HEAD_BYTES));
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(ProtocolError::malformed("connection closed mid-head"));
        }
    };

    let head = buf.split_to(head_end + 4);
    let head = std::str::from_utf8(&head[..head_end])
        .map_err(|_| ProtocolError::malformed("request head is not valid UTF-8"))?;

    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| ProtocolError::malformed("empty request head"))?;

    let mut parts = request_line.split(' ');
    let method = parts
        .next()
        .ok_or_else(|| ProtocolError::malformed("missing method"))?;
    let target = parts
        .next()
        .ok_or_else(|| ProtocolError::malformed("missing request target"))?
        .to_string();
    let version = parts
        .next()
        .ok_or_else(|| ProtocolError::malformed("missing HTTP version"))?;

    if !version.starts_with("HTTP/1.") {
        return Err(ProtocolError::UnsupportedVersion(version.to_string()));
    }

    let verb = Verb::parse(method)
        .ok_or_else(|| ProtocolError::malformed(format!("unsupported method: {method}")))?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::malformed(format!("malformed header line: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let query = target.split_once('?').map(|(_, q)| q.to_string());
    let path = normalize_path(&target);

    let request = Request {
        verb,
        target,
        path,
        query,
        headers,
        body: Vec::new(),
    };

    let content_length = match request.header("Content-Length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| ProtocolError::malformed("invalid Content-Length"))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(ProtocolError::BodyTooLarge(MAX_BODY_BYTES));
    }

    let mut request = request;
    if content_length > 0 {
        let mut body = Vec::with_capacity(content_length);
        let take = content_length.min(buf.len());
        body.extend_from_slice(&buf[..take]);
        buf.advance(take);

        while body.len() < content_length {
            let mut chunk = BytesMut::with_capacity(content_length - body.len());
            let n = reader.read_buf(&mut chunk).await?;
            if n == 0 {
                return Err(ProtocolError::malformed("connection closed mid-body"));
            }
            let need = content_length - body.len();
            let take = n.min(need);
            body.extend_from_slice(&chunk[..take]);
            // Anything past the declared body belongs to the caller's buffer.
            if n > need {
                buf.extend_from_slice(&chunk[take..]);
            }
        }
        request.body = body;
    }

    Ok(request)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
