//! Hearth protocol layer — HTTP wire types and the WebSocket frame codec.
//!
//! This crate is the single source of truth for everything that crosses the
//! wire: request verbs and path patterns, request-head parsing, response
//! serialization, the fixed 404/500 documents, and the RFC 6455 frame
//! codec used by the persistent-connection server.

pub mod context;
pub mod error;
pub mod frame;
pub mod pages;
pub mod request;
pub mod response;
pub mod verb;

pub use context::{HttpContext, RequestToken};
pub use error::{FrameError, ProtocolError};
pub use frame::{Frame, FrameDecoder, Opcode, close_code, encode_frame, RECV_BUFFER_SIZE};
pub use request::{normalize_path, read_request, Request};
pub use response::Response;
pub use verb::{PathPattern, Verb};
