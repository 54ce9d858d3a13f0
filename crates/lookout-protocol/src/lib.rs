//! lookout-protocol: Chrome DevTools Protocol message model.
//!
//! Typed requests decoded from JSON, responses and notifications encoded
//! back to JSON, the CDP domain types they carry, and the Content-Length
//! framing used by the TCP transport.

pub mod error;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;

pub use error::ProtocolError;
pub use request::{parse_request, Request, RequestKind};
pub use response::{ErrorCode, Notification, Response, ResponseError};
pub use transport::{encode_message, FrameDecoder};
pub use types::*;
