//! The message model: a shared [`BaseMessage`] over an `http` head plus the request and
//! response specializations.
//!
//! Messages are owned by one exchange at a time and are reusable: [`BaseMessage::clear`]
//! returns a message to its blank, uninitialized state so a pool can hand it out again.

use std::fmt;

use http::HeaderName;

mod base;
mod context;
mod head;
mod request;
mod response;
mod serialize;

pub use base::BaseMessage;
pub use context::{BasicServiceContext, ServiceContext};
pub use head::MessageHead;
pub use request::RequestMessage;
pub use response::ResponseMessage;
pub use serialize::ExternalFormat;

#[cfg(test)]
pub use context::MockServiceContext;

/// Extension header carrying the HTTP/2 stream identifier of an exchange that was
/// converted to an HTTP/1.x style head.
pub const STREAM_ID: HeaderName = HeaderName::from_static("x-http2-stream-id");

/// Transfer codings a message can be framed with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    Identity,
    Chunked,
}

/// Tokens of the `Connection` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionValue {
    Close,
    KeepAlive,
    Upgrade,
    Te,
    Extension(String),
}

impl ConnectionValue {
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            t if t.eq_ignore_ascii_case("close") => Self::Close,
            t if t.eq_ignore_ascii_case("keep-alive") => Self::KeepAlive,
            t if t.eq_ignore_ascii_case("upgrade") => Self::Upgrade,
            t if t.eq_ignore_ascii_case("te") => Self::Te,
            t => Self::Extension(t.to_ascii_lowercase()),
        }
    }

    /// The literal header value, `None` for extension tokens.
    pub fn as_literal(&self) -> Option<&'static str> {
        match self {
            Self::Close => Some("close"),
            Self::KeepAlive => Some("keep-alive"),
            Self::Upgrade => Some("upgrade"),
            Self::Te => Some("te"),
            Self::Extension(_) => None,
        }
    }
}

impl fmt::Display for ConnectionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension(token) => f.write_str(token),
            value => f.write_str(value.as_literal().unwrap_or_default()),
        }
    }
}
