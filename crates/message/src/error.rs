use std::io;
use thiserror::Error;

/// Failures raised by message operations.
///
/// Binding gaps (operations the header collection cannot express) surface as
/// [`MessageError::Unsupported`] and are never retried.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("{operation} is not supported by this message binding")]
    Unsupported { operation: &'static str },

    #[error("unsupported http version: {version}")]
    UnsupportedVersion { version: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("header value size {current_size} exceed the limit {max_size}")]
    HeaderTooLarge { current_size: usize, max_size: usize },

    #[error("invalid status code: {code}")]
    InvalidStatus { code: u16 },

    #[error("invalid request line: {reason}")]
    InvalidRequestLine { reason: String },
}

impl MessageError {
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    pub fn unsupported_version<S: ToString>(version: S) -> Self {
        Self::UnsupportedVersion { version: version.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn header_too_large(current_size: usize, max_size: usize) -> Self {
        Self::HeaderTooLarge { current_size, max_size }
    }

    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { reason: str.to_string() }
    }
}

/// Failures raised while restoring a passivated message.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("truncated stream, need {needed} bytes but only {remaining} remain")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown serialization format marker: {marker:#010x}")]
    UnknownFormat { marker: u32 },

    #[error("invalid string object: {reason}")]
    InvalidString { reason: String },

    #[error("failed deserialization of version")]
    MalformedVersion {
        #[source]
        source: MessageError,
    },

    #[error("failed deserialization of header: {source}")]
    Header {
        #[source]
        source: MessageError,
    },

    #[error("failed deserialization of request line: {source}")]
    RequestLine {
        #[source]
        source: MessageError,
    },

    #[error("invalid status code: {code}")]
    InvalidStatus { code: i32 },
}

impl SerializationError {
    pub fn truncated(needed: usize, remaining: usize) -> Self {
        Self::Truncated { needed, remaining }
    }

    pub fn invalid_string<S: ToString>(str: S) -> Self {
        Self::InvalidString { reason: str.to_string() }
    }
}

impl From<SerializationError> for io::Error {
    fn from(e: SerializationError) -> Self {
        match e {
            SerializationError::Io { source } => source,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

/// Failures raised while building an [`HttpConfig`](crate::config::HttpConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid samesite value: {value}")]
    InvalidSameSite { value: String },

    #[error("invalid samesite cookie name pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
