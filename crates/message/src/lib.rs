//! A protocol-version agnostic HTTP message model
//!
//! This crate sits between an HTTP transport, which hands over parsed heads as
//! `http::Request<()>` / `http::Response<()>`, and the code producing or consuming those
//! messages. It provides one uniform view over both sides of an exchange.
//!
//! # Features
//!
//! - Header access with per-message limits on header count and value size
//! - Lazy cookie decoding: each raw header line is decoded at most once, even when lines
//!   are appended after the first read
//! - Cookie marshalling with SameSite and Partitioned policy, legacy client detection
//!   and duplicate `Set-Cookie` suppression
//! - Body presence rules for HEAD requests, informational, 204 and 304 responses
//! - HTTP/2 detection through the stream identifier header
//! - Binary save and restore of messages in the current and the legacy layout
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use http::{Request, Response};
//! use micro_http_message::config::HttpConfig;
//! use micro_http_message::cookie::{Cookie, CookieHeader};
//! use micro_http_message::message::{BasicServiceContext, ResponseMessage};
//! use tracing::Level;
//! use tracing_subscriber::FmtSubscriber;
//!
//! let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
//! tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//! let config = HttpConfig::builder()
//!     .same_site_none(["tracking*"])
//!     .partitioned(true)
//!     .do_not_allow_duplicate_set_cookies(true)
//!     .build()
//!     .expect("valid configuration");
//!
//! let request = Request::get("/").header("user-agent", "curl/8.4.0").body(()).unwrap();
//! let context = Arc::new(BasicServiceContext::from_request(&request));
//!
//! let mut response = ResponseMessage::outbound(Response::new(()), Some(context), Arc::new(config));
//! response.set_cookie(Cookie::new("tracking_id", "1"), CookieHeader::SetCookie);
//! response.set_cookie(Cookie::new("tracking_id", "2"), CookieHeader::SetCookie);
//! response.process_cookies();
//!
//! assert_eq!(response.header("set-cookie").as_str(), "tracking_id=2; Secure; SameSite=None; Partitioned");
//! assert!(response.is_body_allowed());
//! ```

pub mod config;
pub mod cookie;
pub mod date;
pub mod error;
pub mod header;
pub mod message;

mod utils;

pub use config::HttpConfig;
pub use cookie::{Cookie, CookieHeader};
pub use error::{ConfigError, MessageError, SerializationError};
pub use header::HeaderField;
pub use message::{BaseMessage, RequestMessage, ResponseMessage};
