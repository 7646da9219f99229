//! The per-exchange collaborator a message consults for request-dependent decisions.

use std::sync::atomic::{AtomicU64, Ordering};

use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// Pairs a response with the request it answers and exposes the exchange byte counters.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceContext: Send + Sync {
    /// Method of the request this exchange serves.
    fn request_method(&self) -> Method;

    /// First value of a header on the paired request.
    fn request_header(&self, name: &HeaderName) -> Option<HeaderValue>;

    fn bytes_written(&self) -> u64;

    fn bytes_read(&self) -> u64;
}

/// A [`ServiceContext`] holding a snapshot of the request head and atomic byte counters.
#[derive(Debug)]
pub struct BasicServiceContext {
    method: Method,
    headers: HeaderMap,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

impl BasicServiceContext {
    pub fn new(method: Method, headers: HeaderMap) -> Self {
        Self { method, headers, bytes_written: AtomicU64::new(0), bytes_read: AtomicU64::new(0) }
    }

    pub fn from_request<T>(request: &http::Request<T>) -> Self {
        Self::new(request.method().clone(), request.headers().clone())
    }

    pub fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }
}

impl ServiceContext for BasicServiceContext {
    fn request_method(&self) -> Method {
        self.method.clone()
    }

    fn request_header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.headers.get(name).cloned()
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}
