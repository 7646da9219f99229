//! Cookie value objects and the machinery that moves them in and out of header lines.
//!
//! - [`Cookie`]: a decoded cookie with its attributes
//! - [`CookieHeader`]: the four cookie-bearing header types
//! - [`decode`] / [`encode`]: the stateless codec for a single header line
//! - [`CookieCache`]: per-message, per-header-type store with incremental decoding
//! - [`SameSite`]: the SameSite attribute values understood by the policy layer

use std::fmt;

use http::HeaderName;
use indexmap::IndexMap;

mod cache;
mod decoder;
mod encoder;
mod same_site;

pub use cache::CookieCache;
pub use decoder::decode;
pub use encoder::{EncodePolicy, encode};
pub use same_site::{SameSite, is_same_site_none_incompatible};

pub(crate) use same_site::apply_policy;

/// Attribute key holding the SameSite value.
pub const SAMESITE_ATTRIBUTE: &str = "samesite";
/// Attribute key holding the Partitioned flag. An empty value means set, `"false"` means cleared.
pub const PARTITIONED_ATTRIBUTE: &str = "partitioned";
/// Attribute key holding a raw Expires date.
pub const EXPIRES_ATTRIBUTE: &str = "expires";

/// The header types able to carry cookies.
///
/// Request-side headers (`Cookie`, `Cookie2`) hold a semicolon separated list of
/// `name=value` pairs. Response-side headers (`Set-Cookie`, `Set-Cookie2`) hold a
/// single cookie followed by its attributes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CookieHeader {
    Cookie,
    Cookie2,
    SetCookie,
    SetCookie2,
}

const COOKIE2: HeaderName = HeaderName::from_static("cookie2");
const SET_COOKIE2: HeaderName = HeaderName::from_static("set-cookie2");

impl CookieHeader {
    /// All cookie header types, in cache slot order.
    pub const ALL: [CookieHeader; 4] = [Self::Cookie, Self::Cookie2, Self::SetCookie, Self::SetCookie2];

    /// Slot of this header type in a per-message cache array.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Cookie => 0,
            Self::Cookie2 => 1,
            Self::SetCookie => 2,
            Self::SetCookie2 => 3,
        }
    }

    /// The header name as written on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cookie => "Cookie",
            Self::Cookie2 => "Cookie2",
            Self::SetCookie => "Set-Cookie",
            Self::SetCookie2 => "Set-Cookie2",
        }
    }

    pub fn header_name(self) -> HeaderName {
        match self {
            Self::Cookie => http::header::COOKIE,
            Self::Cookie2 => COOKIE2,
            Self::SetCookie => http::header::SET_COOKIE,
            Self::SetCookie2 => SET_COOKIE2,
        }
    }

    /// Returns true for `Cookie` and `Cookie2`.
    #[inline]
    pub const fn is_request_side(self) -> bool {
        matches!(self, Self::Cookie | Self::Cookie2)
    }

    /// Returns true for `Set-Cookie` and `Set-Cookie2`.
    #[inline]
    pub const fn is_set_cookie(self) -> bool {
        !self.is_request_side()
    }

    /// Looks a header type up by its (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|header| header.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CookieHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single HTTP cookie.
///
/// Well-known attributes (path, domain, max-age, secure, http-only, comment) have
/// dedicated accessors; everything else (SameSite, Partitioned, Expires, Port and
/// unknown extensions) lives in an ordered attribute map keyed by lower-case name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
    comment: Option<String>,
    version: u8,
    attributes: IndexMap<String, String>,
}

impl Cookie {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            secure: false,
            http_only: false,
            comment: None,
            version: 0,
            attributes: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value<V: Into<String>>(&mut self, value: V) {
        self.value = value.into();
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn set_path<P: Into<String>>(&mut self, path: Option<P>) {
        self.path = path.map(Into::into);
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn set_domain<D: Into<String>>(&mut self, domain: Option<D>) {
        self.domain = domain.map(Into::into);
    }

    /// Max-Age in seconds. A negative value marks a session cookie.
    pub fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: Option<i64>) {
        self.max_age = max_age;
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn set_http_only(&mut self, http_only: bool) {
        self.http_only = http_only;
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment<C: Into<String>>(&mut self, comment: Option<C>) {
        self.comment = comment.map(Into::into);
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn set_version(&mut self, version: u8) {
        self.version = version;
    }

    /// Returns the value of an extension attribute, `name` is matched case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value);
        }
        self.attributes.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Sets or, with `None`, removes an extension attribute.
    pub fn set_attribute<V: Into<String>>(&mut self, name: &str, value: Option<V>) {
        let key = name.to_ascii_lowercase();
        match value {
            Some(value) => {
                self.attributes.insert(key, value.into());
            }
            None => {
                self.attributes.shift_remove(&key);
            }
        }
    }

    /// Iterates the extension attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The SameSite attribute, when present and recognised.
    pub fn same_site(&self) -> Option<SameSite> {
        self.attribute(SAMESITE_ATTRIBUTE).and_then(|value| value.parse().ok())
    }

    /// Returns true when a Partitioned attribute is present and not `"false"`.
    pub fn is_partitioned(&self) -> bool {
        self.attribute(PARTITIONED_ATTRIBUTE).is_some_and(|value| !value.eq_ignore_ascii_case("false"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_slots_are_distinct() {
        let mut slots = CookieHeader::ALL.map(CookieHeader::index);
        slots.sort_unstable();
        assert_eq!(slots, [0, 1, 2, 3]);
    }

    #[test]
    fn header_sides() {
        assert!(CookieHeader::Cookie.is_request_side());
        assert!(CookieHeader::Cookie2.is_request_side());
        assert!(CookieHeader::SetCookie.is_set_cookie());
        assert!(CookieHeader::SetCookie2.is_set_cookie());
        assert_eq!(CookieHeader::SetCookie2.header_name().as_str(), "set-cookie2");
        assert_eq!(CookieHeader::from_name("set-cookie"), Some(CookieHeader::SetCookie));
        assert_eq!(CookieHeader::from_name("x-cookie"), None);
    }

    #[test]
    fn attributes_are_case_insensitive() {
        let mut cookie = Cookie::new("a", "b");
        cookie.set_attribute("SameSite", Some("None"));
        assert_eq!(cookie.attribute("samesite"), Some("None"));
        assert_eq!(cookie.attribute("SAMESITE"), Some("None"));
        assert_eq!(cookie.same_site(), Some(SameSite::None));

        cookie.set_attribute::<String>("SAMESITE", None);
        assert_eq!(cookie.attribute("samesite"), None);
    }

    #[test]
    fn partitioned_flag() {
        let mut cookie = Cookie::new("a", "b");
        assert!(!cookie.is_partitioned());
        cookie.set_attribute(PARTITIONED_ATTRIBUTE, Some(""));
        assert!(cookie.is_partitioned());
        cookie.set_attribute(PARTITIONED_ATTRIBUTE, Some("FALSE"));
        assert!(!cookie.is_partitioned());
    }
}
