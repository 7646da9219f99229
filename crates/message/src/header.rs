use std::borrow::Cow;
use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue};

/// A read-only view of one header line.
///
/// A view over a missing header is still a valid value: it reports `is_present() == false`
/// and renders as the empty string, so callers never have to unwrap before formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField<'a> {
    name: Cow<'a, str>,
    value: Option<&'a HeaderValue>,
}

impl<'a> HeaderField<'a> {
    pub fn new(name: &'a HeaderName, value: &'a HeaderValue) -> Self {
        Self { name: Cow::Borrowed(name.as_str()), value: Some(value) }
    }

    /// A view over an owned or borrowed name and an optional value.
    pub fn from_parts<N: Into<Cow<'a, str>>>(name: N, value: Option<&'a HeaderValue>) -> Self {
        Self { name: name.into(), value }
    }

    /// A placeholder for a header that is not present.
    pub fn absent<N: Into<Cow<'a, str>>>(name: N) -> Self {
        Self { name: name.into(), value: None }
    }

    /// The first instance of `name` in `headers`, or an absent view.
    pub fn first(headers: &'a HeaderMap, name: &'a HeaderName) -> Self {
        Self { name: Cow::Borrowed(name.as_str()), value: headers.get(name) }
    }

    /// Every instance of `name` in `headers`, in order.
    pub fn all(headers: &'a HeaderMap, name: &'a HeaderName) -> impl Iterator<Item = HeaderField<'a>> + 'a {
        headers.get_all(name).iter().map(move |value| Self::new(name, value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&'a HeaderValue> {
        self.value
    }

    /// The value as text. Non UTF-8 bytes are replaced, an absent header yields `""`.
    pub fn as_str(&self) -> Cow<'a, str> {
        match self.value {
            Some(value) => String::from_utf8_lossy(value.as_bytes()),
            None => Cow::Borrowed(""),
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.value.map(HeaderValue::as_bytes).unwrap_or_default()
    }

    /// The value parsed as a decimal integer, `None` when absent or not a number.
    pub fn as_integer(&self) -> Option<i64> {
        self.value?.to_str().ok()?.trim().parse().ok()
    }
}

impl fmt::Display for HeaderField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.as_str())
    }
}
