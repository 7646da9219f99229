//! Encoding of a single cookie into its header line form.

use std::fmt::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::config::HttpConfig;
use crate::date::DateFormatter;

use super::decoder::{is_ctl, is_token};
use super::{Cookie, CookieHeader, EXPIRES_ATTRIBUTE, PARTITIONED_ATTRIBUTE, SAMESITE_ATTRIBUTE};

/// The configuration switches the encoder honours.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EncodePolicy {
    /// Write version 0 `Expires` dates in RFC 1123 form instead of the Netscape `dd-Mon-yyyy` form.
    pub v0_cookie_date_rfc1123_compat: bool,
    /// Never wrap version 1 `Path` values in double quotes.
    pub skip_cookie_path_quotes: bool,
}

impl Default for EncodePolicy {
    fn default() -> Self {
        Self { v0_cookie_date_rfc1123_compat: true, skip_cookie_path_quotes: false }
    }
}

impl From<&HttpConfig> for EncodePolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            v0_cookie_date_rfc1123_compat: config.v0_cookie_date_rfc1123_compat(),
            skip_cookie_path_quotes: config.skip_cookie_path_quotes(),
        }
    }
}

/// Serializes `cookie` for the given header type.
///
/// Returns `None` when the cookie cannot be expressed on the wire: the name is not a
/// token, or the value or any attribute holds a `;` or a control character.
pub fn encode(cookie: &Cookie, header: CookieHeader, policy: &EncodePolicy) -> Option<String> {
    if !is_token(cookie.name()) {
        return None;
    }
    let value = encode_value(cookie.value())?;
    if !has_safe_attributes(cookie) {
        trace!(name = cookie.name(), "dropping cookie with an attribute that would split the line");
        return None;
    }

    let mut line = String::with_capacity(cookie.name().len() + value.len() + 64);
    if header.is_request_side() {
        write_cookie(&mut line, cookie, &value, policy);
    } else {
        write_set_cookie(&mut line, cookie, &value, policy, SystemTime::now());
    }
    Some(line)
}

fn write_cookie(line: &mut String, cookie: &Cookie, value: &str, policy: &EncodePolicy) {
    if cookie.version() == 0 {
        let _ = write!(line, "{}={}", cookie.name(), value);
        return;
    }

    let _ = write!(line, "$Version={}; {}={}", cookie.version(), cookie.name(), value);
    if let Some(path) = cookie.path() {
        let _ = write!(line, "; $Path={}", encode_path(path, cookie.version(), policy));
    }
    if let Some(domain) = cookie.domain() {
        let _ = write!(line, "; $Domain={domain}");
    }
    if let Some(port) = cookie.attribute("port") {
        let _ = write!(line, "; $Port={}", quote(port));
    }
}

fn write_set_cookie(line: &mut String, cookie: &Cookie, value: &str, policy: &EncodePolicy, now: SystemTime) {
    let _ = write!(line, "{}={}", cookie.name(), value);

    if cookie.version() > 0 {
        let _ = write!(line, "; Version={}", cookie.version());
        if let Some(comment) = cookie.comment() {
            let _ = write!(line, "; Comment={}", quote(comment));
        }
    }

    if let Some(domain) = cookie.domain() {
        let _ = write!(line, "; Domain={domain}");
    }

    if let Some(max_age) = cookie.max_age().filter(|age| *age >= 0) {
        if cookie.version() == 0 {
            let expires = expires_at(now, max_age);
            let date = if policy.v0_cookie_date_rfc1123_compat {
                DateFormatter::rfc1123_at(expires)
            } else {
                DateFormatter::netscape_at(expires)
            };
            let _ = write!(line, "; Expires={date}");
        }
        let _ = write!(line, "; Max-Age={max_age}");
    }

    if let Some(path) = cookie.path() {
        let _ = write!(line, "; Path={}", encode_path(path, cookie.version(), policy));
    }
    if cookie.is_secure() {
        line.push_str("; Secure");
    }
    if cookie.is_http_only() {
        line.push_str("; HttpOnly");
    }

    for (key, attribute) in cookie.attributes() {
        match key {
            SAMESITE_ATTRIBUTE => {
                if !attribute.is_empty() {
                    let _ = write!(line, "; SameSite={attribute}");
                }
            }
            PARTITIONED_ATTRIBUTE => {
                if !attribute.eq_ignore_ascii_case("false") {
                    line.push_str("; Partitioned");
                }
            }
            EXPIRES_ATTRIBUTE => {
                if cookie.max_age().is_none() {
                    let _ = write!(line, "; Expires={attribute}");
                }
            }
            "port" => {
                let _ = write!(line, "; Port={}", quote(attribute));
            }
            _ if attribute.is_empty() => {
                let _ = write!(line, "; {}", attribute_name(key));
            }
            _ => {
                let _ = write!(line, "; {}={}", attribute_name(key), attribute);
            }
        }
    }
}

fn has_safe_attributes(cookie: &Cookie) -> bool {
    let fields = [cookie.path(), cookie.domain(), cookie.comment()];
    fields.into_iter().flatten().all(is_safe_attribute)
        && cookie.attributes().all(|(key, value)| !key.contains('=') && is_safe_attribute(key) && is_safe_attribute(value))
}

fn is_safe_attribute(value: &str) -> bool {
    !value.contains(';') && !value.chars().any(is_ctl)
}

fn attribute_name(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn expires_at(now: SystemTime, max_age: i64) -> SystemTime {
    if max_age == 0 {
        return UNIX_EPOCH;
    }
    let seconds = u64::try_from(max_age).unwrap_or_default();
    now.checked_add(Duration::from_secs(seconds)).unwrap_or(now)
}

fn encode_path(path: &str, version: u8, policy: &EncodePolicy) -> String {
    if version > 0 && !policy.skip_cookie_path_quotes { quote(path) } else { path.to_string() }
}

fn encode_value(value: &str) -> Option<String> {
    if value.contains(';') || value.chars().any(is_ctl) {
        return None;
    }
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return Some(value.to_string());
    }
    if value.chars().any(|c| matches!(c, ' ' | '\t' | ',' | '"' | '\\')) {
        return Some(quote(value));
    }
    Some(value.to_string())
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
