//! Decoding of a single cookie header line.
//!
//! Request-side lines are decoded leniently: a segment that cannot form a cookie is
//! skipped and decoding carries on with the rest of the line. When every segment of
//! the line satisfies the RFC 6265 `cookie-octet` grammar the resulting cookies are
//! tagged version 1, otherwise they fall back to version 0.

use tracing::trace;

use super::{Cookie, CookieHeader, EXPIRES_ATTRIBUTE, PARTITIONED_ATTRIBUTE, SAMESITE_ATTRIBUTE};

/// Decodes one raw header line into the cookies it carries.
///
/// `Cookie`/`Cookie2` lines may yield any number of cookies, `Set-Cookie`/`Set-Cookie2`
/// lines yield at most one.
pub fn decode(line: &str, header: CookieHeader) -> Vec<Cookie> {
    if line.trim().is_empty() {
        return Vec::new();
    }

    if header.is_request_side() { decode_cookie_line(line) } else { decode_set_cookie_line(line).into_iter().collect() }
}

fn decode_cookie_line(line: &str) -> Vec<Cookie> {
    let mut cookies: Vec<Cookie> = Vec::new();
    let mut strict = true;

    for segment in split_segments(line) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let Some((name, raw_value)) = segment.split_once('=') else {
            trace!(segment, "skip cookie segment without value");
            continue;
        };
        let (name, raw_value) = (name.trim(), raw_value.trim());

        if let Some(attribute) = name.strip_prefix('$') {
            let value = unquote(raw_value);
            match (attribute.to_ascii_lowercase().as_str(), cookies.last_mut()) {
                ("version", _) => {}
                ("path", Some(last)) => last.set_path(Some(value)),
                ("domain", Some(last)) => last.set_domain(Some(value)),
                ("port", Some(last)) => last.set_attribute("port", Some(value)),
                _ => trace!(segment, "skip orphan cookie attribute"),
            }
            continue;
        }

        if !is_token(name) {
            trace!(segment, "skip cookie segment with invalid name");
            continue;
        }

        let value = unquote(raw_value);
        if value.chars().any(is_ctl) {
            trace!(segment, "skip cookie segment with control characters");
            continue;
        }

        if !is_strict_cookie_value(raw_value) {
            strict = false;
        }
        cookies.push(Cookie::new(name, value));
    }

    let version = u8::from(strict);
    for cookie in &mut cookies {
        cookie.set_version(version);
    }
    cookies
}

fn decode_set_cookie_line(line: &str) -> Option<Cookie> {
    let mut segments = split_segments(line).into_iter();

    let first = segments.next()?.trim();
    let Some((name, raw_value)) = first.split_once('=') else {
        trace!(line, "skip set-cookie line without name value pair");
        return None;
    };
    let name = name.trim();
    let value = unquote(raw_value.trim());
    if !is_token(name) || value.chars().any(is_ctl) {
        trace!(line, "skip malformed set-cookie line");
        return None;
    }

    let mut cookie = Cookie::new(name, value);
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (key, value) = match segment.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (segment, None),
        };

        match key.to_ascii_lowercase().as_str() {
            "path" => cookie.set_path(value.map(unquote)),
            "domain" => cookie.set_domain(value.map(unquote)),
            "comment" => cookie.set_comment(value.map(unquote)),
            "max-age" => match value.and_then(|v| v.parse::<i64>().ok()) {
                Some(max_age) => cookie.set_max_age(Some(max_age)),
                None => trace!(segment, "ignore invalid max-age attribute"),
            },
            "version" => match value.map(unquote).and_then(|v| v.parse::<u8>().ok()) {
                Some(version) => cookie.set_version(version),
                None => trace!(segment, "ignore invalid version attribute"),
            },
            "secure" => cookie.set_secure(true),
            "httponly" => cookie.set_http_only(true),
            "samesite" => cookie.set_attribute(SAMESITE_ATTRIBUTE, Some(value.unwrap_or_default())),
            "partitioned" => cookie.set_attribute(PARTITIONED_ATTRIBUTE, Some(value.unwrap_or_default())),
            other => cookie.set_attribute(other, Some(value.unwrap_or_default())),
        }
    }

    // Max-Age wins over Expires (RFC 6265 5.3 step 3)
    if cookie.max_age().is_some() {
        cookie.set_attribute::<String>(EXPIRES_ATTRIBUTE, None);
    }

    Some(cookie)
}

/// Splits a header line on `;`, ignoring separators inside double quotes.
fn split_segments(line: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, b) in line.bytes().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' if in_quotes => escaped = true,
            b'"' => in_quotes = !in_quotes,
            b';' if !in_quotes => {
                segments.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&line[start..]);
    segments
}

/// Strips surrounding double quotes and resolves backslash escapes.
pub(crate) fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// RFC 7230 `token`.
pub(crate) fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
        })
}

pub(crate) fn is_ctl(c: char) -> bool {
    c != '\t' && c.is_ascii_control()
}

/// RFC 6265 `cookie-value`: cookie-octets, optionally wrapped in double quotes.
fn is_strict_cookie_value(raw: &str) -> bool {
    let inner = raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(raw);
    inner.bytes().all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}
