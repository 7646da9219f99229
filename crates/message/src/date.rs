//! HTTP date formatting.
//!
//! Formatting a date on every response is wasteful when many responses are produced
//! within the same second, so [`DateFormatter`] keeps the last formatted value and only
//! reformats once it is older than the range asked for by the caller.

use arc_swap::ArcSwap;
use httpdate::fmt_http_date;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

static DATE_FORMATTER: Lazy<DateFormatter> = Lazy::new(DateFormatter::new);

/// Caches the RFC 1123 rendering of the current time.
#[derive(Debug)]
pub struct DateFormatter {
    current: ArcSwap<(SystemTime, String)>,
}

impl DateFormatter {
    /// Returns the process-wide formatter.
    pub fn global() -> &'static DateFormatter {
        &DATE_FORMATTER
    }

    pub fn new() -> Self {
        let now = SystemTime::now();
        Self { current: ArcSwap::from_pointee((now, fmt_http_date(now))) }
    }

    /// The current time in RFC 1123 form, reusing the cached value while it is younger
    /// than `range`.
    pub fn rfc1123(&self, range: Duration) -> String {
        let now = SystemTime::now();
        let cached = self.current.load();
        let fresh = now.duration_since(cached.0).is_ok_and(|age| age <= range);
        if fresh {
            return cached.1.clone();
        }

        let date = fmt_http_date(now);
        self.current.store(Arc::new((now, date.clone())));
        date
    }

    /// Formats `time` as `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn rfc1123_at(time: SystemTime) -> String {
        fmt_http_date(time)
    }

    /// Formats `time` as the Netscape cookie date `Sun, 06-Nov-1994 08:49:37 GMT`.
    pub fn netscape_at(time: SystemTime) -> String {
        let mut date = fmt_http_date(time).into_bytes();
        // "Sun, 06 Nov 1994 ..." always puts the day/month/year separators at 7 and 11
        date[7] = b'-';
        date[11] = b'-';
        String::from_utf8(date).unwrap_or_default()
    }
}

impl Default for DateFormatter {
    fn default() -> Self {
        Self::new()
    }
}
