//! Per-deployment HTTP policy consumed by the message layer.
//!
//! [`HttpConfig`] is immutable once built and shared between messages through an
//! `Arc`. It is produced either programmatically with [`HttpConfig::builder`] or from
//! deserialized [`HttpOptions`].

use std::time::Duration;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cookie::{EncodePolicy, SameSite};
use crate::error::ConfigError;

/// Cookie name that applies a SameSite value to every cookie.
pub const WILDCARD: &str = "*";

pub const DEFAULT_LIMIT_ON_NUMBER_OF_HEADERS: usize = 500;
pub const DEFAULT_LIMIT_OF_FIELD_SIZE: usize = 32_768;
pub const DEFAULT_DATE_HEADER_RANGE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct SameSitePattern {
    source: String,
    regex: Regex,
    same_site: SameSite,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    same_site_cookies: IndexMap<String, SameSite>,
    same_site_patterns: Vec<SameSitePattern>,
    only_same_site_star: bool,
    do_not_allow_duplicate_set_cookies: bool,
    partitioned: bool,
    v0_cookie_date_rfc1123_compat: bool,
    skip_cookie_path_quotes: bool,
    limit_on_number_of_headers: usize,
    limit_of_field_size: usize,
    date_header_range: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            same_site_cookies: IndexMap::new(),
            same_site_patterns: Vec::new(),
            only_same_site_star: false,
            do_not_allow_duplicate_set_cookies: false,
            partitioned: false,
            v0_cookie_date_rfc1123_compat: true,
            skip_cookie_path_quotes: false,
            limit_on_number_of_headers: DEFAULT_LIMIT_ON_NUMBER_OF_HEADERS,
            limit_of_field_size: DEFAULT_LIMIT_OF_FIELD_SIZE,
            date_header_range: DEFAULT_DATE_HEADER_RANGE,
        }
    }
}

impl HttpConfig {
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::default()
    }

    /// Returns true when any SameSite value is configured.
    pub fn use_same_site_config(&self) -> bool {
        !self.same_site_cookies.is_empty() || !self.same_site_patterns.is_empty()
    }

    /// Resolves the configured SameSite value for a cookie name.
    ///
    /// An exact name wins over everything else. When the lone configured entry is `*`
    /// its value applies without touching the patterns, otherwise the patterns are tried
    /// in configuration order and the first match wins.
    pub fn same_site_for(&self, name: &str) -> Option<SameSite> {
        if let Some(same_site) = self.same_site_cookies.get(name) {
            return Some(*same_site);
        }
        if self.only_same_site_star {
            return self.same_site_cookies.get(WILDCARD).copied();
        }
        self.same_site_patterns.iter().find(|pattern| pattern.regex.is_match(name)).map(|pattern| {
            debug!(cookie = name, pattern = %pattern.source, "samesite pattern matched");
            pattern.same_site
        })
    }

    pub fn same_site_cookies(&self) -> &IndexMap<String, SameSite> {
        &self.same_site_cookies
    }

    /// The configured name patterns, in match order.
    pub fn same_site_patterns(&self) -> impl Iterator<Item = (&str, SameSite)> {
        self.same_site_patterns.iter().map(|pattern| (pattern.source.as_str(), pattern.same_site))
    }

    pub fn only_same_site_star(&self) -> bool {
        self.only_same_site_star
    }

    pub fn do_not_allow_duplicate_set_cookies(&self) -> bool {
        self.do_not_allow_duplicate_set_cookies
    }

    pub fn partitioned(&self) -> bool {
        self.partitioned
    }

    pub fn v0_cookie_date_rfc1123_compat(&self) -> bool {
        self.v0_cookie_date_rfc1123_compat
    }

    pub fn skip_cookie_path_quotes(&self) -> bool {
        self.skip_cookie_path_quotes
    }

    pub fn limit_on_number_of_headers(&self) -> usize {
        self.limit_on_number_of_headers
    }

    pub fn limit_of_field_size(&self) -> usize {
        self.limit_of_field_size
    }

    pub fn date_header_range(&self) -> Duration {
        self.date_header_range
    }

    pub fn encode_policy(&self) -> EncodePolicy {
        EncodePolicy::from(self)
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfigBuilder {
    same_site: Vec<(String, SameSite)>,
    config: HttpConfig,
}

impl Default for HttpConfigBuilder {
    fn default() -> Self {
        Self { same_site: Vec::new(), config: HttpConfig::default() }
    }
}

impl HttpConfigBuilder {
    /// Cookie names (or `*` patterns) that default to `SameSite=Lax`.
    pub fn same_site_lax<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.same_site(SameSite::Lax, names)
    }

    /// Cookie names (or `*` patterns) that default to `SameSite=Strict`.
    pub fn same_site_strict<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.same_site(SameSite::Strict, names)
    }

    /// Cookie names (or `*` patterns) that default to `SameSite=None`.
    pub fn same_site_none<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.same_site(SameSite::None, names)
    }

    pub fn same_site<I, S>(mut self, same_site: SameSite, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.same_site.extend(names.into_iter().map(|name| (name.into(), same_site)));
        self
    }

    pub fn do_not_allow_duplicate_set_cookies(mut self, enabled: bool) -> Self {
        self.config.do_not_allow_duplicate_set_cookies = enabled;
        self
    }

    pub fn partitioned(mut self, enabled: bool) -> Self {
        self.config.partitioned = enabled;
        self
    }

    pub fn v0_cookie_date_rfc1123_compat(mut self, enabled: bool) -> Self {
        self.config.v0_cookie_date_rfc1123_compat = enabled;
        self
    }

    pub fn skip_cookie_path_quotes(mut self, enabled: bool) -> Self {
        self.config.skip_cookie_path_quotes = enabled;
        self
    }

    pub fn limit_on_number_of_headers(mut self, limit: usize) -> Self {
        self.config.limit_on_number_of_headers = limit;
        self
    }

    pub fn limit_of_field_size(mut self, limit: usize) -> Self {
        self.config.limit_of_field_size = limit;
        self
    }

    pub fn date_header_range(mut self, range: Duration) -> Self {
        self.config.date_header_range = range;
        self
    }

    pub fn build(self) -> Result<HttpConfig, ConfigError> {
        let mut config = self.config;

        for (name, same_site) in self.same_site {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            if config.same_site_cookies.contains_key(&name)
                || config.same_site_patterns.iter().any(|pattern| pattern.source == name)
            {
                warn!(cookie = %name, %same_site, "samesite configured more than once for cookie, keeping the first value");
                continue;
            }

            if name.contains(WILDCARD) {
                let regex = wildcard_regex(&name)?;
                config.same_site_patterns.push(SameSitePattern { source: name.clone(), regex, same_site });
                if name == WILDCARD {
                    config.same_site_cookies.insert(name, same_site);
                }
            } else {
                config.same_site_cookies.insert(name, same_site);
            }
        }

        config.only_same_site_star =
            config.same_site_cookies.len() == 1 && config.same_site_patterns.len() == 1 && config.same_site_cookies.contains_key(WILDCARD);

        debug!(
            exact = config.same_site_cookies.len(),
            patterns = config.same_site_patterns.len(),
            only_star = config.only_same_site_star,
            "samesite configuration built"
        );
        Ok(config)
    }
}

/// `a*b` matches any name starting with `a` and ending with `b`.
fn wildcard_regex(name: &str) -> Result<Regex, ConfigError> {
    let body = name.split(WILDCARD).map(regex::escape).collect::<Vec<_>>().join(".*");
    let pattern = format!("^{body}$");
    Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern { pattern, source })
}

/// Deserializable form of [`HttpConfig`].
///
/// ```
/// # use micro_http_message::config::{HttpConfig, HttpOptions};
/// let options: HttpOptions = serde_json::from_str(r#"{ "sameSiteNone": ["sess*"], "partitioned": true }"#).unwrap();
/// let config = HttpConfig::try_from(options).unwrap();
/// assert!(config.partitioned());
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpOptions {
    pub same_site_lax: Vec<String>,
    pub same_site_strict: Vec<String>,
    pub same_site_none: Vec<String>,
    pub partitioned: bool,
    pub do_not_allow_duplicate_set_cookies: bool,
    #[serde(rename = "v0CookieDateRfc1123Compat")]
    pub v0_cookie_date_rfc1123_compat: bool,
    pub skip_cookie_path_quotes: bool,
    pub limit_num_headers: usize,
    pub limit_field_size: usize,
    /// In milliseconds.
    pub date_header_range: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            same_site_lax: Vec::new(),
            same_site_strict: Vec::new(),
            same_site_none: Vec::new(),
            partitioned: false,
            do_not_allow_duplicate_set_cookies: false,
            v0_cookie_date_rfc1123_compat: true,
            skip_cookie_path_quotes: false,
            limit_num_headers: DEFAULT_LIMIT_ON_NUMBER_OF_HEADERS,
            limit_field_size: DEFAULT_LIMIT_OF_FIELD_SIZE,
            date_header_range: 1000,
        }
    }
}

impl TryFrom<HttpOptions> for HttpConfig {
    type Error = ConfigError;

    fn try_from(options: HttpOptions) -> Result<Self, Self::Error> {
        HttpConfig::builder()
            .same_site_lax(options.same_site_lax)
            .same_site_strict(options.same_site_strict)
            .same_site_none(options.same_site_none)
            .partitioned(options.partitioned)
            .do_not_allow_duplicate_set_cookies(options.do_not_allow_duplicate_set_cookies)
            .v0_cookie_date_rfc1123_compat(options.v0_cookie_date_rfc1123_compat)
            .skip_cookie_path_quotes(options.skip_cookie_path_quotes)
            .limit_on_number_of_headers(options.limit_num_headers)
            .limit_of_field_size(options.limit_field_size)
            .date_header_range(Duration::from_millis(options.date_header_range))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn defaults() {
        let config = HttpConfig::default();
        assert!(!config.use_same_site_config());
        assert!(config.v0_cookie_date_rfc1123_compat());
        assert_eq!(config.limit_on_number_of_headers(), 500);
        assert_eq!(config.limit_of_field_size(), 32_768);
        assert_eq!(config.same_site_for("any"), None);
    }

    #[test]
    fn exact_name_wins_over_pattern() {
        let config = HttpConfig::builder().same_site_strict(["s*"]).same_site_lax(["sess"]).build().unwrap();
        assert_eq!(config.same_site_for("sess"), Some(SameSite::Lax));
        assert_eq!(config.same_site_for("session"), Some(SameSite::Strict));
        assert_eq!(config.same_site_for("other"), None);
        assert!(!config.only_same_site_star());
    }

    #[test]
    fn patterns_match_in_configured_order() {
        let config = HttpConfig::builder().same_site_none(["a*"]).same_site_lax(["*b"]).build().unwrap();
        assert_eq!(config.same_site_for("ab"), Some(SameSite::None));
        assert_eq!(config.same_site_for("xb"), Some(SameSite::Lax));

        let patterns: Vec<_> = config.same_site_patterns().map(|(source, _)| source).collect();
        assert_eq!(patterns, ["a*", "*b"]);
    }

    #[test]
    fn pattern_special_characters_are_literal() {
        let config = HttpConfig::builder().same_site_lax(["a.b*"]).build().unwrap();
        assert_eq!(config.same_site_for("a.bc"), Some(SameSite::Lax));
        assert_eq!(config.same_site_for("axbc"), None);
    }

    #[test]
    fn lone_star_uses_fast_path() {
        let config = HttpConfig::builder().same_site_none(["*"]).build().unwrap();
        assert!(config.only_same_site_star());
        assert_eq!(config.same_site_for("anything"), Some(SameSite::None));

        let config = HttpConfig::builder().same_site_none(["*"]).same_site_lax(["x"]).build().unwrap();
        assert!(!config.only_same_site_star());
        assert_eq!(config.same_site_for("x"), Some(SameSite::Lax));
        assert_eq!(config.same_site_for("y"), Some(SameSite::None));
    }

    #[test]
    fn first_configured_value_wins() {
        let config = HttpConfig::builder().same_site_lax(["a"]).same_site_strict(["a"]).build().unwrap();
        assert_eq!(config.same_site_for("a"), Some(SameSite::Lax));
    }

    #[test]
    fn options_from_json() {
        let json = indoc! {r#"
            {
                "sameSiteLax": ["JSESSIONID"],
                "sameSiteNone": ["track*"],
                "partitioned": true,
                "doNotAllowDuplicateSetCookies": true,
                "v0CookieDateRfc1123Compat": false,
                "limitNumHeaders": 10,
                "dateHeaderRange": 250
            }
        "#};
        let options: HttpOptions = serde_json::from_str(json).unwrap();
        let config = HttpConfig::try_from(options).unwrap();

        assert_eq!(config.same_site_for("JSESSIONID"), Some(SameSite::Lax));
        assert_eq!(config.same_site_for("tracking"), Some(SameSite::None));
        assert!(config.partitioned());
        assert!(config.do_not_allow_duplicate_set_cookies());
        assert!(!config.v0_cookie_date_rfc1123_compat());
        assert!(!config.skip_cookie_path_quotes());
        assert_eq!(config.limit_on_number_of_headers(), 10);
        assert_eq!(config.limit_of_field_size(), DEFAULT_LIMIT_OF_FIELD_SIZE);
        assert_eq!(config.date_header_range(), Duration::from_millis(250));
    }

    #[test]
    fn empty_options_match_defaults() {
        let options: HttpOptions = serde_json::from_str("{}").unwrap();
        let config = HttpConfig::try_from(options).unwrap();
        assert!(!config.use_same_site_config());
        assert!(config.v0_cookie_date_rfc1123_compat());
        assert_eq!(config.date_header_range(), DEFAULT_DATE_HEADER_RANGE);
    }
}
