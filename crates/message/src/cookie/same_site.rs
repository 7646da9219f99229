use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::ConfigError;

use super::{Cookie, PARTITIONED_ATTRIBUTE, SAMESITE_ATTRIBUTE};

/// The values of the SameSite cookie attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("lax") => Ok(Self::Lax),
            v if v.eq_ignore_ascii_case("strict") => Ok(Self::Strict),
            v if v.eq_ignore_ascii_case("none") => Ok(Self::None),
            v => Err(ConfigError::InvalidSameSite { value: v.to_string() }),
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static IOS_12: Lazy<Regex> = Lazy::new(|| regex(r"\(iP.+; CPU .*OS 12[_\d]*.*\) AppleWebKit/"));
static MACOS_10_14: Lazy<Regex> = Lazy::new(|| regex(r"\(Macintosh;.*Mac OS X 10_14[_\d]*.*\) AppleWebKit/"));
static SAFARI: Lazy<Regex> = Lazy::new(|| regex(r"Version/.* Safari/"));
static CHROMIUM_BASED: Lazy<Regex> = Lazy::new(|| regex(r"Chrom(e|ium)"));
static MAC_EMBEDDED_BROWSER: Lazy<Regex> = Lazy::new(|| {
    regex(r"^Mozilla/[\.\d]+ \(Macintosh;.*Mac OS X [_\d]+\) AppleWebKit/[\.\d]+ \(KHTML, like Gecko\)$")
});
static CHROMIUM_VERSION: Lazy<Regex> = Lazy::new(|| regex(r"Chrom(?:e|ium)/(\d+)\."));
static UC_BROWSER_VERSION: Lazy<Regex> = Lazy::new(|| regex(r"UCBrowser/(\d+)\.(\d+)\.(\d+)"));

fn regex(pattern: &str) -> Regex {
    // patterns above are literals and known to compile
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid user agent pattern {pattern}: {e}"))
}

/// Returns true when the client behind `user_agent` is known to mishandle `SameSite=None`,
/// either by rejecting the cookie or by treating it as `SameSite=Strict`.
pub fn is_same_site_none_incompatible(user_agent: &str) -> bool {
    has_web_kit_same_site_bug(user_agent) || drops_unrecognized_same_site_cookies(user_agent)
}

fn has_web_kit_same_site_bug(user_agent: &str) -> bool {
    if IOS_12.is_match(user_agent) {
        return true;
    }
    MACOS_10_14.is_match(user_agent)
        && ((SAFARI.is_match(user_agent) && !CHROMIUM_BASED.is_match(user_agent))
            || MAC_EMBEDDED_BROWSER.is_match(user_agent))
}

fn drops_unrecognized_same_site_cookies(user_agent: &str) -> bool {
    if let Some(captures) = UC_BROWSER_VERSION.captures(user_agent) {
        let version: Vec<u32> = (1..=3).filter_map(|i| captures.get(i)?.as_str().parse().ok()).collect();
        return version.as_slice() < [12, 13, 2].as_slice();
    }

    CHROMIUM_VERSION
        .captures(user_agent)
        .and_then(|captures| captures.get(1)?.as_str().parse::<u32>().ok())
        .is_some_and(|major| (51..=66).contains(&major))
}

/// Applies the configured SameSite and Partitioned policy to a cookie about to be
/// written in a `Set-Cookie` header.
pub(crate) fn apply_policy(cookie: &mut Cookie, config: &HttpConfig, user_agent: Option<&str>) {
    if config.use_same_site_config() {
        if cookie.attribute(SAMESITE_ATTRIBUTE).is_none() {
            match config.same_site_for(cookie.name()) {
                Some(same_site) => {
                    debug!(cookie = cookie.name(), %same_site, "apply configured samesite value");
                    cookie.set_attribute(SAMESITE_ATTRIBUTE, Some(same_site.as_str()));
                    if same_site == SameSite::None {
                        cookie.set_secure(true);
                        mark_partitioned(cookie, config);
                    }
                }
                None => debug!(cookie = cookie.name(), "no samesite configuration matches"),
            }
        } else if cookie.same_site() == Some(SameSite::None) {
            mark_partitioned(cookie, config);
        }
    }

    if cookie.is_partitioned() && cookie.same_site() != Some(SameSite::None) {
        cookie.set_attribute(PARTITIONED_ATTRIBUTE, Some("false"));
    }

    if cookie.same_site() == Some(SameSite::None) && user_agent.is_some_and(is_same_site_none_incompatible) {
        debug!(cookie = cookie.name(), user_agent, "client is incompatible with SameSite=None");
        cookie.set_attribute::<String>(SAMESITE_ATTRIBUTE, None);
        cookie.set_attribute::<String>(PARTITIONED_ATTRIBUTE, None);
    }
}

fn mark_partitioned(cookie: &mut Cookie, config: &HttpConfig) {
    if config.partitioned() && cookie.attribute(PARTITIONED_ATTRIBUTE).is_none() {
        cookie.set_attribute(PARTITIONED_ATTRIBUTE, Some(""));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_60: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/60.0.3112.113 Safari/537.36";
    const CHROME_120: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const IOS_12_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 12_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/12.0 Mobile/15E148 Safari/604.1";
    const MAC_SAFARI_10_14: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/12.1.2 Safari/605.1.15";
    const MAC_CHROME_10_14: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.93 Safari/537.36";
    const UC_OLD: &str = "Mozilla/5.0 (Linux; U; Android 8.0.0; en-US) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/57.0.2987.108 UCBrowser/12.10.2.1164 Mobile Safari/537.36";
    const UC_NEW: &str = "Mozilla/5.0 (Linux; U; Android 8.0.0; en-US) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/57.0.2987.108 UCBrowser/12.13.4.1214 Mobile Safari/537.36";

    fn config(builder: crate::config::HttpConfigBuilder) -> HttpConfig {
        builder.build().unwrap()
    }

    #[test]
    fn parse_same_site() {
        assert_eq!("lax".parse::<SameSite>().unwrap(), SameSite::Lax);
        assert_eq!("STRICT".parse::<SameSite>().unwrap(), SameSite::Strict);
        assert_eq!(" None ".parse::<SameSite>().unwrap(), SameSite::None);
        assert!(matches!("sometimes".parse::<SameSite>(), Err(ConfigError::InvalidSameSite { .. })));
    }

    #[test]
    fn incompatible_user_agents() {
        assert!(is_same_site_none_incompatible(CHROME_60));
        assert!(is_same_site_none_incompatible(IOS_12_SAFARI));
        assert!(is_same_site_none_incompatible(MAC_SAFARI_10_14));
        assert!(is_same_site_none_incompatible(UC_OLD));

        assert!(!is_same_site_none_incompatible(CHROME_120));
        assert!(!is_same_site_none_incompatible(MAC_CHROME_10_14));
        assert!(!is_same_site_none_incompatible(UC_NEW));
        assert!(!is_same_site_none_incompatible("curl/8.4.0"));
    }

    #[test]
    fn configured_none_forces_secure_and_partitioned() {
        let config = config(HttpConfig::builder().same_site_none(["sess"]).partitioned(true));
        let mut cookie = Cookie::new("sess", "1");
        apply_policy(&mut cookie, &config, None);

        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert!(cookie.is_secure());
        assert!(cookie.is_partitioned());
    }

    #[test]
    fn explicit_same_site_is_kept() {
        let config = config(HttpConfig::builder().same_site_strict(["*"]));
        let mut cookie = Cookie::new("sess", "1");
        cookie.set_attribute(SAMESITE_ATTRIBUTE, Some("Lax"));
        apply_policy(&mut cookie, &config, None);
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn explicit_none_gets_partitioned_when_enabled() {
        let config = config(HttpConfig::builder().same_site_lax(["other"]).partitioned(true));
        let mut cookie = Cookie::new("sess", "1");
        cookie.set_attribute(SAMESITE_ATTRIBUTE, Some("None"));
        apply_policy(&mut cookie, &config, None);
        assert!(cookie.is_partitioned());
        assert!(!cookie.is_secure());
    }

    #[test]
    fn partitioned_requires_same_site_none() {
        let config = HttpConfig::default();
        let mut cookie = Cookie::new("a", "1");
        cookie.set_attribute(PARTITIONED_ATTRIBUTE, Some(""));
        apply_policy(&mut cookie, &config, None);
        assert_eq!(cookie.attribute(PARTITIONED_ATTRIBUTE), Some("false"));
        assert!(!cookie.is_partitioned());

        let mut cookie = Cookie::new("a", "1");
        cookie.set_attribute(SAMESITE_ATTRIBUTE, Some("None"));
        cookie.set_attribute(PARTITIONED_ATTRIBUTE, Some(""));
        apply_policy(&mut cookie, &config, None);
        assert!(cookie.is_partitioned());
    }

    #[test]
    fn incompatible_client_loses_same_site_none() {
        let config = config(HttpConfig::builder().same_site_none(["*"]).partitioned(true));
        let mut cookie = Cookie::new("a", "1");
        apply_policy(&mut cookie, &config, Some(CHROME_60));
        assert_eq!(cookie.attribute(SAMESITE_ATTRIBUTE), None);
        assert_eq!(cookie.attribute(PARTITIONED_ATTRIBUTE), None);
        assert!(cookie.is_secure());

        let mut cookie = Cookie::new("a", "1");
        apply_policy(&mut cookie, &config, Some(CHROME_120));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
    }
}
