use tracing::trace;

use super::{Cookie, CookieHeader, decode};

/// Decoded cookies of one header type for one message.
///
/// The cache keeps a cursor over the raw header lines it has already decoded, so each
/// line is decoded at most once no matter how often the cookies are read. Cookies added
/// through [`CookieCache::add_new_cookie`] are kept after the decoded ones, and any
/// mutation marks the cache dirty until it is marshalled back into header lines.
#[derive(Debug, Clone)]
pub struct CookieCache {
    header: CookieHeader,
    cookies: Vec<Cookie>,
    header_index: usize,
    decoded_len: usize,
    dirty: bool,
}

impl CookieCache {
    pub fn new(header: CookieHeader) -> Self {
        Self { header, cookies: Vec::new(), header_index: 0, decoded_len: 0, dirty: false }
    }

    pub fn header(&self) -> CookieHeader {
        self.header
    }

    /// Number of raw header lines decoded so far.
    pub fn header_index(&self) -> usize {
        self.header_index
    }

    /// Decodes the header lines past the cursor and returns how many were decoded.
    ///
    /// `lines` must yield every current instance of this cache's header, in order.
    pub fn catch_up<I>(&mut self, lines: I) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut seen = 0;
        let mut decoded = 0;
        for line in lines {
            seen += 1;
            if seen <= self.header_index {
                continue;
            }

            let line = String::from_utf8_lossy(line.as_ref());
            let cookies = decode(&line, self.header);
            let count = cookies.len();
            trace!(header = %self.header, line = %line, count, "decode cookie header line");

            let at = self.decoded_len;
            self.cookies.splice(at..at, cookies);
            self.decoded_len += count;
            self.header_index += 1;
            decoded += 1;
        }

        // lines may have been removed underneath the cache
        if seen < self.header_index {
            self.header_index = seen;
        }
        decoded
    }

    /// First cookie with the given name.
    pub fn get_cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|cookie| cookie.name() == name)
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Mutable access to the cookies. Marks the cache dirty.
    pub fn cookies_mut(&mut self) -> &mut Vec<Cookie> {
        self.dirty = true;
        &mut self.cookies
    }

    pub fn cookies_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Cookie> + 'a {
        self.cookies.iter().filter(move |cookie| cookie.name() == name)
    }

    /// Values of every cookie with the given name, in decode order.
    pub fn cookie_values(&self, name: &str) -> Vec<String> {
        self.cookies_named(name).map(|cookie| cookie.value().to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_cookie(name).is_some()
    }

    /// Stores a cookie added by the application.
    pub fn add_new_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
        self.dirty = true;
    }

    /// Removes the first cookie equal to `cookie`, or failing that the first one with the
    /// same name. Returns false when nothing matched.
    pub fn remove_cookie(&mut self, cookie: &Cookie) -> bool {
        let position = self
            .cookies
            .iter()
            .position(|c| c == cookie)
            .or_else(|| self.cookies.iter().position(|c| c.name() == cookie.name()));

        let Some(position) = position else {
            return false;
        };

        self.remove_at(position);
        true
    }

    /// Removes the first cookie named `name`. Returns false when there is none.
    pub fn remove_named(&mut self, name: &str) -> bool {
        let Some(position) = self.cookies.iter().position(|c| c.name() == name) else {
            return false;
        };
        self.remove_at(position);
        true
    }

    fn remove_at(&mut self, position: usize) {
        self.cookies.remove(position);
        if position < self.decoded_len {
            self.decoded_len -= 1;
        }
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Records that the cookies were written back as `lines_written` header lines.
    ///
    /// The written lines now represent every cookie in the cache, so the cursor moves
    /// past them and no cookie is treated as pending.
    pub fn mark_marshalled(&mut self, lines_written: usize) {
        self.header_index = lines_written;
        self.decoded_len = self.cookies.len();
        self.dirty = false;
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
        self.header_index = 0;
        self.decoded_len = 0;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_up_is_idempotent() {
        let lines = ["a=1; b=2", "c=3"];
        let mut cache = CookieCache::new(CookieHeader::Cookie);

        assert_eq!(cache.catch_up(lines), 2);
        let first: Vec<_> = cache.cookies().to_vec();
        assert_eq!(cache.header_index(), 2);

        for _ in 0..3 {
            assert_eq!(cache.catch_up(lines), 0);
            assert_eq!(cache.cookies(), first.as_slice());
            assert_eq!(cache.header_index(), 2);
        }
        assert!(!cache.is_dirty());
    }

    #[test]
    fn catch_up_is_incremental() {
        let mut lines = vec!["a=1".to_string()];
        let mut cache = CookieCache::new(CookieHeader::SetCookie);
        assert_eq!(cache.catch_up(&lines), 1);

        lines.push("b=2; Path=/".to_string());
        assert_eq!(cache.catch_up(&lines), 1);
        assert_eq!(cache.header_index(), 2);

        let names: Vec<_> = cache.cookies().iter().map(Cookie::name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn decoded_cookies_precede_added_ones() {
        let mut cache = CookieCache::new(CookieHeader::SetCookie);
        cache.add_new_cookie(Cookie::new("added", "x"));
        cache.catch_up(["late=1"]);

        let names: Vec<_> = cache.cookies().iter().map(Cookie::name).collect();
        assert_eq!(names, ["late", "added"]);
        assert!(cache.is_dirty());
    }

    #[test]
    fn lookup_by_name() {
        let mut cache = CookieCache::new(CookieHeader::Cookie);
        cache.catch_up(["a=1; b=2; a=3"]);

        assert_eq!(cache.get_cookie("a").map(Cookie::value), Some("1"));
        assert_eq!(cache.cookie_values("a"), ["1", "3"]);
        assert_eq!(cache.cookies_named("b").count(), 1);
        assert!(!cache.contains("z"));
    }

    #[test]
    fn remove_cookie() {
        let mut cache = CookieCache::new(CookieHeader::Cookie);
        cache.catch_up(["a=1; b=2"]);

        assert!(cache.remove_cookie(&Cookie::new("a", "other")));
        assert!(cache.is_dirty());
        assert!(!cache.contains("a"));
        assert!(!cache.remove_cookie(&Cookie::new("missing", "")));

        assert!(cache.remove_named("b"));
        assert!(cache.cookies().is_empty());
        assert!(!cache.remove_named("b"));
    }

    #[test]
    fn removed_lines_clamp_cursor() {
        let mut cache = CookieCache::new(CookieHeader::SetCookie);
        cache.catch_up(["a=1", "b=2"]);
        assert_eq!(cache.catch_up(["a=1"]), 0);
        assert_eq!(cache.header_index(), 1);
    }

    #[test]
    fn mark_marshalled_and_clear() {
        let mut cache = CookieCache::new(CookieHeader::SetCookie);
        cache.add_new_cookie(Cookie::new("a", "1"));
        cache.add_new_cookie(Cookie::new("b", "2"));
        cache.mark_marshalled(2);

        assert!(!cache.is_dirty());
        assert_eq!(cache.catch_up(["a=1", "b=2"]), 0);
        assert_eq!(cache.cookies().len(), 2);

        cache.clear();
        assert!(cache.cookies().is_empty());
        assert_eq!(cache.header_index(), 0);
    }
}
