use http::{HeaderMap, Request, Response, Version};

use crate::cookie::CookieHeader;

/// The head of an HTTP message as handed over by the transport.
///
/// Requests and responses keep their cookies in different headers, so each head names
/// the header tried first and the one used as a fallback.
pub trait MessageHead {
    /// Header checked first by cookie lookups.
    const PRIMARY_COOKIE: CookieHeader;
    /// Header checked when the primary one has no match.
    const SECONDARY_COOKIE: CookieHeader;

    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);
}

impl MessageHead for Request<()> {
    const PRIMARY_COOKIE: CookieHeader = CookieHeader::Cookie;
    const SECONDARY_COOKIE: CookieHeader = CookieHeader::Cookie2;

    fn headers(&self) -> &HeaderMap {
        Request::headers(self)
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        Request::headers_mut(self)
    }

    fn version(&self) -> Version {
        Request::version(self)
    }

    fn set_version(&mut self, version: Version) {
        *Request::version_mut(self) = version;
    }
}

impl MessageHead for Response<()> {
    const PRIMARY_COOKIE: CookieHeader = CookieHeader::SetCookie;
    const SECONDARY_COOKIE: CookieHeader = CookieHeader::SetCookie2;

    fn headers(&self) -> &HeaderMap {
        Response::headers(self)
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        Response::headers_mut(self)
    }

    fn version(&self) -> Version {
        Response::version(self)
    }

    fn set_version(&mut self, version: Version) {
        *Response::version_mut(self) = version;
    }
}
