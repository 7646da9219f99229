use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use http::header::{CONTENT_ENCODING, CONTENT_RANGE, DATE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Version};
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::cookie::{Cookie, CookieHeader, apply_policy, decode, encode};
use crate::date::DateFormatter;
use crate::error::{MessageError, SerializationError};

use super::base::SavedFields;
use super::serialize::{ExternalFormat, ExternalReader, ExternalWriter};
use super::{BaseMessage, STREAM_ID, ServiceContext};

/// An HTTP response message bound to the request it answers.
///
/// The paired request is reached through the [`ServiceContext`]; it decides the
/// HEAD-specific body rules and whether the exchange runs over HTTP/2. Cookies are
/// looked up in `Set-Cookie` first and `Set-Cookie2` second.
#[derive(Debug, Default)]
pub struct ResponseMessage {
    base: BaseMessage<Response<()>>,
    trailers: HeaderMap,
    reason_phrase: Option<String>,
}

impl Deref for ResponseMessage {
    type Target = BaseMessage<Response<()>>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for ResponseMessage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl ResponseMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A response being built for sending.
    ///
    /// When the paired request carries the HTTP/2 stream identifier it is copied onto
    /// the response so both sides report the same protocol.
    pub fn outbound(head: Response<()>, context: Option<Arc<dyn ServiceContext>>, config: Arc<HttpConfig>) -> Self {
        let mut base = BaseMessage::outbound(head, context, config);
        if let Some(stream_id) = base.request_header(&STREAM_ID) {
            debug!(stream_id = ?stream_id, "response joins http/2 stream");
            base.head_mut().headers_mut().insert(STREAM_ID, stream_id);
        }
        Self { base, trailers: HeaderMap::new(), reason_phrase: None }
    }

    /// A response read from the wire.
    pub fn inbound(head: Response<()>, context: Option<Arc<dyn ServiceContext>>, config: Arc<HttpConfig>) -> Self {
        Self { base: BaseMessage::inbound(head, context, config), trailers: HeaderMap::new(), reason_phrase: None }
    }

    // ===== status line =====

    pub fn status(&self) -> StatusCode {
        self.head().status()
    }

    pub fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    /// Sets the status and drops any reason phrase override.
    pub fn set_status(&mut self, status: StatusCode) {
        *self.base.head_mut().status_mut() = status;
        self.reason_phrase = None;
    }

    /// Sets a raw status code. Codes outside `100..=999` are rejected.
    pub fn set_status_code(&mut self, code: u16) -> Result<(), MessageError> {
        let status = StatusCode::from_u16(code).map_err(|e| {
            debug!(code, error = %e, "reject status code");
            MessageError::InvalidStatus { code }
        })?;
        self.set_status(status);
        Ok(())
    }

    /// The reason phrase override, or the canonical phrase of the status code.
    pub fn reason_phrase(&self) -> &str {
        self.reason_phrase.as_deref().or_else(|| self.status().canonical_reason()).unwrap_or_default()
    }

    pub fn reason_phrase_bytes(&self) -> &[u8] {
        self.reason_phrase().as_bytes()
    }

    pub fn set_reason_phrase<R: Into<String>>(&mut self, reason: R) {
        self.reason_phrase = Some(reason.into());
    }

    // ===== exchange =====

    /// The protocol version, HTTP/2 when either side of the exchange carries a stream id.
    pub fn version(&self) -> Version {
        if self.base.request_header(&STREAM_ID).is_some() { Version::HTTP_2 } else { self.base.version() }
    }

    pub fn version_name(&self) -> &'static str {
        if self.version() == Version::HTTP_2 { "HTTP/2.0" } else { self.base.version_name() }
    }

    pub fn is_head_request(&self) -> bool {
        self.context().is_some_and(|context| context.request_method() == Method::HEAD)
    }

    /// Bytes written for this exchange so far, 0 without a context.
    pub fn bytes_written(&self) -> u64 {
        self.context().map_or(0, |context| context.bytes_written())
    }

    // ===== body rules =====

    /// Whether a body follows this response on the wire.
    ///
    /// HTTP/1.0 only looks at [`ResponseMessage::is_body_allowed`]. A response to HEAD
    /// never has one. Otherwise framing headers, Content-Encoding or Content-Range signal
    /// a body, as long as the status code allows it.
    pub fn is_body_expected(&self) -> bool {
        if self.base.head().version() == Version::HTTP_10 {
            return self.is_body_allowed();
        }
        if self.is_head_request() {
            return false;
        }

        let signalled = self.base.is_body_expected()
            || self.headers().contains_key(CONTENT_ENCODING)
            || self.headers().contains_key(CONTENT_RANGE);
        signalled && self.is_body_allowed_for_status_code()
    }

    pub fn is_body_allowed(&self) -> bool {
        !self.is_head_request() && self.is_body_allowed_for_status_code() && self.base.is_body_allowed()
    }

    /// False for informational codes other than 101, for 204 and for 304.
    pub fn is_body_allowed_for_status_code(&self) -> bool {
        match self.status_code() {
            101 => true,
            100..=199 | 204 | 304 => false,
            _ => true,
        }
    }

    // ===== trailers =====

    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    pub fn trailers_mut(&mut self) -> &mut HeaderMap {
        &mut self.trailers
    }

    // ===== lifecycle =====

    /// A fresh, uncommitted copy of the status line, headers and trailers sharing this
    /// message's context and configuration.
    pub fn duplicate(&self) -> Self {
        let mut head = Response::new(());
        *head.status_mut() = self.status();
        *head.version_mut() = self.head().version();
        *head.headers_mut() = self.headers().clone();

        let base = BaseMessage::outbound(head, self.context().map(Arc::clone), Arc::clone(self.config()));
        Self { base, trailers: self.trailers.clone(), reason_phrase: self.reason_phrase.clone() }
    }

    /// Resets status to 200, version to HTTP/1.1 and drops headers and trailers.
    pub fn clear(&mut self) {
        self.base.clear();
        self.trailers.clear();
        self.reason_phrase = None;
    }

    pub fn destroy(&mut self) {
        self.clear();
    }

    /// Writes the Date header from the shared formatter.
    pub fn set_current_date(&mut self) -> Result<(), MessageError> {
        let date = DateFormatter::global().rfc1123(self.config().date_header_range());
        self.base.set_header(DATE, date)
    }

    /// Encodes one cookie straight into a header line.
    ///
    /// With duplicate suppression on, a line already carrying a cookie of the same name is
    /// replaced in place. Otherwise the line is appended. Returns false when the message
    /// is committed or the cookie cannot be encoded.
    ///
    /// The overwrite is per cookie name: lines carrying other cookies are kept rather than
    /// the whole header being set to the new line.
    pub fn process_cookie(&mut self, cookie: &Cookie, header: CookieHeader) -> bool {
        if self.is_committed() {
            debug!(cookie = cookie.name(), %header, "message committed, cookie not processed");
            return false;
        }

        let config = Arc::clone(self.config());
        let mut cookie = cookie.clone();
        if header.is_set_cookie() {
            let user_agent = self.base.request_header(&USER_AGENT);
            apply_policy(&mut cookie, &config, user_agent.as_ref().and_then(|value| value.to_str().ok()));
        }

        let Some(line) = encode(&cookie, header, &config.encode_policy()) else {
            debug!(cookie = cookie.name(), %header, "cookie can not be encoded");
            return false;
        };
        let value = match HeaderValue::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                warn!(%header, %line, error = %e, "encoded cookie is not a valid header value");
                return false;
            }
        };

        let name = header.header_name();
        let headers = self.base.head_mut().headers_mut();
        if header.is_set_cookie() && config.do_not_allow_duplicate_set_cookies() && headers.contains_key(&name) {
            let mut lines: Vec<HeaderValue> = headers.get_all(&name).iter().cloned().collect();
            let existing = lines.iter().position(|line| {
                decode(&String::from_utf8_lossy(line.as_bytes()), header).first().is_some_and(|c| c.name() == cookie.name())
            });
            if let Some(index) = existing {
                debug!(cookie = cookie.name(), %header, "overwrite duplicated cookie");
                lines[index] = value;
                headers.remove(&name);
                for line in lines {
                    headers.append(&name, line);
                }
                return true;
            }
        }

        headers.append(&name, value);
        true
    }

    // ===== binary serialization =====

    /// Saves the response in the current layout: the base fields followed by the status
    /// code and the reason phrase.
    pub fn write_external<B: BufMut>(&mut self, buf: &mut B) -> Result<(), SerializationError> {
        self.write_external_as(buf, ExternalFormat::Current)
    }

    pub fn write_external_as<B: BufMut>(&mut self, buf: &mut B, format: ExternalFormat) -> Result<(), SerializationError> {
        let mut writer = ExternalWriter::begin(buf, format);
        self.base.write_fields(&mut writer)?;
        writer.put_status(self.status_code())?;
        writer.put_byte_array(self.reason_phrase_bytes())?;
        Ok(())
    }

    pub fn write_to<W: io::Write>(&mut self, writer: &mut W) -> Result<(), SerializationError> {
        let mut buf = BytesMut::new();
        self.write_external(&mut buf)?;
        writer.write_all(&buf)?;
        Ok(())
    }

    pub fn read_from<R: io::Read>(&mut self, reader: &mut R) -> Result<(), SerializationError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.read_external(&mut data.as_slice())
    }

    pub fn read_external<B: Buf>(&mut self, buf: &mut B) -> Result<(), SerializationError> {
        let mut reader = ExternalReader::begin(buf)?;
        let fields = SavedFields::read(&mut reader)?;

        let code = reader.get_status()?;
        let status = u16::try_from(code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or(SerializationError::InvalidStatus { code })?;
        let reason = reader.get_byte_array()?;
        let reason = String::from_utf8(reason.to_vec()).map_err(SerializationError::invalid_string)?;

        self.base.restore(fields);
        self.set_status(status);
        if status.canonical_reason() != Some(reason.as_str()) {
            self.reason_phrase = Some(reason);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::SameSite;
    use crate::message::MockServiceContext;
    use http::header::{CONTENT_LENGTH, SET_COOKIE};

    fn response(config: HttpConfig) -> ResponseMessage {
        ResponseMessage::outbound(Response::new(()), None, Arc::new(config))
    }

    fn with_context(context: MockServiceContext) -> ResponseMessage {
        ResponseMessage::outbound(Response::new(()), Some(Arc::new(context)), Arc::new(HttpConfig::default()))
    }

    fn request_method(method: Method) -> MockServiceContext {
        let mut context = MockServiceContext::new();
        context.expect_request_method().returning(move || method.clone());
        context.expect_request_header().returning(|_| None);
        context
    }

    fn set_cookie_lines(message: &ResponseMessage) -> Vec<String> {
        message.headers().get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap().to_owned()).collect()
    }

    #[test]
    fn body_allowed_boundary() {
        let mut message = response(HttpConfig::default());
        for (code, allowed) in
            [(100, false), (101, true), (150, false), (199, false), (200, true), (204, false), (300, true), (304, false), (305, true)]
        {
            message.set_status_code(code).unwrap();
            assert_eq!(message.is_body_allowed_for_status_code(), allowed, "status {code}");
        }
    }

    #[test]
    fn no_content_never_expects_body() {
        let mut message = response(HttpConfig::default());
        message.set_status(StatusCode::NO_CONTENT);
        message.set_content_length(10);
        assert!(!message.is_body_expected());
        assert!(!message.is_body_allowed());
    }

    #[test]
    fn head_request_never_expects_body() {
        let mut message = with_context(request_method(Method::HEAD));
        message.set_content_length(100);
        assert!(message.is_head_request());
        assert!(!message.is_body_expected());
        assert!(!message.is_body_allowed());
    }

    #[test]
    fn content_encoding_signals_body() {
        let mut message = with_context(request_method(Method::GET));
        assert!(!message.is_body_expected());

        message.set_header(CONTENT_ENCODING, "gzip").unwrap();
        assert!(message.is_body_expected());

        message.set_status(StatusCode::NOT_MODIFIED);
        assert!(!message.is_body_expected());
    }

    #[test]
    fn http_10_uses_body_allowed() {
        let mut message = response(HttpConfig::default());
        message.set_http_version(Version::HTTP_10);
        assert!(message.is_body_expected());

        message.set_content_length(0);
        assert!(!message.is_body_expected());
    }

    #[test]
    fn stream_id_on_response_reports_http2() {
        let mut message = response(HttpConfig::default());
        assert_eq!(message.version_name(), "HTTP/1.1");

        message.set_header(STREAM_ID, "5").unwrap();
        assert_eq!(message.version(), Version::HTTP_2);
        assert_eq!(message.version_name(), "HTTP/2.0");
    }

    #[test]
    fn stream_id_on_request_is_copied() {
        let mut context = MockServiceContext::new();
        context
            .expect_request_header()
            .returning(|name| (*name == STREAM_ID).then(|| HeaderValue::from_static("7")));

        let message = with_context(context);
        assert_eq!(message.version(), Version::HTTP_2);
        assert_eq!(message.header(STREAM_ID).as_str(), "7");
    }

    #[test]
    fn status_and_reason() {
        let mut message = response(HttpConfig::default());
        assert_eq!(message.status_code(), 200);
        assert_eq!(message.reason_phrase(), "OK");

        message.set_status_code(404).unwrap();
        assert_eq!(message.reason_phrase_bytes(), b"Not Found");

        message.set_reason_phrase("Nothing Here");
        assert_eq!(message.reason_phrase(), "Nothing Here");

        message.set_status_code(599).unwrap();
        assert_eq!(message.reason_phrase(), "");

        assert!(matches!(message.set_status_code(99), Err(MessageError::InvalidStatus { code: 99 })));
        assert!(matches!(message.set_status_code(1000), Err(MessageError::InvalidStatus { code: 1000 })));
        assert_eq!(message.status_code(), 599);
    }

    #[test]
    fn bytes_written_from_context() {
        let mut context = MockServiceContext::new();
        context.expect_request_header().returning(|_| None);
        context.expect_bytes_written().times(1).return_const(128_u64);

        let message = with_context(context);
        assert_eq!(message.bytes_written(), 128);
        assert_eq!(response(HttpConfig::default()).bytes_written(), 0);
    }

    #[test]
    fn duplicate_is_uncommitted_copy() {
        let mut message = response(HttpConfig::default());
        message.set_status(StatusCode::CREATED);
        message.set_header("location", "/items/1").unwrap();
        message.trailers_mut().insert("x-checksum", HeaderValue::from_static("abc"));
        message.set_committed();

        let copy = message.duplicate();
        assert!(!copy.is_committed());
        assert_eq!(copy.status(), StatusCode::CREATED);
        assert_eq!(copy.header("location").as_str(), "/items/1");
        assert_eq!(copy.trailers().get("x-checksum").unwrap(), "abc");
        assert!(Arc::ptr_eq(copy.config(), message.config()));
    }

    #[test]
    fn clear_restores_defaults() {
        let mut message = response(HttpConfig::default());
        message.set_status(StatusCode::BAD_GATEWAY);
        message.set_http_version(Version::HTTP_10);
        message.set_reason_phrase("Upstream Down");
        message.trailers_mut().insert("x-a", HeaderValue::from_static("1"));
        message.set_header(CONTENT_LENGTH, "3").unwrap();

        message.clear();
        assert_eq!(message.status(), StatusCode::OK);
        assert_eq!(message.version(), Version::HTTP_11);
        assert_eq!(message.reason_phrase(), "OK");
        assert!(message.trailers().is_empty());
        assert_eq!(message.number_of_headers(), 0);
    }

    #[test]
    fn current_date_header() {
        let mut message = response(HttpConfig::default());
        message.set_current_date().unwrap();

        let date = message.header(DATE).as_str().into_owned();
        assert!(date.ends_with(" GMT"));
        httpdate::parse_http_date(&date).unwrap();
    }

    #[test]
    fn process_cookie_appends_without_suppression() {
        let mut message = response(HttpConfig::default());
        assert!(message.process_cookie(&Cookie::new("a", "1"), CookieHeader::SetCookie));
        assert!(message.process_cookie(&Cookie::new("a", "2"), CookieHeader::SetCookie));
        assert!(!message.process_cookie(&Cookie::new("bad name", "x"), CookieHeader::SetCookie));
        assert_eq!(set_cookie_lines(&message), ["a=1", "a=2"]);
    }

    #[test]
    fn process_cookie_overwrites_with_suppression() {
        let config = HttpConfig::builder().do_not_allow_duplicate_set_cookies(true).build().unwrap();
        let mut message = response(config);
        message.process_cookie(&Cookie::new("a", "1"), CookieHeader::SetCookie);
        message.process_cookie(&Cookie::new("b", "1"), CookieHeader::SetCookie);
        message.process_cookie(&Cookie::new("a", "2"), CookieHeader::SetCookie);
        assert_eq!(set_cookie_lines(&message), ["a=2", "b=1"]);

        message.set_committed();
        assert!(!message.process_cookie(&Cookie::new("c", "1"), CookieHeader::SetCookie));
    }

    #[test]
    fn same_site_exact_name_beats_pattern() {
        let config = HttpConfig::builder().same_site_lax(["session"]).same_site_strict(["s*"]).build().unwrap();
        let mut message = response(config);
        message.process_cookie(&Cookie::new("session", "1"), CookieHeader::SetCookie);
        message.process_cookie(&Cookie::new("support", "1"), CookieHeader::SetCookie);
        message.process_cookie(&Cookie::new("other", "1"), CookieHeader::SetCookie);

        assert_eq!(set_cookie_lines(&message), ["session=1; SameSite=Lax", "support=1; SameSite=Strict", "other=1"]);
    }

    #[test]
    fn explicit_same_site_none_gets_partitioned() {
        let config = HttpConfig::builder().same_site_lax(["unrelated"]).partitioned(true).build().unwrap();
        let mut message = response(config);

        let mut cookie = Cookie::new("embed", "1");
        cookie.set_secure(true);
        cookie.set_attribute("samesite", Some(SameSite::None.as_str()));
        message.set_cookie(cookie, CookieHeader::SetCookie);
        message.process_cookies();

        assert_eq!(set_cookie_lines(&message), ["embed=1; Secure; SameSite=None; Partitioned"]);
    }

    #[test]
    fn serialization_round_trip() {
        let mut message = response(HttpConfig::default());
        message.set_status(StatusCode::NOT_FOUND);
        message.set_header("content-type", "text/plain").unwrap();

        let mut custom = response(HttpConfig::default());
        custom.set_status_code(299).unwrap();
        custom.set_reason_phrase("Fine Anyway");

        for format in [ExternalFormat::Current, ExternalFormat::Legacy] {
            let mut buf = BytesMut::new();
            message.write_external_as(&mut buf, format).unwrap();
            let mut restored = ResponseMessage::new();
            restored.read_external(&mut buf.freeze()).unwrap();
            assert_eq!(restored.status(), StatusCode::NOT_FOUND);
            assert_eq!(restored.reason_phrase(), "Not Found");
            assert_eq!(restored.header("content-type").as_str(), "text/plain");

            let mut buf = BytesMut::new();
            custom.write_external_as(&mut buf, format).unwrap();
            let mut restored = ResponseMessage::new();
            restored.read_external(&mut buf.freeze()).unwrap();
            assert_eq!(restored.status_code(), 299);
            assert_eq!(restored.reason_phrase(), "Fine Anyway");
        }
    }

    #[test]
    fn legacy_status_layout() {
        let mut message = response(HttpConfig::default());
        message.set_status(StatusCode::ACCEPTED);

        let mut buf = BytesMut::new();
        message.write_external_as(&mut buf, ExternalFormat::Legacy).unwrap();
        // ... version string, trailer byte, i32 status, i32 length, "Accepted"
        assert!(buf.ends_with(b"\x74\x00\x08HTTP/1.1\x00\x00\x00\x00\xca\x00\x00\x00\x08Accepted"));
    }

    #[test]
    fn invalid_status_in_stream() {
        let mut buf = BytesMut::new();
        let mut writer = ExternalWriter::begin(&mut buf, ExternalFormat::Legacy);
        writer.put_count(0).unwrap();
        writer.put_count(0).unwrap();
        writer.put_field(b"HTTP/1.1").unwrap();
        writer.put_flag(false);
        buf.put_i32(42);

        let mut message = ResponseMessage::new();
        message.set_status(StatusCode::ACCEPTED);
        message.set_header("location", "/jobs/1").unwrap();
        assert!(matches!(message.read_external(&mut buf.freeze()), Err(SerializationError::InvalidStatus { code: 42 })));
        assert_eq!(message.status(), StatusCode::ACCEPTED);
        assert_eq!(message.header("location").as_str(), "/jobs/1");
        assert_eq!(message.deserialization_format(), None);
    }
}
