use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Buf, BufMut, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, EXPECT, TRANSFER_ENCODING, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Version};
use indexmap::IndexMap;
use mime::Mime;
use tracing::{debug, trace, warn};

use crate::config::HttpConfig;
use crate::cookie::{Cookie, CookieCache, CookieHeader, apply_policy, encode};
use crate::error::{MessageError, SerializationError};
use crate::header::HeaderField;
use crate::utils::ensure;

use super::serialize::{ExternalFormat, ExternalReader, ExternalWriter};
use super::{ConnectionValue, MessageHead, STREAM_ID, ServiceContext, TransferEncoding};

/// State and behaviour shared by request and response messages.
///
/// The message wraps the head handed over by the transport and proxies header access to
/// it. Cookies are decoded lazily into one [`CookieCache`] per cookie header type; for
/// inbound messages each read first decodes any header lines the cache has not seen yet,
/// outbound messages only ever write their caches back out (see
/// [`BaseMessage::process_cookies`]).
pub struct BaseMessage<H> {
    head: H,
    incoming: bool,
    committed: bool,
    initialized: bool,
    config: Arc<HttpConfig>,
    context: Option<Arc<dyn ServiceContext>>,
    caches: [Option<CookieCache>; 4],
    limit_on_number_of_headers: usize,
    limit_of_token_size: usize,
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    deserialization_format: Option<ExternalFormat>,
}

impl<H: MessageHead + fmt::Debug> fmt::Debug for BaseMessage<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseMessage")
            .field("head", &self.head)
            .field("incoming", &self.incoming)
            .field("committed", &self.committed)
            .field("initialized", &self.initialized)
            .field("has_context", &self.context.is_some())
            .field("caches", &self.caches)
            .finish_non_exhaustive()
    }
}

impl<H: MessageHead + Default> Default for BaseMessage<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: MessageHead + Default> BaseMessage<H> {
    /// Creates a blank message waiting for [`BaseMessage::init`].
    pub fn new() -> Self {
        let config = Arc::new(HttpConfig::default());
        Self {
            head: H::default(),
            incoming: false,
            committed: false,
            initialized: false,
            limit_on_number_of_headers: config.limit_on_number_of_headers(),
            limit_of_token_size: config.limit_of_field_size(),
            config,
            context: None,
            caches: Default::default(),
            start_time: None,
            end_time: None,
            deserialization_format: None,
        }
    }

    /// A message read from the wire.
    pub fn inbound(head: H, context: Option<Arc<dyn ServiceContext>>, config: Arc<HttpConfig>) -> Self {
        let mut message = Self::new();
        message.init(head, context, config);
        message.incoming = true;
        message
    }

    /// A message being built for sending.
    pub fn outbound(head: H, context: Option<Arc<dyn ServiceContext>>, config: Arc<HttpConfig>) -> Self {
        let mut message = Self::new();
        message.init(head, context, config);
        message
    }

    /// Resets the message to its blank, uninitialized state so it can be reused.
    pub fn clear(&mut self) {
        self.head = H::default();
        self.incoming = false;
        self.committed = false;
        self.initialized = false;
        self.context = None;
        self.caches = Default::default();
        self.start_time = None;
        self.end_time = None;
        self.deserialization_format = None;
    }

    pub fn destroy(&mut self) {
        self.clear();
    }
}

impl<H: MessageHead> BaseMessage<H> {
    /// Binds the message to a head, an exchange context and the configuration.
    ///
    /// Only the first call has an effect, later calls return false and leave the
    /// message untouched.
    pub fn init(&mut self, head: H, context: Option<Arc<dyn ServiceContext>>, config: Arc<HttpConfig>) -> bool {
        if self.initialized {
            debug!("message already initialized, ignore init");
            return false;
        }
        self.head = head;
        self.context = context;
        self.limit_on_number_of_headers = config.limit_on_number_of_headers();
        self.limit_of_token_size = config.limit_of_field_size();
        self.config = config;
        self.initialized = true;
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn head(&self) -> &H {
        &self.head
    }

    /// Direct access to the head, bypassing header limits.
    pub fn head_mut(&mut self) -> &mut H {
        &mut self.head
    }

    pub fn config(&self) -> &Arc<HttpConfig> {
        &self.config
    }

    pub fn context(&self) -> Option<&Arc<dyn ServiceContext>> {
        self.context.as_ref()
    }

    pub fn is_incoming(&self) -> bool {
        self.incoming
    }

    pub fn set_incoming(&mut self, incoming: bool) {
        self.incoming = incoming;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn set_committed(&mut self) {
        self.committed = true;
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_time
    }

    pub fn set_start_time(&mut self, time: SystemTime) {
        self.start_time = Some(time);
    }

    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    pub fn set_end_time(&mut self, time: SystemTime) {
        self.end_time = Some(time);
    }

    /// Layout of the stream this message was last restored from.
    pub fn deserialization_format(&self) -> Option<ExternalFormat> {
        self.deserialization_format
    }

    pub fn set_debug_context(&mut self, _context: &str) -> Result<(), MessageError> {
        Err(MessageError::unsupported("set_debug_context"))
    }

    // ===== headers =====

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn limit_on_number_of_headers(&self) -> usize {
        self.limit_on_number_of_headers
    }

    pub fn set_limit_on_number_of_headers(&mut self, limit: usize) {
        self.limit_on_number_of_headers = limit;
    }

    pub fn limit_of_token_size(&self) -> usize {
        self.limit_of_token_size
    }

    pub fn set_limit_of_token_size(&mut self, limit: usize) {
        self.limit_of_token_size = limit;
    }

    /// First instance of a header, an absent view when there is none.
    pub fn header<N: AsRef<[u8]>>(&self, name: N) -> HeaderField<'_> {
        let name = name.as_ref();
        match HeaderName::from_bytes(name) {
            Ok(header_name) => {
                let value = self.headers().get(&header_name);
                HeaderField::from_parts(header_name.as_str().to_owned(), value)
            }
            Err(_) => HeaderField::absent(String::from_utf8_lossy(name).into_owned()),
        }
    }

    /// Every instance of a header, in order.
    pub fn header_instances<N: AsRef<[u8]>>(&self, name: N) -> Vec<HeaderField<'_>> {
        let Ok(name) = HeaderName::from_bytes(name.as_ref()) else {
            return Vec::new();
        };
        self.headers()
            .get_all(&name)
            .iter()
            .map(|value| HeaderField::from_parts(name.as_str().to_owned(), Some(value)))
            .collect()
    }

    pub fn all_headers(&self) -> Vec<HeaderField<'_>> {
        self.headers().iter().map(|(name, value)| HeaderField::new(name, value)).collect()
    }

    pub fn all_header_names(&self) -> Vec<&HeaderName> {
        self.headers().keys().collect()
    }

    pub fn contains_header<N: AsRef<[u8]>>(&self, name: N) -> bool {
        HeaderName::from_bytes(name.as_ref()).is_ok_and(|name| self.headers().contains_key(name))
    }

    pub fn number_of_header_instances<N: AsRef<[u8]>>(&self, name: N) -> usize {
        HeaderName::from_bytes(name.as_ref()).map_or(0, |name| self.headers().get_all(name).iter().count())
    }

    pub fn number_of_headers(&self) -> usize {
        self.headers().len()
    }

    /// Adds a header instance after the existing ones.
    pub fn append_header<N, V>(&mut self, name: N, value: V) -> Result<(), MessageError>
    where
        N: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let (name, value) = self.checked_header(name.as_ref(), value.as_ref())?;
        let count = self.headers().len();
        ensure!(count < self.limit_on_number_of_headers, MessageError::too_many_headers(self.limit_on_number_of_headers));
        self.head.headers_mut().append(name, value);
        Ok(())
    }

    /// Replaces every instance of a header with a single value.
    ///
    /// Replacing a cookie header drops its cookie cache, including cookies set but not yet
    /// processed; the new line is decoded on the next read.
    pub fn set_header<N, V>(&mut self, name: N, value: V) -> Result<(), MessageError>
    where
        N: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let (name, value) = self.checked_header(name.as_ref(), value.as_ref())?;
        let count = self.headers().len() - self.headers().get_all(&name).iter().count();
        ensure!(count < self.limit_on_number_of_headers, MessageError::too_many_headers(self.limit_on_number_of_headers));
        self.reset_cookie_cache(&name);
        self.head.headers_mut().insert(name, value);
        Ok(())
    }

    /// Sets a header only when no instance exists yet. Returns true when it was set.
    pub fn set_header_if_absent<N, V>(&mut self, name: N, value: V) -> Result<bool, MessageError>
    where
        N: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if self.contains_header(name.as_ref()) {
            return Ok(false);
        }
        self.set_header(name, value)?;
        Ok(true)
    }

    pub fn append_header_range<N: AsRef<[u8]>>(
        &mut self,
        _name: N,
        _value: &[u8],
        _offset: usize,
        _length: usize,
    ) -> Result<(), MessageError> {
        Err(MessageError::unsupported("append_header_range"))
    }

    pub fn set_header_range<N: AsRef<[u8]>>(
        &mut self,
        _name: N,
        _value: &[u8],
        _offset: usize,
        _length: usize,
    ) -> Result<(), MessageError> {
        Err(MessageError::unsupported("set_header_range"))
    }

    /// Removes every instance of a header. Returns false when there was none.
    pub fn remove_header<N: AsRef<[u8]>>(&mut self, name: N) -> bool {
        let Ok(name) = HeaderName::from_bytes(name.as_ref()) else {
            return false;
        };
        self.reset_cookie_cache(&name);
        self.head.headers_mut().remove(name).is_some()
    }

    /// Removes the `index`-th instance of a header, keeping the others in order.
    pub fn remove_header_instance<N: AsRef<[u8]>>(&mut self, name: N, index: usize) -> bool {
        let Ok(name) = HeaderName::from_bytes(name.as_ref()) else {
            return false;
        };
        let values: Vec<HeaderValue> = self.headers().get_all(&name).iter().cloned().collect();
        if index >= values.len() {
            return false;
        }

        self.reset_cookie_cache(&name);
        let headers = self.head.headers_mut();
        headers.remove(&name);
        for (i, value) in values.into_iter().enumerate() {
            if i != index {
                headers.append(name.clone(), value);
            }
        }
        true
    }

    pub fn remove_all_headers(&mut self) {
        self.head.headers_mut().clear();
        self.caches = Default::default();
    }

    fn checked_header(&self, name: &[u8], value: &[u8]) -> Result<(HeaderName, HeaderValue), MessageError> {
        ensure!(value.len() <= self.limit_of_token_size, MessageError::header_too_large(value.len(), self.limit_of_token_size));
        let name = HeaderName::from_bytes(name).map_err(MessageError::invalid_header)?;
        let value = HeaderValue::from_bytes(value).map_err(MessageError::invalid_header)?;
        Ok((name, value))
    }

    // ===== framing =====

    /// The Content-Length value, `None` when unset or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.headers().get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
    }

    /// Sets Content-Length and drops any Transfer-Encoding.
    pub fn set_content_length(&mut self, length: u64) {
        let headers = self.head.headers_mut();
        headers.remove(TRANSFER_ENCODING);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    pub fn transfer_encoding(&self) -> TransferEncoding {
        if self.is_chunked_encoding_set() { TransferEncoding::Chunked } else { TransferEncoding::Identity }
    }

    /// Chunked drops Content-Length, identity removes the Transfer-Encoding header.
    pub fn set_transfer_encoding(&mut self, encoding: TransferEncoding) {
        let headers = self.head.headers_mut();
        match encoding {
            TransferEncoding::Chunked => {
                headers.remove(CONTENT_LENGTH);
                headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            TransferEncoding::Identity => {
                headers.remove(TRANSFER_ENCODING);
            }
        }
    }

    /// Returns true when `chunked` is the final transfer coding.
    pub fn is_chunked_encoding_set(&self) -> bool {
        self.headers()
            .get_all(TRANSFER_ENCODING)
            .iter()
            .last()
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.rsplit(',').next())
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
    }

    pub fn set_content_encoding(&mut self, _encoding: &str) -> Result<(), MessageError> {
        Err(MessageError::unsupported("set_content_encoding"))
    }

    /// Chunked framing or a positive Content-Length.
    pub fn is_body_expected(&self) -> bool {
        self.is_chunked_encoding_set() || self.content_length().is_some_and(|length| length > 0)
    }

    /// Anything but an explicit `Content-Length: 0`.
    pub fn is_body_allowed(&self) -> bool {
        self.content_length() != Some(0)
    }

    // ===== connection, expect and content type =====

    pub fn connection(&self) -> Vec<ConnectionValue> {
        self.headers()
            .get_all(CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter(|token| !token.trim().is_empty())
            .map(ConnectionValue::parse)
            .collect()
    }

    pub fn is_connection_set(&self) -> bool {
        self.headers().contains_key(CONNECTION)
    }

    /// Writes the literal for a known token, extension tokens are rejected.
    pub fn set_connection(&mut self, value: &ConnectionValue) -> Result<(), MessageError> {
        let literal = value.as_literal().ok_or_else(|| MessageError::unsupported("set_connection with an extension token"))?;
        self.head.headers_mut().insert(CONNECTION, HeaderValue::from_static(literal));
        Ok(())
    }

    /// HTTP/1.1 and later keep the connection unless `close` is listed, older versions
    /// need an explicit `keep-alive`.
    pub fn is_keep_alive_set(&self) -> bool {
        let tokens = self.connection();
        if tokens.contains(&ConnectionValue::Close) {
            return false;
        }
        match self.head.version() {
            Version::HTTP_09 | Version::HTTP_10 => tokens.contains(&ConnectionValue::KeepAlive),
            _ => true,
        }
    }

    pub fn is_expect_100_continue(&self) -> bool {
        self.headers()
            .get(EXPECT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
    }

    pub fn mime_type(&self) -> Option<Mime> {
        self.headers().get(CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    pub fn set_mime_type(&mut self, mime: &Mime) -> Result<(), MessageError> {
        let value = HeaderValue::from_str(mime.as_ref()).map_err(MessageError::invalid_header)?;
        self.head.headers_mut().insert(CONTENT_TYPE, value);
        Ok(())
    }

    pub fn charset(&self) -> Option<String> {
        self.mime_type()?.get_param(mime::CHARSET).map(|charset| charset.as_str().to_owned())
    }

    /// Replaces the charset parameter of the current Content-Type.
    pub fn set_charset(&mut self, charset: &str) -> Result<(), MessageError> {
        let current = self.mime_type().ok_or_else(|| MessageError::invalid_header("content-type is not set"))?;
        let params = current
            .params()
            .filter(|(name, _)| *name != mime::CHARSET)
            .map(|(name, param)| format!("; {name}={param}"))
            .collect::<String>();
        let value = format!("{}{params}; charset={charset}", current.essence_str());

        let value = HeaderValue::from_str(&value).map_err(MessageError::invalid_header)?;
        self.head.headers_mut().insert(CONTENT_TYPE, value);
        Ok(())
    }

    // ===== version =====

    /// The protocol version, reported as HTTP/2 whenever the stream identifier is present.
    pub fn version(&self) -> Version {
        if self.headers().contains_key(STREAM_ID) { Version::HTTP_2 } else { self.head.version() }
    }

    pub fn version_name(&self) -> &'static str {
        version_name(self.version())
    }

    /// Parses and sets the protocol version, e.g. `HTTP/1.0`.
    pub fn set_version<V: AsRef<[u8]>>(&mut self, version: V) -> Result<(), MessageError> {
        let version = parse_version(version.as_ref())?;
        self.head.set_version(version);
        Ok(())
    }

    pub fn set_http_version(&mut self, version: Version) {
        self.head.set_version(version);
    }

    // ===== cookies =====

    /// The cache of one cookie header, decoding new header lines first when inbound.
    fn cache_mut(&mut self, header: CookieHeader) -> &mut CookieCache {
        let cache = self.caches[header.index()].get_or_insert_with(|| CookieCache::new(header));
        if self.incoming {
            let decoded = cache.catch_up(self.head.headers().get_all(header.header_name()));
            if decoded > 0 {
                trace!(%header, decoded, cursor = cache.header_index(), "cookie cache caught up");
            }
        }
        cache
    }

    /// The header holding `name`, trying the primary cookie header first.
    fn locate_cookie(&mut self, name: &str) -> Option<CookieHeader> {
        [H::PRIMARY_COOKIE, H::SECONDARY_COOKIE].into_iter().find(|header| self.cache_mut(*header).contains(name))
    }

    pub fn get_cookie(&mut self, name: &str) -> Option<&Cookie> {
        let header = self.locate_cookie(name)?;
        self.caches[header.index()].as_ref()?.get_cookie(name)
    }

    /// Value of the named cookie, `None` when absent or empty.
    pub fn cookie_value(&mut self, name: &str) -> Option<Vec<u8>> {
        let value = self.get_cookie(name)?.value();
        (!value.is_empty()).then(|| value.as_bytes().to_vec())
    }

    /// Cookies of the primary header, or of the secondary one when there are none.
    pub fn all_cookies(&mut self) -> Vec<Cookie> {
        let primary = self.cache_mut(H::PRIMARY_COOKIE).cookies().to_vec();
        if !primary.is_empty() {
            return primary;
        }
        self.cache_mut(H::SECONDARY_COOKIE).cookies().to_vec()
    }

    pub fn all_cookies_named(&mut self, name: &str) -> Vec<Cookie> {
        let primary: Vec<Cookie> = self.cache_mut(H::PRIMARY_COOKIE).cookies_named(name).cloned().collect();
        if !primary.is_empty() {
            return primary;
        }
        self.cache_mut(H::SECONDARY_COOKIE).cookies_named(name).cloned().collect()
    }

    pub fn all_cookie_values(&mut self, name: &str) -> Vec<String> {
        self.all_cookies_named(name).into_iter().map(|cookie| cookie.value().to_owned()).collect()
    }

    /// The cookies of one specific header type.
    pub fn cookies(&mut self, header: CookieHeader) -> &[Cookie] {
        self.cache_mut(header).cookies()
    }

    /// Adds a cookie to be written in `header`. Fails once the message is committed.
    pub fn set_cookie(&mut self, cookie: Cookie, header: CookieHeader) -> bool {
        if self.committed {
            debug!(cookie = cookie.name(), %header, "message committed, cookie not set");
            return false;
        }
        self.cache_mut(header).add_new_cookie(cookie);
        true
    }

    pub fn set_cookie_value(&mut self, name: &str, value: &str, header: CookieHeader) -> bool {
        self.set_cookie(Cookie::new(name, value), header)
    }

    /// Removes the first cookie named `name` from `header`. Fails once committed.
    pub fn remove_cookie(&mut self, name: &str, header: CookieHeader) -> bool {
        if self.committed {
            debug!(cookie = name, %header, "message committed, cookie not removed");
            return false;
        }
        self.cache_mut(header).remove_named(name)
    }

    pub fn contains_cookie(&mut self, name: &str, header: CookieHeader) -> bool {
        self.cache_mut(header).contains(name)
    }

    /// Writes pending cookie changes back into the headers before the message is sent.
    ///
    /// Set-Cookie headers are rewritten even when untouched whenever a SameSite policy
    /// or duplicate suppression is configured, so the policy applies to every cookie.
    pub fn process_cookies(&mut self) {
        if H::PRIMARY_COOKIE.is_set_cookie()
            && (self.config.use_same_site_config() || self.config.do_not_allow_duplicate_set_cookies())
        {
            for header in [H::PRIMARY_COOKIE, H::SECONDARY_COOKIE] {
                if self.headers().contains_key(header.header_name()) {
                    debug!(%header, "force cookie cache dirty to apply configuration");
                    self.caches[header.index()].get_or_insert_with(|| CookieCache::new(header)).set_dirty(true);
                }
            }
        }

        self.marshall_cookies(H::PRIMARY_COOKIE);
        self.marshall_cookies(H::SECONDARY_COOKIE);
    }

    /// Rewrites the header lines of a dirty cache from its cookies.
    fn marshall_cookies(&mut self, header: CookieHeader) {
        let Some(mut cache) = self.caches[header.index()].take() else {
            return;
        };
        if !cache.is_dirty() {
            self.caches[header.index()] = Some(cache);
            return;
        }

        let header_name = header.header_name();
        cache.catch_up(self.head.headers().get_all(&header_name));
        self.head.headers_mut().remove(&header_name);

        let policy = self.config.encode_policy();
        let user_agent = if header.is_set_cookie() { self.request_header(&USER_AGENT) } else { None };
        let user_agent = user_agent.as_ref().and_then(|value| value.to_str().ok());
        let suppress_duplicates = header.is_set_cookie() && self.config.do_not_allow_duplicate_set_cookies();

        let mut lines = Vec::new();
        let mut unique: IndexMap<String, String> = IndexMap::new();
        for cookie in cache.cookies_mut() {
            cookie.set_version(0);
            if header.is_set_cookie() {
                apply_policy(cookie, &self.config, user_agent);
            }

            let Some(line) = encode(cookie, header, &policy) else {
                debug!(cookie = cookie.name(), %header, "cookie can not be encoded, skipped");
                continue;
            };
            if suppress_duplicates {
                if unique.insert(cookie.name().to_owned(), line).is_some() {
                    debug!(cookie = cookie.name(), %header, "duplicated cookie replaced by the newest one");
                }
            } else {
                lines.push(line);
            }
        }
        lines.extend(unique.into_values());

        let mut written = 0;
        let headers = self.head.headers_mut();
        for line in lines {
            match HeaderValue::from_str(&line) {
                Ok(value) => {
                    headers.append(&header_name, value);
                    written += 1;
                }
                Err(e) => warn!(%header, %line, error = %e, "encoded cookie is not a valid header value"),
            }
        }

        trace!(%header, written, "cookies marshalled");
        cache.mark_marshalled(written);
        self.caches[header.index()] = Some(cache);
    }

    fn marshall_all_cookies(&mut self) {
        for header in CookieHeader::ALL {
            self.marshall_cookies(header);
        }
    }

    pub(crate) fn request_header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.context.as_ref()?.request_header(name)
    }

    // ===== binary serialization =====

    /// Saves the message in the current layout.
    pub fn write_external<B: BufMut>(&mut self, buf: &mut B) -> Result<(), SerializationError> {
        self.write_external_as(buf, ExternalFormat::Current)
    }

    pub fn write_external_as<B: BufMut>(&mut self, buf: &mut B, format: ExternalFormat) -> Result<(), SerializationError> {
        let mut writer = ExternalWriter::begin(buf, format);
        self.write_fields(&mut writer)
    }

    /// Restores headers and version from a saved message, detecting the layout.
    pub fn read_external<B: Buf>(&mut self, buf: &mut B) -> Result<(), SerializationError> {
        let mut reader = ExternalReader::begin(buf)?;
        let fields = SavedFields::read(&mut reader)?;
        self.restore(fields);
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

    pub(crate) fn write_fields<B: BufMut>(&mut self, writer: &mut ExternalWriter<'_, B>) -> Result<(), SerializationError> {
        self.marshall_all_cookies();

        let headers = self.head.headers();
        writer.put_count(headers.len())?;
        writer.put_count(headers.len())?;
        for (name, value) in headers {
            writer.put_field(name.as_str().as_bytes())?;
            writer.put_field(value.as_bytes())?;
        }
        writer.put_field(self.version_name().as_bytes())?;
        writer.put_flag(false);
        Ok(())
    }

    /// Installs fields read from a saved message, replacing the headers and version and
    /// dropping every cookie cache.
    pub(crate) fn restore(&mut self, fields: SavedFields) {
        let SavedFields { format, headers, version } = fields;
        *self.head.headers_mut() = headers;
        self.head.set_version(version);
        self.caches = Default::default();
        self.deserialization_format = Some(format);
    }

    /// Drops the cache of a cookie header whose lines were replaced or removed outright.
    fn reset_cookie_cache(&mut self, name: &HeaderName) {
        let Some(header) = CookieHeader::from_name(name.as_str()) else {
            return;
        };
        if self.caches[header.index()].take().is_some() {
            trace!(%header, "cookie cache reset after header change");
        }
    }
}

/// Headers and version decoded from a saved message.
///
/// The whole stream is read before anything is applied, so a truncated or malformed
/// stream leaves the target message untouched.
#[derive(Debug)]
pub(crate) struct SavedFields {
    format: ExternalFormat,
    headers: HeaderMap,
    version: Version,
}

impl SavedFields {
    pub(crate) fn read<B: Buf>(reader: &mut ExternalReader<'_, B>) -> Result<Self, SerializationError> {
        // total instance count, repeated by the writer
        reader.get_count()?;
        let count = reader.get_count()?;
        let mut headers = HeaderMap::new();
        for _ in 0..count {
            let name = reader.get_field()?;
            let value = reader.get_field()?;
            let name = HeaderName::from_bytes(&name).map_err(|e| SerializationError::Header { source: MessageError::invalid_header(e) })?;
            let value = HeaderValue::from_maybe_shared(value)
                .map_err(|e| SerializationError::Header { source: MessageError::invalid_header(e) })?;
            headers.append(name, value);
        }

        let version = reader.get_field()?;
        let version = parse_version(&version).map_err(|source| {
            debug!("unknown http version in serialized message");
            SerializationError::MalformedVersion { source }
        })?;

        let trailer = reader.get_flag()?;
        trace!(headers = count, trailer, "message fields read");
        Ok(Self { format: reader.format(), headers, version })
    }
}

fn version_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

pub(crate) fn parse_version(version: &[u8]) -> Result<Version, MessageError> {
    let trimmed = version.trim_ascii();
    let version = match trimmed.to_ascii_uppercase().as_slice() {
        b"HTTP/0.9" => Version::HTTP_09,
        b"HTTP/1.0" => Version::HTTP_10,
        b"HTTP/1.1" => Version::HTTP_11,
        b"HTTP/2" | b"HTTP/2.0" => Version::HTTP_2,
        b"HTTP/3" | b"HTTP/3.0" => Version::HTTP_3,
        _ => return Err(MessageError::unsupported_version(String::from_utf8_lossy(trimmed))),
    };
    Ok(version)
}
