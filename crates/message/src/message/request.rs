use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use http::{Method, Request, Uri};

use crate::config::HttpConfig;
use crate::error::{MessageError, SerializationError};

use super::base::SavedFields;
use super::serialize::{ExternalFormat, ExternalReader, ExternalWriter};
use super::{BaseMessage, ServiceContext};

/// An HTTP request message.
///
/// Header, cookie and framing operations come from the wrapped [`BaseMessage`]; cookies
/// are looked up in `Cookie` first and `Cookie2` second.
#[derive(Debug, Default)]
pub struct RequestMessage {
    base: BaseMessage<Request<()>>,
}

impl Deref for RequestMessage {
    type Target = BaseMessage<Request<()>>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for RequestMessage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl RequestMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request read from the wire.
    pub fn inbound(head: Request<()>, context: Option<Arc<dyn ServiceContext>>, config: Arc<HttpConfig>) -> Self {
        Self { base: BaseMessage::inbound(head, context, config) }
    }

    /// A request being built for sending.
    pub fn outbound(head: Request<()>, context: Option<Arc<dyn ServiceContext>>, config: Arc<HttpConfig>) -> Self {
        Self { base: BaseMessage::outbound(head, context, config) }
    }

    pub fn method(&self) -> &Method {
        self.head().method()
    }

    pub fn set_method<M: AsRef<[u8]>>(&mut self, method: M) -> Result<(), MessageError> {
        let method = Method::from_bytes(method.as_ref()).map_err(MessageError::invalid_request_line)?;
        *self.head_mut().method_mut() = method;
        Ok(())
    }

    pub fn uri(&self) -> &Uri {
        self.head().uri()
    }

    pub fn set_uri<U: AsRef<[u8]>>(&mut self, uri: U) -> Result<(), MessageError> {
        let uri = Uri::try_from(uri.as_ref()).map_err(MessageError::invalid_request_line)?;
        *self.head_mut().uri_mut() = uri;
        Ok(())
    }

    pub fn path(&self) -> &str {
        self.uri().path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri().query()
    }

    /// Saves the request in the current layout: the base fields followed by the method
    /// and the request target.
    pub fn write_external<B: BufMut>(&mut self, buf: &mut B) -> Result<(), SerializationError> {
        self.write_external_as(buf, ExternalFormat::Current)
    }

    pub fn write_external_as<B: BufMut>(&mut self, buf: &mut B, format: ExternalFormat) -> Result<(), SerializationError> {
        let mut writer = ExternalWriter::begin(buf, format);
        self.base.write_fields(&mut writer)?;
        writer.put_field(self.method().as_str().as_bytes())?;
        writer.put_field(self.uri().to_string().as_bytes())?;
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

        let method = reader.get_field()?;
        let method = Method::from_bytes(&method)
            .map_err(|e| SerializationError::RequestLine { source: MessageError::invalid_request_line(e) })?;
        let uri = reader.get_field()?;
        let uri = Uri::from_maybe_shared(uri)
            .map_err(|e| SerializationError::RequestLine { source: MessageError::invalid_request_line(e) })?;

        self.base.restore(fields);
        *self.head_mut().method_mut() = method;
        *self.head_mut().uri_mut() = uri;
        Ok(())
    }
}
