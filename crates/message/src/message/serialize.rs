//! Binary save/restore of messages for passivation.
//!
//! Two layouts exist. Both start with a big-endian `u32` marker naming the layout, then
//! carry the same logical fields. The current layout writes text fields as an `i32`
//! length followed by the raw bytes and flags as a single boolean byte. The legacy layout
//! writes text fields as string objects (a `0x74` tag, a `u16` length and UTF-8 bytes) and
//! flags as a byte where `1` means set.

use bytes::{Buf, BufMut, Bytes};
use tracing::debug;

use crate::error::SerializationError;
use crate::utils::ensure;

const STRING_TAG: u8 = 0x74;
const NULL_TAG: u8 = 0x70;

/// The binary layouts understood by `read_external`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExternalFormat {
    /// String-object fields, marker `0xBEEF0001`.
    Legacy,
    /// Length-prefixed byte array fields, marker `0xBEEF0002`.
    Current,
}

impl ExternalFormat {
    pub const LEGACY_MARKER: u32 = 0xBEEF_0001;
    pub const CURRENT_MARKER: u32 = 0xBEEF_0002;

    pub const fn marker(self) -> u32 {
        match self {
            Self::Legacy => Self::LEGACY_MARKER,
            Self::Current => Self::CURRENT_MARKER,
        }
    }

    pub fn from_marker(marker: u32) -> Result<Self, SerializationError> {
        match marker {
            Self::LEGACY_MARKER => Ok(Self::Legacy),
            Self::CURRENT_MARKER => Ok(Self::Current),
            marker => Err(SerializationError::UnknownFormat { marker }),
        }
    }
}

/// Writes message fields in one of the [`ExternalFormat`] layouts.
pub(crate) struct ExternalWriter<'a, B> {
    buf: &'a mut B,
    format: ExternalFormat,
}

impl<'a, B: BufMut> ExternalWriter<'a, B> {
    /// Writes the format marker and returns a writer positioned after it.
    pub(crate) fn begin(buf: &'a mut B, format: ExternalFormat) -> Self {
        buf.put_u32(format.marker());
        Self { buf, format }
    }

    pub(crate) fn put_count(&mut self, count: usize) -> Result<(), SerializationError> {
        let count = i32::try_from(count).map_err(SerializationError::invalid_string)?;
        self.buf.put_i32(count);
        Ok(())
    }

    /// A text field, in the layout of the current format.
    pub(crate) fn put_field(&mut self, bytes: &[u8]) -> Result<(), SerializationError> {
        match self.format {
            ExternalFormat::Current => self.put_byte_array(bytes),
            ExternalFormat::Legacy => {
                let text = std::str::from_utf8(bytes).map_err(SerializationError::invalid_string)?;
                let len = u16::try_from(text.len()).map_err(SerializationError::invalid_string)?;
                self.buf.put_u8(STRING_TAG);
                self.buf.put_u16(len);
                self.buf.put_slice(text.as_bytes());
                Ok(())
            }
        }
    }

    /// A length-prefixed byte array, regardless of the format.
    pub(crate) fn put_byte_array(&mut self, bytes: &[u8]) -> Result<(), SerializationError> {
        self.put_count(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub(crate) fn put_flag(&mut self, flag: bool) {
        self.buf.put_u8(u8::from(flag));
    }

    /// A status code, a short in the current format and an int in the legacy one.
    pub(crate) fn put_status(&mut self, status: u16) -> Result<(), SerializationError> {
        match self.format {
            ExternalFormat::Current => {
                let status = i16::try_from(status).map_err(|e| {
                    debug!(status, error = %e, "status code does not fit the current layout");
                    SerializationError::InvalidStatus { code: i32::from(status) }
                })?;
                self.buf.put_i16(status);
            }
            ExternalFormat::Legacy => self.buf.put_i32(i32::from(status)),
        }
        Ok(())
    }
}

/// Reads message fields written by [`ExternalWriter`].
pub(crate) struct ExternalReader<'a, B> {
    buf: &'a mut B,
    format: ExternalFormat,
}

impl<'a, B: Buf> ExternalReader<'a, B> {
    /// Reads the format marker and returns a reader for the detected layout.
    pub(crate) fn begin(buf: &'a mut B) -> Result<Self, SerializationError> {
        ensure!(buf.remaining() >= 4, SerializationError::truncated(4, buf.remaining()));
        let format = ExternalFormat::from_marker(buf.get_u32())?;
        debug!(?format, "deserializing message");
        Ok(Self { buf, format })
    }

    pub(crate) fn format(&self) -> ExternalFormat {
        self.format
    }

    fn require(&self, needed: usize) -> Result<(), SerializationError> {
        let remaining = self.buf.remaining();
        ensure!(remaining >= needed, SerializationError::truncated(needed, remaining));
        Ok(())
    }

    pub(crate) fn get_count(&mut self) -> Result<usize, SerializationError> {
        self.require(4)?;
        let count = self.buf.get_i32();
        usize::try_from(count).map_err(|e| SerializationError::invalid_string(format!("negative length {count}: {e}")))
    }

    pub(crate) fn get_field(&mut self) -> Result<Bytes, SerializationError> {
        match self.format {
            ExternalFormat::Current => self.get_byte_array(),
            ExternalFormat::Legacy => {
                self.require(1)?;
                match self.buf.get_u8() {
                    NULL_TAG => Ok(Bytes::new()),
                    STRING_TAG => {
                        self.require(2)?;
                        let len = usize::from(self.buf.get_u16());
                        self.require(len)?;
                        let bytes = self.buf.copy_to_bytes(len);
                        std::str::from_utf8(&bytes).map_err(SerializationError::invalid_string)?;
                        Ok(bytes)
                    }
                    tag => Err(SerializationError::invalid_string(format!("unexpected object tag {tag:#04x}"))),
                }
            }
        }
    }

    pub(crate) fn get_byte_array(&mut self) -> Result<Bytes, SerializationError> {
        let len = self.get_count()?;
        self.require(len)?;
        Ok(self.buf.copy_to_bytes(len))
    }

    pub(crate) fn get_flag(&mut self) -> Result<bool, SerializationError> {
        self.require(1)?;
        let byte = self.buf.get_u8();
        Ok(match self.format {
            ExternalFormat::Current => byte != 0,
            ExternalFormat::Legacy => byte == 1,
        })
    }

    pub(crate) fn get_status(&mut self) -> Result<i32, SerializationError> {
        match self.format {
            ExternalFormat::Current => {
                self.require(2)?;
                Ok(i32::from(self.buf.get_i16()))
            }
            ExternalFormat::Legacy => {
                self.require(4)?;
                Ok(self.buf.get_i32())
            }
        }
    }
}
