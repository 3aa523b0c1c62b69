//! Media references: images embedded in flow inputs as `data:` URIs.

use std::fmt;

use base64::Engine as _;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use thiserror::Error;

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("expected a data URI of the form 'data:<mimetype>;base64,<encoded_data>'")]
    NotDataUri,

    #[error("'{0}' is not a valid MIME type")]
    InvalidMimeType(String),

    #[error("payload is not valid base64")]
    InvalidBase64,

    #[error("payload is empty")]
    EmptyPayload,
}

/// A binary attachment with its declared MIME type.
///
/// Parsed from (and rendered back to) `data:<type>/<subtype>;base64,<payload>`.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaRef {
    mime_type: String,
    data: Bytes,
}

impl MediaRef {
    /// Parses a data URI, decoding the payload.
    pub fn parse(uri: &str) -> Result<Self, MediaError> {
        let rest = uri.strip_prefix(DATA_SCHEME).ok_or(MediaError::NotDataUri)?;
        let (mime_type, payload) = rest.split_once(BASE64_MARKER).ok_or(MediaError::NotDataUri)?;

        if !is_mime_type(mime_type) {
            return Err(MediaError::InvalidMimeType(mime_type.to_string()));
        }

        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| MediaError::InvalidBase64)?;

        Self::from_bytes(mime_type, data)
    }

    /// Wraps raw bytes (e.g. a multipart upload) with a MIME type.
    pub fn from_bytes(mime_type: &str, data: impl Into<Bytes>) -> Result<Self, MediaError> {
        if !is_mime_type(mime_type) {
            return Err(MediaError::InvalidMimeType(mime_type.to_string()));
        }
        let data = data.into();
        if data.is_empty() {
            return Err(MediaError::EmptyPayload);
        }
        Ok(Self {
            mime_type: mime_type.to_ascii_lowercase(),
            data,
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Top-level MIME type, e.g. `image` for `image/png`.
    pub fn top_level_type(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map(|(top, _)| top)
            .unwrap_or(&self.mime_type)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload re-encoded as standard base64.
    pub fn base64_data(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "{DATA_SCHEME}{}{BASE64_MARKER}{}",
            self.mime_type,
            self.base64_data()
        )
    }
}

// Payloads can be megabytes; keep logs readable.
impl fmt::Debug for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaRef")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Serialize for MediaRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_uri())
    }
}

fn is_mime_type(value: &str) -> bool {
    let Some((top, sub)) = value.split_once('/') else {
        return false;
    };
    let token = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_'))
    };
    token(top) && token(sub)
}
