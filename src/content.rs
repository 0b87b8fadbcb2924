//! Content negotiation boundary.
//!
//! Resource handles produce and consume [`Content`] — a media-typed byte
//! payload. The sync engine works on plain [`serde_json::Value`]s and uses a
//! [`ContentCodec`] to cross the boundary in both directions. The codec is
//! pluggable; [`JsonCodec`] is the default.

use crate::error::{BridgeError, BridgeResult};
use serde_json::Value;

/// Media type produced by [`JsonCodec::encode`].
pub const MEDIA_TYPE_JSON: &str = "application/json";

/// A media-typed payload as exchanged with resource handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    /// MIME media type of the body.
    pub media_type: String,
    /// Raw payload bytes.
    pub body: Vec<u8>,
}

impl Content {
    /// Creates content from a media type and raw bytes.
    pub fn new(media_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            body,
        }
    }

    /// Creates JSON content from a value.
    pub fn json(value: &Value) -> Self {
        Self {
            media_type: MEDIA_TYPE_JSON.to_string(),
            body: value.to_string().into_bytes(),
        }
    }
}

/// Decodes handle payloads to plain values and encodes values back.
pub trait ContentCodec: Send + Sync {
    /// Decodes content into a plain value for batching.
    fn decode(&self, content: &Content) -> BridgeResult<Value>;

    /// Encodes a plain value into content for a handle call.
    fn encode(&self, value: &Value) -> BridgeResult<Content>;
}

/// JSON codec. Accepts `application/json` content only.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ContentCodec for JsonCodec {
    fn decode(&self, content: &Content) -> BridgeResult<Value> {
        if content.media_type != MEDIA_TYPE_JSON {
            return Err(BridgeError::Codec(format!(
                "unsupported media type: {}",
                content.media_type
            )));
        }
        Ok(serde_json::from_slice(&content.body)?)
    }

    fn encode(&self, value: &Value) -> BridgeResult<Content> {
        Ok(Content::json(value))
    }
}
