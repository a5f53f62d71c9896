use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// A request or response body held fully in memory, so requests can be replayed after a token refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum InMemoryBody {
    #[default]
    Empty,
    /// Binary payloads, including pre-encoded multipart forms.
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl InMemoryBody {
    pub fn new_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        InMemoryBody::Bytes(bytes.into())
    }

    pub fn new_text(text: impl Into<String>) -> Self {
        InMemoryBody::Text(text.into())
    }

    pub fn new_json(value: impl Serialize) -> Result<Self> {
        Ok(InMemoryBody::Json(serde_json::to_value(value)?))
    }

    /// Decode a received body, using the content-type to decide between JSON, text and raw bytes.
    pub fn from_received(headers: &HeaderMap, bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return InMemoryBody::Empty;
        }
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if content_type.contains("json") {
            if let Ok(value) = serde_json::from_slice(&bytes) {
                return InMemoryBody::Json(value);
            }
        }
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => InMemoryBody::Text(text),
            Err(e) => InMemoryBody::Bytes(e.into_bytes()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            InMemoryBody::Empty => true,
            InMemoryBody::Bytes(b) => b.is_empty(),
            InMemoryBody::Text(s) => s.is_empty(),
            InMemoryBody::Json(_) => false,
        }
    }

    /// True for a JSON object body, the only shape that context fields can be merged into.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, InMemoryBody::Json(Value::Object(_)))
    }

    /// Insert `key` into a JSON object body. Returns the body unchanged as `Err` for any other shape.
    pub fn with_field(self, key: &str, value: Value) -> std::result::Result<Self, Self> {
        match self {
            InMemoryBody::Json(Value::Object(mut map)) => {
                map.insert(key.to_string(), value);
                Ok(InMemoryBody::Json(Value::Object(map)))
            }
            other => Err(other),
        }
    }

    /// The content-type implied by the body, used when the caller did not set one.
    pub fn default_content_type(&self) -> Option<HeaderValue> {
        match self {
            InMemoryBody::Empty => None,
            InMemoryBody::Bytes(_) => Some(HeaderValue::from_static("application/octet-stream")),
            InMemoryBody::Text(_) => Some(HeaderValue::from_static("text/plain")),
            InMemoryBody::Json(_) => Some(HeaderValue::from_static("application/json; charset=utf-8")),
        }
    }

    pub fn text(self) -> Result<String> {
        match self {
            InMemoryBody::Empty => Ok(String::new()),
            InMemoryBody::Bytes(b) => String::from_utf8(b).map_err(|e| crate::Error::Custom(e.to_string())),
            InMemoryBody::Text(s) => Ok(s),
            InMemoryBody::Json(val) => Ok(serde_json::to_string(&val)?),
        }
    }

    pub fn json<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        match self {
            InMemoryBody::Empty => Err(serde_json::Error::custom("Empty body")),
            InMemoryBody::Bytes(b) => serde_json::from_slice(&b),
            InMemoryBody::Text(t) => serde_json::from_str(&t),
            InMemoryBody::Json(v) => serde_json::from_value(v),
        }
    }

    pub fn bytes(self) -> Result<Bytes> {
        match self {
            InMemoryBody::Empty => Ok(Bytes::new()),
            InMemoryBody::Bytes(b) => Ok(Bytes::from(b)),
            InMemoryBody::Text(s) => Ok(Bytes::from(s)),
            InMemoryBody::Json(val) => Ok(Bytes::from(serde_json::to_vec(&val)?)),
        }
    }
}
