//! Uniform view of a transport response.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::MappingError;
use crate::spec::media_type_is;

/// Media type requested when MessagePack bodies are negotiated.
pub const MSGPACK: &str = "application/x-msgpack";

/// What the engine needs from a transport response.
///
/// Each transport adapts its own response type to this; the engine never
/// looks at transport-specific types.
pub trait IncomingResponse {
    fn status_code(&self) -> u16;

    /// Headers with lowercase names.
    fn headers(&self) -> &IndexMap<String, String>;

    fn raw_bytes(&self) -> &[u8];

    fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .get(name.to_ascii_lowercase().as_str())
            .map(String::as_str)
    }

    fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body as text, replacing invalid UTF-8.
    fn text(&self) -> String {
        String::from_utf8_lossy(self.raw_bytes()).into_owned()
    }

    fn json(&self) -> Result<Value, MappingError> {
        serde_json::from_slice(self.raw_bytes()).map_err(|e| MappingError::Body {
            content_type: "application/json".into(),
            message: e.to_string(),
        })
    }
}

/// An owned, fully-read response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    status: u16,
    headers: IndexMap<String, String>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// A JSON response with the matching content type.
    pub fn json_body(status: u16, body: &Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
    }
}

impl IncomingResponse for Response {
    fn status_code(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    fn raw_bytes(&self) -> &[u8] {
        &self.body
    }
}

/// Decode a response body into a wire value, dispatching on content type.
///
/// JSON is assumed when no content type is given. An empty body decodes to
/// `None`.
pub fn decode_body(response: &dyn IncomingResponse) -> Result<Option<Value>, MappingError> {
    let bytes = response.raw_bytes();
    if bytes.is_empty() {
        return Ok(None);
    }

    let content_type = response.content_type().unwrap_or("application/json");
    if is_msgpack(content_type) {
        return rmp_serde::from_slice::<Value>(bytes)
            .map(Some)
            .map_err(|e| MappingError::Body {
                content_type: content_type.to_string(),
                message: e.to_string(),
            });
    }
    if is_json(content_type) {
        return serde_json::from_slice(bytes)
            .map(Some)
            .map_err(|e| MappingError::Body {
                content_type: content_type.to_string(),
                message: e.to_string(),
            });
    }
    Ok(Some(Value::String(response.text())))
}

fn is_msgpack(content_type: &str) -> bool {
    media_type_is(content_type, MSGPACK) || media_type_is(content_type, "application/msgpack")
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    media_type_is(essence, "application/json") || essence.to_ascii_lowercase().ends_with("+json")
}

/// Wire value for a declared response header.
///
/// Headers are text; numbers and booleans are parsed when they look like
/// JSON scalars, everything else stays a string.
pub fn header_wire_value(text: &str) -> Value {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(text.to_string()),
    }
}
