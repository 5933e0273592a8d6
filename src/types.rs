//! Core value types shared by the marshaling engine.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::record::RecordInstance;

/// Call-time arguments, keyed by parameter name.
pub type Arguments = IndexMap<String, Native>;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A file uploaded through a `formData` parameter of type `file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// An in-memory value on the native side of the marshaling boundary.
///
/// `Null` doubles as the "absent" sentinel for optional fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Native {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
    File(FilePart),
    Array(Vec<Native>),
    Map(IndexMap<String, Native>),
    Record(RecordInstance),
}

impl Native {
    pub fn is_null(&self) -> bool {
        matches!(self, Native::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Native::Null => "null",
            Native::Bool(_) => "boolean",
            Native::Int(_) => "integer",
            Native::Float(_) => "number",
            Native::String(_) => "string",
            Native::Date(_) => "date",
            Native::DateTime(_) => "date-time",
            Native::Bytes(_) => "bytes",
            Native::File(_) => "file",
            Native::Array(_) => "array",
            Native::Map(_) => "object",
            Native::Record(_) => "record",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Native::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Native::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Native]> {
        match self {
            Native::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordInstance> {
        match self {
            Native::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Field lookup on mappings and record instances.
    pub fn get(&self, field: &str) -> Option<&Native> {
        match self {
            Native::Map(map) => map.get(field),
            Native::Record(r) => r.get(field),
            _ => None,
        }
    }

    /// Convert a wire value without any schema guidance.
    ///
    /// Integers that fit in `i64` stay integers; everything else numeric
    /// becomes a float.
    pub fn from_json(value: &Value) -> Native {
        match value {
            Value::Null => Native::Null,
            Value::Bool(b) => Native::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Native::Int(i),
                None => Native::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Native::String(s.clone()),
            Value::Array(items) => Native::Array(items.iter().map(Native::from_json).collect()),
            Value::Object(map) => Native::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Native::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a wire value without any schema guidance.
    ///
    /// Dates use ISO-8601, bytes use base64, records become plain objects
    /// with absent fields left out.
    pub fn to_json(&self) -> Value {
        match self {
            Native::Null => Value::Null,
            Native::Bool(b) => Value::Bool(*b),
            Native::Int(i) => Value::Number((*i).into()),
            Native::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Native::String(s) => Value::String(s.clone()),
            Native::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Native::DateTime(dt) => {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Native::Bytes(b) => Value::String(BASE64.encode(b)),
            Native::File(f) => Value::String(f.filename.clone()),
            Native::Array(items) => Value::Array(items.iter().map(Native::to_json).collect()),
            Native::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            Native::Record(r) => Value::Object(
                r.fields()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl From<bool> for Native {
    fn from(v: bool) -> Self {
        Native::Bool(v)
    }
}

impl From<i64> for Native {
    fn from(v: i64) -> Self {
        Native::Int(v)
    }
}

impl From<i32> for Native {
    fn from(v: i32) -> Self {
        Native::Int(v.into())
    }
}

impl From<f64> for Native {
    fn from(v: f64) -> Self {
        Native::Float(v)
    }
}

impl From<&str> for Native {
    fn from(v: &str) -> Self {
        Native::String(v.to_string())
    }
}

impl From<String> for Native {
    fn from(v: String) -> Self {
        Native::String(v)
    }
}

impl From<NaiveDate> for Native {
    fn from(v: NaiveDate) -> Self {
        Native::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for Native {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Native::DateTime(v)
    }
}

impl From<FilePart> for Native {
    fn from(v: FilePart) -> Self {
        Native::File(v)
    }
}

impl From<RecordInstance> for Native {
    fn from(v: RecordInstance) -> Self {
        Native::Record(v)
    }
}

impl<T: Into<Native>> From<Vec<T>> for Native {
    fn from(v: Vec<T>) -> Self {
        Native::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Native>> From<Option<T>> for Native {
    fn from(v: Option<T>) -> Self {
        v.map_or(Native::Null, Into::into)
    }
}
