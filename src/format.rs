//! Format conversions between wire scalars and native values.
//!
//! The table is keyed by the `format` keyword. Unregistered formats are a
//! passthrough: the value is converted as its plain primitive type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use serde_json::Value;

use crate::types::{json_type_name, Native};

/// Two-way conversion for one `format`.
///
/// Null never reaches a converter; the marshaling walk handles it first.
pub trait FormatConverter: Send + Sync {
    fn to_native(&self, wire: &Value) -> Result<Native, String>;
    fn to_wire(&self, native: &Native) -> Result<Value, String>;
}

/// Registry of format converters.
#[derive(Clone)]
pub struct FormatRegistry {
    converters: HashMap<String, Arc<dyn FormatConverter>>,
}

impl FormatRegistry {
    /// A registry with no converters at all.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Register (or replace) the converter for `format`.
    pub fn register(&mut self, format: impl Into<String>, converter: impl FormatConverter + 'static) {
        self.converters.insert(format.into(), Arc::new(converter));
    }

    pub fn get(&self, format: &str) -> Option<&dyn FormatConverter> {
        self.converters.get(format).map(|c| c.as_ref())
    }

    pub fn contains(&self, format: &str) -> bool {
        self.converters.contains_key(format)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("date", DateFormat);
        registry.register("date-time", DateTimeFormat);
        registry.register("int64", Int64Format);
        registry.register("int32", Int32Format);
        registry.register("byte", ByteFormat);
        registry
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FormatRegistry")
            .field("formats", &names)
            .finish()
    }
}

fn expected(what: &str, got: &Value) -> String {
    format!("expected {what}, got {}", json_type_name(got))
}

/// `date`: ISO-8601 calendar date.
pub struct DateFormat;

impl FormatConverter for DateFormat {
    fn to_native(&self, wire: &Value) -> Result<Native, String> {
        let s = wire.as_str().ok_or_else(|| expected("date string", wire))?;
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Native::Date)
            .map_err(|e| format!("\"{s}\": {e}"))
    }

    fn to_wire(&self, native: &Native) -> Result<Value, String> {
        match native {
            Native::Date(d) => Ok(Value::String(d.format("%Y-%m-%d").to_string())),
            Native::DateTime(dt) => Ok(Value::String(dt.date_naive().format("%Y-%m-%d").to_string())),
            Native::String(s) => self.to_native(&Value::String(s.clone())).map(|_| Value::String(s.clone())),
            other => Err(format!("expected date, got {}", other.type_name())),
        }
    }
}

/// `date-time`: RFC 3339 timestamp with offset.
pub struct DateTimeFormat;

impl FormatConverter for DateTimeFormat {
    fn to_native(&self, wire: &Value) -> Result<Native, String> {
        let s = wire.as_str().ok_or_else(|| expected("date-time string", wire))?;
        DateTime::parse_from_rfc3339(s)
            .map(Native::DateTime)
            .map_err(|e| format!("\"{s}\": {e}"))
    }

    fn to_wire(&self, native: &Native) -> Result<Value, String> {
        match native {
            Native::DateTime(dt) => Ok(Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
            Native::String(s) => self.to_native(&Value::String(s.clone())).map(|_| Value::String(s.clone())),
            other => Err(format!("expected date-time, got {}", other.type_name())),
        }
    }
}

/// `int64`: accepts JSON numbers and decimal strings.
pub struct Int64Format;

impl FormatConverter for Int64Format {
    fn to_native(&self, wire: &Value) -> Result<Native, String> {
        match wire {
            Value::Number(n) => n
                .as_i64()
                .map(Native::Int)
                .ok_or_else(|| format!("{n} does not fit in 64 bits")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Native::Int)
                .map_err(|e| format!("\"{s}\": {e}")),
            other => Err(expected("integer", other)),
        }
    }

    fn to_wire(&self, native: &Native) -> Result<Value, String> {
        match native {
            Native::Int(i) => Ok(Value::Number((*i).into())),
            other => Err(format!("expected integer, got {}", other.type_name())),
        }
    }
}

/// `int32`: like `int64` with a range check.
pub struct Int32Format;

impl FormatConverter for Int32Format {
    fn to_native(&self, wire: &Value) -> Result<Native, String> {
        let native = Int64Format.to_native(wire)?;
        match native {
            Native::Int(i) if i32::try_from(i).is_ok() => Ok(native),
            Native::Int(i) => Err(format!("{i} does not fit in 32 bits")),
            _ => Ok(native),
        }
    }

    fn to_wire(&self, native: &Native) -> Result<Value, String> {
        match native {
            Native::Int(i) if i32::try_from(*i).is_err() => {
                Err(format!("{i} does not fit in 32 bits"))
            }
            other => Int64Format.to_wire(other),
        }
    }
}

/// `byte`: base64-encoded binary.
pub struct ByteFormat;

impl FormatConverter for ByteFormat {
    fn to_native(&self, wire: &Value) -> Result<Native, String> {
        let s = wire.as_str().ok_or_else(|| expected("base64 string", wire))?;
        BASE64
            .decode(s)
            .map(Native::Bytes)
            .map_err(|e| format!("invalid base64: {e}"))
    }

    fn to_wire(&self, native: &Native) -> Result<Value, String> {
        match native {
            Native::Bytes(b) => Ok(Value::String(BASE64.encode(b))),
            Native::String(s) => Ok(Value::String(s.clone())),
            other => Err(format!("expected bytes, got {}", other.type_name())),
        }
    }
}
