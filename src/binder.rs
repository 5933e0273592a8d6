//! Parameter binding: call arguments into a request description.
//!
//! Binding happens entirely before a transport sees the request, so a call
//! with bad arguments never puts anything on the wire.

use std::time::Duration;

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

use crate::error::BindingError;
use crate::param::{CollectionFormat, Param, ParamLocation};
use crate::spec::{HttpMethod, Operation, Spec};
use crate::types::{Arguments, FilePart, Native};

/// Characters escaped when substituting into a path segment.
///
/// Unreserved characters and `,` (the csv separator) stay as they are.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b',');

/// A query, header or form value after collection-format encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    /// `multi` collection format: the transport repeats the key per item.
    Multi(Vec<String>),
}

impl ParamValue {
    /// Every value that goes on the wire for this key.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::Single(v) => vec![v.as_str()],
            ParamValue::Multi(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// Everything a transport needs to perform one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescription {
    pub method: HttpMethod,
    pub url: String,
    pub query: IndexMap<String, ParamValue>,
    pub headers: IndexMap<String, ParamValue>,
    /// Serialized body text.
    pub body: Option<String>,
    pub form: IndexMap<String, ParamValue>,
    pub files: Vec<(String, FilePart)>,
    /// Per-call transport timeout, when the caller set one.
    pub timeout: Option<Duration>,
}

impl RequestDescription {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            body: None,
            form: IndexMap::new(),
            files: Vec::new(),
            timeout: None,
        }
    }

    /// Header lookup, ignoring case.
    pub fn header(&self, name: &str) -> Option<&ParamValue> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), ParamValue::Single(value.into()));
    }
}

/// Bind every declared parameter of `operation` from `args`.
///
/// Arguments are consumed by name; anything left over is reported as
/// unrecognized.
pub fn bind_all(
    spec: &Spec,
    operation: &Operation,
    mut args: Arguments,
) -> Result<RequestDescription, BindingError> {
    let mut request = RequestDescription::new(
        operation.method,
        format!("{}{}", spec.base_url(), operation.path),
    );

    for param in &operation.params {
        let value = match args.shift_remove(&param.name) {
            Some(v) if !v.is_null() => Some(v),
            _ => default_value(spec, param)?,
        };
        match value {
            Some(v) => bind(spec, operation, param, v, &mut request)?,
            None if param.required => {
                return Err(BindingError::MissingRequired {
                    name: param.name.clone(),
                })
            }
            None => {}
        }
    }

    if !args.is_empty() {
        return Err(BindingError::Unrecognized {
            names: args.into_keys().collect(),
        });
    }

    tracing::debug!(
        operation = %operation.id,
        method = %request.method,
        url = %request.url,
        "bound request"
    );
    Ok(request)
}

/// The declared default of `param` as a native value.
///
/// A scalar default on an array parameter is wrapped in a one-element array.
fn default_value(spec: &Spec, param: &Param) -> Result<Option<Native>, BindingError> {
    let Some(default) = &param.default else {
        return Ok(None);
    };
    let wire = if param.tag.is_array() && !default.is_array() {
        Value::Array(vec![default.clone()])
    } else {
        default.clone()
    };
    tracing::debug!(param = %param.name, default = %wire, "using declared default");
    spec.unmarshal(&param.schema, &wire)
        .map(Some)
        .map_err(|source| BindingError::Mapping {
            name: param.name.clone(),
            source,
        })
}

/// Place one argument into `request` according to its parameter location.
pub fn bind(
    spec: &Spec,
    operation: &Operation,
    param: &Param,
    value: Native,
    request: &mut RequestDescription,
) -> Result<(), BindingError> {
    let wrong_type = |message: String| BindingError::WrongType {
        name: param.name.clone(),
        location: param.location.to_string(),
        message,
    };

    if param.tag.is_file() {
        let Native::File(file) = value else {
            return Err(wrong_type(format!("expected file, got {}", value.type_name())));
        };
        if !operation.is_multipart() {
            return Err(BindingError::FileWithoutMultipart {
                name: param.name.clone(),
            });
        }
        request.files.push((param.name.clone(), file));
        return Ok(());
    }

    let wire = spec
        .marshal(&param.schema, &value)
        .map_err(|source| BindingError::Mapping {
            name: param.name.clone(),
            source,
        })?;

    if param.location == ParamLocation::Body {
        let body = serde_json::to_string(&wire).map_err(|source| BindingError::Serialize { source })?;
        request.body = Some(body);
        request.set_header("Content-Type", "application/json");
        return Ok(());
    }

    let encoded = encode(&wire, param.collection_format)
        .map_err(|got| wrong_type(format!("expected a primitive or array of primitives, got {got}")))?;

    if let ParamValue::Single(s) = &encoded {
        if s.is_empty() && !param.allow_empty_value && param.location != ParamLocation::Path {
            tracing::debug!(param = %param.name, "skipping empty value");
            return Ok(());
        }
    }

    match param.location {
        ParamLocation::Path => {
            let text = match encoded {
                ParamValue::Single(s) => s,
                ParamValue::Multi(items) => items.join(","),
            };
            let placeholder = format!("{{{}}}", param.name);
            let segment = utf8_percent_encode(&text, PATH_SEGMENT).to_string();
            request.url = request.url.replace(&placeholder, &segment);
        }
        ParamLocation::Query => {
            request.query.insert(param.name.clone(), encoded);
        }
        ParamLocation::Header => {
            request.headers.insert(param.name.clone(), encoded);
        }
        ParamLocation::FormData => {
            request.form.insert(param.name.clone(), encoded);
        }
        ParamLocation::Body => {}
    }
    Ok(())
}

/// Encode a marshaled parameter value as text.
///
/// Fails with the offending JSON type for nested objects.
fn encode(wire: &Value, format: CollectionFormat) -> Result<ParamValue, &'static str> {
    match wire {
        Value::Array(items) => {
            let texts = items.iter().map(scalar_text).collect::<Result<Vec<_>, _>>()?;
            Ok(format.join(texts))
        }
        other => scalar_text(other).map(ParamValue::Single),
    }
}

fn scalar_text(value: &Value) -> Result<String, &'static str> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) => Err("nested array"),
        Value::Object(_) => Err("object"),
    }
}
