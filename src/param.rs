//! Operation parameters.

use std::fmt;

use serde_json::Value;

use crate::binder::ParamValue;
use crate::descriptor::{self, TypeTag};
use crate::error::SchemaError;
use crate::schema::{Definitions, SchemaNode, SchemaParser};
use crate::types::json_type_name;

/// Where a parameter is placed in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
    FormData,
}

impl ParamLocation {
    /// Parse an `in` keyword value.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParamLocation::Path),
            "query" => Some(ParamLocation::Query),
            "header" => Some(ParamLocation::Header),
            "body" => Some(ParamLocation::Body),
            "formData" => Some(ParamLocation::FormData),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Body => "body",
            ParamLocation::FormData => "formData",
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of an array parameter into a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectionFormat {
    #[default]
    Csv,
    Ssv,
    Tsv,
    Pipes,
    /// One key per item; repetition is left to the transport.
    Multi,
}

impl CollectionFormat {
    /// Parse a `collectionFormat` keyword value.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(CollectionFormat::Csv),
            "ssv" => Some(CollectionFormat::Ssv),
            "tsv" => Some(CollectionFormat::Tsv),
            "pipes" => Some(CollectionFormat::Pipes),
            "multi" => Some(CollectionFormat::Multi),
            _ => None,
        }
    }

    /// Item separator, or `None` for `multi`.
    pub fn separator(&self) -> Option<&'static str> {
        match self {
            CollectionFormat::Csv => Some(","),
            CollectionFormat::Ssv => Some(" "),
            CollectionFormat::Tsv => Some("\t"),
            CollectionFormat::Pipes => Some("|"),
            CollectionFormat::Multi => None,
        }
    }

    /// Encode string items according to this format.
    pub fn join(&self, items: Vec<String>) -> ParamValue {
        match self.separator() {
            Some(sep) => ParamValue::Single(items.join(sep)),
            None => ParamValue::Multi(items),
        }
    }
}

/// One declared parameter of an operation.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub location: ParamLocation,
    /// Body parameters: the `schema` object. Others: the parameter itself.
    pub schema: SchemaNode,
    pub tag: TypeTag,
    pub required: bool,
    pub default: Option<Value>,
    pub collection_format: CollectionFormat,
    pub allow_empty_value: bool,
}

impl Param {
    /// Parse a (dereferenced) parameter object found at `path`.
    pub fn parse(
        raw: &Value,
        parser: &mut SchemaParser<'_>,
        defs: &Definitions,
        path: &str,
    ) -> Result<Self, SchemaError> {
        let invalid = |message: String| SchemaError::InvalidParameter {
            path: path.to_string(),
            message,
        };

        let map = raw
            .as_object()
            .ok_or_else(|| invalid(format!("expected object, got {}", json_type_name(raw))))?;
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing name".into()))?
            .to_string();
        let location_raw = map.get("in").and_then(Value::as_str).unwrap_or_default();
        let location = ParamLocation::parse(location_raw)
            .ok_or_else(|| invalid(format!("unknown location \"{location_raw}\"")))?;

        let schema = if location == ParamLocation::Body {
            let body = map
                .get("schema")
                .ok_or_else(|| invalid(format!("body parameter \"{name}\" has no schema")))?;
            parser.parse(body, &format!("{path}/schema"))?
        } else {
            if !map.contains_key("type") {
                return Err(invalid(format!("parameter \"{name}\" has no type")));
            }
            parser.parse(raw, path)?
        };

        let tag = descriptor::resolve(defs, &schema)?;
        if tag.is_file() && location != ParamLocation::FormData {
            return Err(invalid(format!(
                "file parameter \"{name}\" must be in formData, not {location}"
            )));
        }

        let collection_format = match map.get("collectionFormat").and_then(Value::as_str) {
            Some(cf) => CollectionFormat::parse(cf)
                .ok_or_else(|| invalid(format!("unknown collectionFormat \"{cf}\"")))?,
            None => CollectionFormat::default(),
        };

        Ok(Self {
            name,
            location,
            default: schema.default.clone(),
            schema,
            tag,
            // Path parameters are always required.
            required: location == ParamLocation::Path
                || map.get("required").and_then(Value::as_bool).unwrap_or(false),
            collection_format,
            allow_empty_value: map
                .get("allowEmptyValue")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}
