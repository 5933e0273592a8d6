//! Schema validation adapter.
//!
//! Structural conformance is delegated to `jsonschema`. The marshaling walk
//! handles shape, nesting, `required` and references itself, so each node is
//! only checked against its local constraints (`type`, `enum`, ranges,
//! lengths, patterns, item and property counts).

use serde_json::{Map, Value};

use crate::error::{MappingError, SchemaError, Violation};
use crate::schema::{AdditionalProperties, Kind, Primitive, SchemaNode};

/// Dialect of Swagger 2.0 schema objects.
const DRAFT4: &str = "http://json-schema.org/draft-04/schema#";

/// Structural subset of the Swagger 2.0 meta-schema.
const SWAGGER_META_SCHEMA: &str = include_str!("meta/swagger-2.0.json");

/// Validate a wire value against the local constraints of `node`.
///
/// Null values are the caller's business (required/nullable policy) and
/// always pass here.
pub fn validate(node: &SchemaNode, wire: &Value, path: &str) -> Result<(), MappingError> {
    if wire.is_null() {
        return Ok(());
    }
    match node.kind {
        Some(Kind::Primitive(_)) => validate_primitive(node, wire, path),
        Some(Kind::Array) => validate_array(node, wire, path),
        Some(Kind::Object) => validate_object(node, wire, path),
        None => Ok(()),
    }
}

pub fn validate_primitive(node: &SchemaNode, wire: &Value, path: &str) -> Result<(), MappingError> {
    let mut schema = local_schema(node);
    match node.kind {
        Some(Kind::Primitive(Primitive::File)) | None => {}
        Some(Kind::Primitive(p)) => {
            // int64 travels as a string in some APIs; the format converter
            // decides whether the text is acceptable.
            let int_as_text = p == Primitive::Integer && wire.is_string() && node.format.is_some();
            if !int_as_text {
                schema.insert("type".into(), Value::String(p.as_str().into()));
            }
        }
        Some(_) => {}
    }
    check(schema, wire, path)
}

pub fn validate_array(node: &SchemaNode, wire: &Value, path: &str) -> Result<(), MappingError> {
    let mut schema = local_schema(node);
    schema.insert("type".into(), Value::String("array".into()));
    check(schema, wire, path)
}

pub fn validate_object(node: &SchemaNode, wire: &Value, path: &str) -> Result<(), MappingError> {
    let mut schema = local_schema(node);
    schema.insert("type".into(), Value::String("object".into()));
    if node.additional_properties == AdditionalProperties::Forbidden {
        let declared: Map<String, Value> = node
            .properties
            .keys()
            .map(|k| (k.clone(), Value::Object(Map::new())))
            .collect();
        schema.insert("properties".into(), Value::Object(declared));
        schema.insert("additionalProperties".into(), Value::Bool(false));
    }
    check(schema, wire, path)
}

/// Validate a value against a complete JSON Schema document.
///
/// Violation paths are relative to the value.
pub fn validate_against_schema(schema: &Value, payload: &Value) -> Result<(), Vec<Violation>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            return Err(vec![Violation {
                path: String::new(),
                message: format!("invalid schema: {e}"),
            }])
        }
    };

    let errors: Vec<Violation> = validator
        .iter_errors(payload)
        .map(|e| Violation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Structurally validate a spec document before it is parsed.
pub fn validate_document(doc: &Value) -> Result<(), SchemaError> {
    let meta: Value = serde_json::from_str(SWAGGER_META_SCHEMA)
        .map_err(|source| SchemaError::InvalidJson { source })?;
    validate_against_schema(&meta, doc).map_err(|errors| SchemaError::InvalidDocument { errors })
}

fn local_schema(node: &SchemaNode) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("$schema".into(), Value::String(DRAFT4.into()));
    for (k, v) in &node.constraints {
        schema.insert(k.clone(), v.clone());
    }
    schema
}

fn check(schema: Map<String, Value>, wire: &Value, path: &str) -> Result<(), MappingError> {
    // Nothing but the dialect marker: nothing to check.
    if schema.len() == 1 {
        return Ok(());
    }
    let validator = jsonschema::validator_for(&Value::Object(schema)).map_err(|e| {
        MappingError::Schema(SchemaError::InvalidSchema {
            message: format!("at {path}: {e}"),
        })
    })?;

    let errors: Vec<Violation> = validator
        .iter_errors(wire)
        .map(|e| Violation {
            path: format!("{path}{}", e.instance_path),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(MappingError::Invalid {
            path: if path.is_empty() { "/".into() } else { path.to_string() },
            errors,
        })
    }
}
