//! Wire value to native value conversion.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::MappingError;
use crate::schema::{AdditionalProperties, Kind, Primitive, SchemaNode};
use crate::spec::Spec;
use crate::types::{json_type_name, Native};
use crate::validator;

/// Convert `wire` into a native value shaped by `node`.
///
/// Named object schemas become record instances (unless the spec was loaded
/// with `use_records` off). The input is never modified.
pub fn unmarshal(spec: &Spec, node: &SchemaNode, wire: &Value) -> Result<Native, MappingError> {
    Unmarshaler { spec }.value(node, wire, "", false)
}

/// Render a walk path for error messages.
pub(crate) fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

pub(crate) fn field_path(path: &str, field: &str) -> String {
    format!("{path}/{}", field.replace('~', "~0").replace('/', "~1"))
}

struct Unmarshaler<'s> {
    spec: &'s Spec,
}

impl Unmarshaler<'_> {
    fn value(
        &self,
        node: &SchemaNode,
        wire: &Value,
        path: &str,
        required: bool,
    ) -> Result<Native, MappingError> {
        let target = self.spec.definitions().follow(node)?;

        if wire.is_null() {
            if required && !(node.nullable || target.nullable) {
                return Err(MappingError::RequiredNull {
                    path: display_path(path),
                });
            }
            return Ok(Native::Null);
        }

        if self.spec.config().validate_responses {
            validator::validate(target, wire, &display_path(path))?;
        }

        match target.kind {
            Some(Kind::Primitive(p)) => self.primitive(target, p, wire, path),
            Some(Kind::Array) => self.array(target, wire, path),
            Some(Kind::Object) => match &target.record_name {
                Some(name) if self.spec.config().use_records => self.record(name, target, wire, path),
                _ => self.object(target, wire, path),
            },
            None => Ok(Native::from_json(wire)),
        }
    }

    fn primitive(
        &self,
        node: &SchemaNode,
        primitive: Primitive,
        wire: &Value,
        path: &str,
    ) -> Result<Native, MappingError> {
        if let Some(format) = &node.format {
            if let Some(converter) = self.spec.formats().get(format) {
                return converter
                    .to_native(wire)
                    .map_err(|message| MappingError::Format {
                        path: display_path(path),
                        format: format.clone(),
                        message,
                    });
            }
        }

        let mismatch = || MappingError::TypeMismatch {
            path: display_path(path),
            expected: primitive.as_str().to_string(),
            actual: json_type_name(wire).to_string(),
        };

        match primitive {
            Primitive::String => wire
                .as_str()
                .map(|s| Native::String(s.to_string()))
                .ok_or_else(mismatch),
            Primitive::Integer => match wire.as_i64() {
                Some(i) => Ok(Native::Int(i)),
                None => match wire.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Native::Int(f as i64))
                    }
                    _ => Err(mismatch()),
                },
            },
            Primitive::Number => wire.as_f64().map(Native::Float).ok_or_else(mismatch),
            Primitive::Boolean => wire.as_bool().map(Native::Bool).ok_or_else(mismatch),
            Primitive::File => Ok(Native::from_json(wire)),
        }
    }

    fn array(&self, node: &SchemaNode, wire: &Value, path: &str) -> Result<Native, MappingError> {
        let items = wire.as_array().ok_or_else(|| MappingError::TypeMismatch {
            path: display_path(path),
            expected: "array".into(),
            actual: json_type_name(wire).into(),
        })?;

        let Some(item_node) = node.items.as_deref() else {
            return Ok(Native::from_json(wire));
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.value(item_node, item, &format!("{path}/{i}"), false))
            .collect::<Result<Vec<_>, _>>()
            .map(Native::Array)
    }

    fn object(&self, node: &SchemaNode, wire: &Value, path: &str) -> Result<Native, MappingError> {
        let map = as_object(wire, path)?;
        let mut out = IndexMap::with_capacity(map.len().max(node.properties.len()));

        for (name, prop) in &node.properties {
            let required = node.is_required(name);
            match map.get(name) {
                Some(v) => {
                    out.insert(name.clone(), self.value(prop, v, &field_path(path, name), required)?);
                }
                None if required => {
                    return Err(MappingError::RequiredAbsent {
                        path: display_path(path),
                        field: name.clone(),
                    })
                }
                None if self.spec.config().include_missing_properties => {
                    out.insert(name.clone(), Native::Null);
                }
                None => {}
            }
        }

        for (key, v) in map {
            if node.properties.contains_key(key) {
                continue;
            }
            match &node.additional_properties {
                AdditionalProperties::Any => {
                    out.insert(key.clone(), Native::from_json(v));
                }
                AdditionalProperties::Schema(extra) => {
                    out.insert(key.clone(), self.value(extra, v, &field_path(path, key), false)?);
                }
                AdditionalProperties::Forbidden => {}
            }
        }

        Ok(Native::Map(out))
    }

    fn record(
        &self,
        name: &str,
        node: &SchemaNode,
        wire: &Value,
        path: &str,
    ) -> Result<Native, MappingError> {
        let record = self.spec.records().lookup(name)?;
        let map = as_object(wire, path)?;

        let mut fields = Vec::with_capacity(node.properties.len());
        for (field, prop) in &node.properties {
            let required = record.is_required(field);
            match map.get(field) {
                Some(v) => fields.push((field.clone(), self.value(prop, v, &field_path(path, field), required)?)),
                None if required => {
                    return Err(MappingError::RequiredAbsent {
                        path: display_path(path),
                        field: field.clone(),
                    })
                }
                // Left out so the record type supplies its default or zero value.
                None => {}
            }
        }

        let dropped = map.keys().filter(|k| !node.properties.contains_key(*k)).count();
        if dropped > 0 {
            tracing::debug!(record = name, dropped, path = %display_path(path), "ignoring undeclared keys");
        }

        record.instantiate(fields).map(Native::Record)
    }
}

fn as_object<'v>(wire: &'v Value, path: &str) -> Result<&'v serde_json::Map<String, Value>, MappingError> {
    wire.as_object().ok_or_else(|| MappingError::TypeMismatch {
        path: display_path(path),
        expected: "object".into(),
        actual: json_type_name(wire).into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecConfig;
    use chrono::NaiveDate;
    use serde_json::json;

    fn spec_with(config: SpecConfig) -> Spec {
        let doc = json!({
            "swagger": "2.0",
            "info": { "title": "t", "version": "1" },
            "paths": {},
            "definitions": {
                "Pet": {
                    "type": "object",
                    "required": ["id", "name"],
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "name": { "type": "string" },
                        "born": { "type": "string", "format": "date" },
                        "tags": { "type": "array", "items": { "$ref": "#/definitions/Tag" } },
                        "nickname": { "type": "string", "x-nullable": true }
                    }
                },
                "Tag": { "type": "object", "properties": { "name": { "type": "string" } } },
                "Counts": {
                    "type": "object",
                    "properties": { "total": { "type": "integer" } },
                    "additionalProperties": { "type": "integer", "minimum": 0 }
                },
                "Status": { "type": "string", "enum": ["available", "sold"] }
            }
        });
        Spec::from_document(&doc, config).unwrap()
    }

    fn spec() -> Spec {
        spec_with(SpecConfig::default())
    }

    #[test]
    fn record_with_missing_optional_fields() {
        let spec = spec();
        let pet = spec
            .unmarshal(&SchemaNode::reference("Pet"), &json!({ "id": 1, "name": "Fido" }))
            .unwrap();
        let pet = pet.as_record().unwrap();
        assert_eq!(pet.record_name(), "Pet");
        assert_eq!(pet.get("id"), Some(&Native::Int(1)));
        assert_eq!(pet.get("tags"), Some(&Native::Array(vec![])));
        assert_eq!(pet.get("born"), Some(&Native::Null));
    }

    #[test]
    fn nested_records_and_formats() {
        let spec = spec();
        let pet = spec
            .unmarshal(
                &SchemaNode::reference("Pet"),
                &json!({
                    "id": "9007199254740993",
                    "name": "Rex",
                    "born": "2019-05-04",
                    "tags": [{ "name": "good" }, { "name": "dog" }]
                }),
            )
            .unwrap();
        assert_eq!(pet.get("id"), Some(&Native::Int(9_007_199_254_740_993)));
        assert_eq!(
            pet.get("born"),
            Some(&Native::Date(NaiveDate::from_ymd_opt(2019, 5, 4).unwrap()))
        );
        let tags = pet.get("tags").and_then(Native::as_array).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1].get("name"), Some(&Native::from("dog")));
    }

    #[test]
    fn missing_required_field_fails() {
        let err = spec()
            .unmarshal(&SchemaNode::reference("Pet"), &json!({ "id": 1 }))
            .unwrap_err();
        assert!(matches!(err, MappingError::RequiredAbsent { field, .. } if field == "name"));
    }

    #[test]
    fn null_required_field_fails_unless_nullable() {
        let spec = spec();
        let err = spec
            .unmarshal(&SchemaNode::reference("Pet"), &json!({ "id": null, "name": "x" }))
            .unwrap_err();
        assert!(matches!(err, MappingError::RequiredNull { path } if path == "/id"));

        let pet = spec
            .unmarshal(
                &SchemaNode::reference("Pet"),
                &json!({ "id": 1, "name": "x", "nickname": null }),
            )
            .unwrap();
        assert_eq!(pet.get("nickname"), Some(&Native::Null));
    }

    #[test]
    fn shape_mismatches_report_the_path() {
        let err = spec()
            .unmarshal(&SchemaNode::reference("Pet"), &json!({ "id": 1, "name": "x", "tags": {} }))
            .unwrap_err();
        // The validator catches this before the walk does.
        assert!(matches!(err, MappingError::Invalid { path, .. } if path == "/tags"));

        let lax = spec_with(SpecConfig::default().validate_responses(false));
        let err = lax
            .unmarshal(&SchemaNode::reference("Pet"), &json!({ "id": 1, "name": "x", "tags": {} }))
            .unwrap_err();
        assert!(matches!(err, MappingError::TypeMismatch { path, .. } if path == "/tags"));
    }

    #[test]
    fn undeclared_keys_are_dropped_from_records() {
        let pet = spec()
            .unmarshal(
                &SchemaNode::reference("Pet"),
                &json!({ "id": 1, "name": "x", "colour": "brown" }),
            )
            .unwrap();
        assert!(pet.get("colour").is_none());
    }

    #[test]
    fn additional_properties_schema_applies_to_extra_keys() {
        let spec = spec_with(SpecConfig::default().use_records(false));
        let counts = spec
            .unmarshal(&SchemaNode::reference("Counts"), &json!({ "cats": 2 }))
            .unwrap();
        match counts {
            Native::Map(map) => {
                assert_eq!(map["cats"], Native::Int(2));
                // Declared but missing.
                assert_eq!(map["total"], Native::Null);
            }
            other => panic!("expected map, got {other:?}"),
        }

        let err = spec
            .unmarshal(&SchemaNode::reference("Counts"), &json!({ "cats": -1 }))
            .unwrap_err();
        assert!(matches!(err, MappingError::Invalid { path, .. } if path == "/cats"));
    }

    #[test]
    fn missing_properties_can_be_left_out_of_maps() {
        let spec = spec_with(
            SpecConfig::default()
                .use_records(false)
                .include_missing_properties(false),
        );
        let tag = spec.unmarshal(&SchemaNode::reference("Tag"), &json!({})).unwrap();
        assert_eq!(tag, Native::Map(IndexMap::new()));
    }

    #[test]
    fn enum_constraint_on_alias() {
        let spec = spec();
        assert_eq!(
            spec.unmarshal(&SchemaNode::reference("Status"), &json!("sold")).unwrap(),
            Native::from("sold")
        );
        assert!(spec
            .unmarshal(&SchemaNode::reference("Status"), &json!("lost"))
            .is_err());
    }

    #[test]
    fn top_level_array_of_records() {
        let node = SchemaNode::array(SchemaNode::reference("Tag"));
        let tags = spec().unmarshal(&node, &json!([{ "name": "a" }])).unwrap();
        assert_eq!(tags.as_array().unwrap()[0].get("name"), Some(&Native::from("a")));
    }

    #[test]
    fn integral_floats_are_integers() {
        let node = SchemaNode::primitive(Primitive::Integer);
        let spec = spec_with(SpecConfig::default().validate_responses(false));
        assert_eq!(spec.unmarshal(&node, &json!(4.0)).unwrap(), Native::Int(4));
        assert!(spec.unmarshal(&node, &json!(4.5)).is_err());
    }
}
