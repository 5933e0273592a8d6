//! Native value to wire value conversion, the inverse of [`crate::unmarshal`].

use serde_json::{Map, Number, Value};

use crate::error::MappingError;
use crate::schema::{AdditionalProperties, Kind, Primitive, SchemaNode};
use crate::spec::Spec;
use crate::types::Native;
use crate::unmarshal::{display_path, field_path};
use crate::validator;

/// Convert `native` into a wire value shaped by `node`.
///
/// Absent optional fields are left out of objects. An absent required field
/// is an error rather than being sent as null.
pub fn marshal(spec: &Spec, node: &SchemaNode, native: &Native) -> Result<Value, MappingError> {
    Marshaler { spec }.value(node, native, "")
}

struct Marshaler<'s> {
    spec: &'s Spec,
}

impl Marshaler<'_> {
    fn value(&self, node: &SchemaNode, native: &Native, path: &str) -> Result<Value, MappingError> {
        if native.is_null() {
            return Ok(Value::Null);
        }
        let target = self.spec.definitions().follow(node)?;

        let wire = match target.kind {
            Some(Kind::Primitive(p)) => self.primitive(target, p, native, path)?,
            Some(Kind::Array) => self.array(target, native, path)?,
            Some(Kind::Object) => self.object(target, native, path)?,
            None => native.to_json(),
        };

        if self.spec.config().validate_requests {
            validator::validate(target, &wire, &display_path(path))?;
        }
        Ok(wire)
    }

    fn primitive(
        &self,
        node: &SchemaNode,
        primitive: Primitive,
        native: &Native,
        path: &str,
    ) -> Result<Value, MappingError> {
        if let Some(format) = &node.format {
            if let Some(converter) = self.spec.formats().get(format) {
                return converter
                    .to_wire(native)
                    .map_err(|message| MappingError::Format {
                        path: display_path(path),
                        format: format.clone(),
                        message,
                    });
            }
        }

        match (primitive, native) {
            (Primitive::String, Native::String(s)) => Ok(Value::String(s.clone())),
            (Primitive::Integer, Native::Int(i)) => Ok(Value::Number((*i).into())),
            (Primitive::Number, Native::Int(i)) => Ok(Value::Number((*i).into())),
            (Primitive::Number, Native::Float(f)) => {
                Number::from_f64(*f)
                    .map(Value::Number)
                    .ok_or_else(|| MappingError::TypeMismatch {
                        path: display_path(path),
                        expected: "finite number".into(),
                        actual: f.to_string(),
                    })
            }
            (Primitive::Boolean, Native::Bool(b)) => Ok(Value::Bool(*b)),
            (Primitive::File, other) => Ok(other.to_json()),
            (_, other) => Err(MappingError::TypeMismatch {
                path: display_path(path),
                expected: primitive.as_str().to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    fn array(&self, node: &SchemaNode, native: &Native, path: &str) -> Result<Value, MappingError> {
        let items = native.as_array().ok_or_else(|| MappingError::TypeMismatch {
            path: display_path(path),
            expected: "array".into(),
            actual: native.type_name().into(),
        })?;

        let Some(item_node) = node.items.as_deref() else {
            return Ok(native.to_json());
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.value(item_node, item, &format!("{path}/{i}")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn object(&self, node: &SchemaNode, native: &Native, path: &str) -> Result<Value, MappingError> {
        let fields: Vec<(&str, &Native)> = match native {
            Native::Record(record) => {
                if let Some(expected) = &node.record_name {
                    if record.record_name() != expected {
                        return Err(MappingError::TypeMismatch {
                            path: display_path(path),
                            expected: format!("record:{expected}"),
                            actual: format!("record:{}", record.record_name()),
                        });
                    }
                }
                record.fields().collect()
            }
            Native::Map(map) => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            other => {
                return Err(MappingError::TypeMismatch {
                    path: display_path(path),
                    expected: "object".into(),
                    actual: other.type_name().into(),
                })
            }
        };
        let lookup = |name: &str| fields.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);

        let mut out = Map::new();
        for (name, prop) in &node.properties {
            let required = node.is_required(name);
            match lookup(name) {
                Some(v) if !v.is_null() => {
                    out.insert(name.clone(), self.value(prop, v, &field_path(path, name))?);
                }
                Some(_) if required && self.nullable(prop) => {
                    out.insert(name.clone(), Value::Null);
                }
                _ if required => {
                    return Err(MappingError::RequiredAbsent {
                        path: display_path(path),
                        field: name.clone(),
                    })
                }
                _ => {}
            }
        }

        let mut unknown = Vec::new();
        for (key, v) in &fields {
            if node.properties.contains_key(*key) || v.is_null() {
                continue;
            }
            match &node.additional_properties {
                AdditionalProperties::Any => {
                    out.insert(key.to_string(), v.to_json());
                }
                AdditionalProperties::Schema(extra) => {
                    out.insert(key.to_string(), self.value(extra, v, &field_path(path, key))?);
                }
                AdditionalProperties::Forbidden => unknown.push(key.to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(MappingError::UnknownFields {
                record: node.record_name.clone().unwrap_or_else(|| "object".into()),
                keys: unknown,
            });
        }

        Ok(Value::Object(out))
    }

    fn nullable(&self, node: &SchemaNode) -> bool {
        self.spec
            .definitions()
            .follow(node)
            .map(|target| target.nullable)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecConfig;
    use chrono::NaiveDate;
    use indexmap::IndexMap;
    use serde_json::json;

    fn spec() -> Spec {
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
                        "name": { "type": "string", "minLength": 1 },
                        "born": { "type": "string", "format": "date" },
                        "tags": { "type": "array", "items": { "$ref": "#/definitions/Tag" } }
                    }
                },
                "Tag": { "type": "object", "properties": { "name": { "type": "string" } } },
                "Strict": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": { "a": { "type": "string" } }
                },
                "Note": {
                    "type": "object",
                    "required": ["text", "owner"],
                    "properties": {
                        "text": { "type": "string" },
                        "owner": { "type": "string", "x-nullable": true }
                    }
                }
            }
        });
        Spec::from_document(&doc, SpecConfig::default()).unwrap()
    }

    fn pet(spec: &Spec, fields: Vec<(&str, Native)>) -> Native {
        let record = spec.records().lookup("Pet").unwrap();
        Native::Record(
            record
                .instantiate(fields.into_iter().map(|(k, v)| (k.to_string(), v)))
                .unwrap(),
        )
    }

    #[test]
    fn record_marshals_with_formats() {
        let spec = spec();
        let value = pet(
            &spec,
            vec![
                ("id", Native::Int(7)),
                ("name", Native::from("Rex")),
                ("born", Native::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap())),
            ],
        );
        let wire = spec.marshal(&SchemaNode::reference("Pet"), &value).unwrap();
        assert_eq!(
            wire,
            json!({ "id": 7, "name": "Rex", "born": "2020-02-29", "tags": [] })
        );
    }

    #[test]
    fn absent_optional_fields_are_omitted() {
        let spec = spec();
        let value = pet(&spec, vec![("id", Native::Int(1)), ("name", Native::from("x"))]);
        let wire = spec.marshal(&SchemaNode::reference("Pet"), &value).unwrap();
        assert!(wire.get("born").is_none());
    }

    #[test]
    fn absent_required_field_fails() {
        let spec = spec();
        let mut value = pet(&spec, vec![("name", Native::from("x"))]);
        if let Native::Record(r) = &mut value {
            r.set("id", Native::Null).unwrap();
        }
        let err = spec.marshal(&SchemaNode::reference("Pet"), &value).unwrap_err();
        assert!(matches!(err, MappingError::RequiredAbsent { field, .. } if field == "id"));
    }

    #[test]
    fn required_nullable_field_is_sent_as_null() {
        let spec = spec();
        let mut note = IndexMap::new();
        note.insert("text".to_string(), Native::from("hi"));
        note.insert("owner".to_string(), Native::Null);
        let wire = spec
            .marshal(&SchemaNode::reference("Note"), &Native::Map(note.clone()))
            .unwrap();
        assert_eq!(wire, json!({ "text": "hi", "owner": null }));
        assert_eq!(wire.to_string(), r#"{"text":"hi","owner":null}"#);

        note.insert("text".to_string(), Native::Null);
        assert!(matches!(
            spec.marshal(&SchemaNode::reference("Note"), &Native::Map(note)),
            Err(MappingError::RequiredAbsent { field, .. }) if field == "text"
        ));
    }

    #[test]
    fn maps_are_accepted_for_records() {
        let spec = spec();
        let mut map = IndexMap::new();
        map.insert("id".to_string(), Native::Int(2));
        map.insert("name".to_string(), Native::from("Tom"));
        let wire = spec
            .marshal(&SchemaNode::reference("Pet"), &Native::Map(map.clone()))
            .unwrap();
        assert_eq!(wire, json!({ "id": 2, "name": "Tom" }));

        map.shift_remove("name");
        assert!(matches!(
            spec.marshal(&SchemaNode::reference("Pet"), &Native::Map(map)),
            Err(MappingError::RequiredAbsent { .. })
        ));
    }

    #[test]
    fn wrong_record_type_is_rejected() {
        let spec = spec();
        let tag = spec.records().lookup("Tag").unwrap().instantiate([]).unwrap();
        let err = spec
            .marshal(&SchemaNode::reference("Pet"), &Native::Record(tag))
            .unwrap_err();
        assert!(matches!(err, MappingError::TypeMismatch { expected, .. } if expected == "record:Pet"));
    }

    #[test]
    fn primitive_type_mismatch() {
        let spec = spec();
        let value = pet(&spec, vec![("id", Native::Int(1)), ("name", Native::Int(5))]);
        let err = spec.marshal(&SchemaNode::reference("Pet"), &value).unwrap_err();
        assert!(matches!(err, MappingError::TypeMismatch { path, .. } if path == "/name"));
    }

    #[test]
    fn request_validation_applies_constraints() {
        let spec = spec();
        let value = pet(&spec, vec![("id", Native::Int(1)), ("name", Native::from(""))]);
        assert!(matches!(
            spec.marshal(&SchemaNode::reference("Pet"), &value),
            Err(MappingError::Invalid { .. })
        ));
    }

    #[test]
    fn forbidden_extra_keys_are_named() {
        let spec = spec();
        let mut map = IndexMap::new();
        map.insert("a".to_string(), Native::from("x"));
        map.insert("b".to_string(), Native::Int(1));
        let err = spec
            .marshal(&SchemaNode::reference("Strict"), &Native::Map(map))
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownFields { keys, .. } if keys == vec!["b".to_string()]));
    }
}
