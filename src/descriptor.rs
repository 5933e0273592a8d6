//! Canonical type tags used to dispatch marshaling.

use std::fmt;

use crate::error::SchemaError;
use crate::schema::{Definitions, Kind, Primitive, SchemaNode};

/// Canonical type of a schema node.
///
/// Renders as `"string"`, `"string:date"`, `"array:integer"`, `"object"` or
/// `"record:Pet"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Primitive(Primitive),
    Formatted(Primitive, String),
    Array(Box<TypeTag>),
    Object,
    Record(String),
}

impl TypeTag {
    pub fn is_array(&self) -> bool {
        matches!(self, TypeTag::Array(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(
            self,
            TypeTag::Primitive(Primitive::File) | TypeTag::Formatted(Primitive::File, _)
        )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Primitive(p) => f.write_str(p.as_str()),
            TypeTag::Formatted(p, format) => write!(f, "{}:{format}", p.as_str()),
            TypeTag::Array(items) => write!(f, "array:{items}"),
            TypeTag::Object => f.write_str("object"),
            TypeTag::Record(name) => write!(f, "record:{name}"),
        }
    }
}

/// Derive the type tag of `node`.
///
/// Rules, first match wins: a formatted primitive; an array (tagged by its
/// items); a reference (the referenced record's name, or the tag of the
/// referenced schema when it is not a record); a named record; the bare kind.
pub fn resolve(defs: &Definitions, node: &SchemaNode) -> Result<TypeTag, SchemaError> {
    resolve_inner(defs, node, &mut Vec::new())
}

fn resolve_inner(
    defs: &Definitions,
    node: &SchemaNode,
    aliases: &mut Vec<String>,
) -> Result<TypeTag, SchemaError> {
    if let (Some(Kind::Primitive(p)), Some(format)) = (node.kind, &node.format) {
        return Ok(TypeTag::Formatted(p, format.clone()));
    }

    if node.kind == Some(Kind::Array) {
        let items = node.items.as_deref().ok_or_else(|| SchemaError::MissingItems {
            path: node.path.clone(),
        })?;
        return Ok(TypeTag::Array(Box::new(resolve_inner(defs, items, aliases)?)));
    }

    if let Some(reference) = &node.reference {
        let name = reference.name();
        let target = defs.get(name).ok_or_else(|| SchemaError::UnresolvedRef {
            reference: format!("{}{name}", crate::schema::DEFINITIONS_PREFIX),
        })?;
        if let Some(record) = &target.record_name {
            return Ok(TypeTag::Record(record.clone()));
        }
        // Aliases to non-record schemas are transparent.
        if aliases.iter().any(|a| a == name) {
            aliases.push(name.to_string());
            return Err(SchemaError::CircularRef {
                chain: std::mem::take(aliases),
            });
        }
        aliases.push(name.to_string());
        let tag = resolve_inner(defs, target, aliases)?;
        aliases.pop();
        return Ok(tag);
    }

    if let Some(record) = &node.record_name {
        return Ok(TypeTag::Record(record.clone()));
    }

    match node.kind {
        Some(Kind::Primitive(p)) => Ok(TypeTag::Primitive(p)),
        Some(Kind::Object) => Ok(TypeTag::Object),
        _ => Err(SchemaError::NoTypeTag {
            path: if node.path.is_empty() {
                "#".to_string()
            } else {
                node.path.clone()
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaParser;
    use serde_json::json;

    fn defs() -> Definitions {
        let doc = json!({
            "definitions": {
                "Pet": { "type": "object", "properties": { "id": { "type": "integer" } } },
                "Name": { "type": "string" },
                "Names": { "type": "array", "items": { "$ref": "#/definitions/Name" } },
                "Loop": { "type": "array", "items": { "$ref": "#/definitions/Loop" } }
            }
        });
        SchemaParser::new(&doc).parse_definitions().unwrap()
    }

    #[test]
    fn formatted_primitive() {
        let node = SchemaNode::primitive(Primitive::String).with_format("date");
        assert_eq!(resolve(&defs(), &node).unwrap().to_string(), "string:date");
    }

    #[test]
    fn bare_primitive_and_object() {
        let node = SchemaNode::primitive(Primitive::Boolean);
        assert_eq!(resolve(&defs(), &node).unwrap().to_string(), "boolean");

        let node = SchemaNode {
            kind: Some(Kind::Object),
            ..SchemaNode::default()
        };
        assert_eq!(resolve(&defs(), &node).unwrap(), TypeTag::Object);
    }

    #[test]
    fn arrays_tag_their_items() {
        let node = SchemaNode::array(SchemaNode::reference("Pet"));
        assert_eq!(resolve(&defs(), &node).unwrap().to_string(), "array:record:Pet");

        let node = SchemaNode::array(SchemaNode::primitive(Primitive::Integer).with_format("int64"));
        assert_eq!(resolve(&defs(), &node).unwrap().to_string(), "array:integer:int64");
    }

    #[test]
    fn record_reference_uses_record_name() {
        let defs = defs();
        assert_eq!(
            resolve(&defs, &SchemaNode::reference("Pet")).unwrap(),
            TypeTag::Record("Pet".into())
        );
        assert_eq!(
            resolve(&defs, defs.get("Pet").unwrap()).unwrap(),
            TypeTag::Record("Pet".into())
        );
    }

    #[test]
    fn alias_reference_is_transparent() {
        let defs = defs();
        assert_eq!(
            resolve(&defs, &SchemaNode::reference("Names")).unwrap().to_string(),
            "array:string"
        );
    }

    #[test]
    fn self_referencing_alias_is_circular() {
        let defs = defs();
        let result = resolve(&defs, &SchemaNode::reference("Loop"));
        assert!(matches!(result, Err(SchemaError::CircularRef { .. })));
    }

    #[test]
    fn untyped_node_has_no_tag() {
        let result = resolve(&defs(), &SchemaNode::default());
        assert!(matches!(result, Err(SchemaError::NoTypeTag { .. })));
    }

    #[test]
    fn array_without_items_is_an_error() {
        let node = SchemaNode {
            kind: Some(Kind::Array),
            path: "/definitions/Bad".into(),
            ..SchemaNode::default()
        };
        assert!(matches!(
            resolve(&defs(), &node),
            Err(SchemaError::MissingItems { path }) if path == "/definitions/Bad"
        ));
    }

    #[test]
    fn missing_reference_is_unresolved() {
        let result = resolve(&defs(), &SchemaNode::reference("Ghost"));
        assert!(matches!(result, Err(SchemaError::UnresolvedRef { .. })));
    }
}
