//! Schema nodes parsed from a Swagger 2.0 document.
//!
//! Named schemas live in a [`Definitions`] arena. A `$ref` inside any schema
//! is kept as a [`SchemaRef`], a name lookup into that arena, so recursive
//! types need no in-place pointer patching and reference cycles can be
//! detected by walking names.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::loader::navigate_fragment;
use crate::types::json_type_name;

/// Prefix of references into the definitions arena.
pub const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Keywords forwarded untouched to the validator adapter.
pub const CONSTRAINT_KEYWORDS: &[&str] = &[
    "enum",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minProperties",
    "maxProperties",
];

/// Swagger 2.0 primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
    /// Only valid for `formData` parameters and responses.
    File,
}

impl Primitive {
    /// Parse a `type` keyword value.
    ///
    /// Returns `None` for non-primitive or unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Primitive::String),
            "integer" => Some(Primitive::Integer),
            "number" => Some(Primitive::Number),
            "boolean" => Some(Primitive::Boolean),
            "file" => Some(Primitive::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Integer => "integer",
            Primitive::Number => "number",
            Primitive::Boolean => "boolean",
            Primitive::File => "file",
        }
    }
}

/// Structural kind of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Primitive(Primitive),
    Array,
    Object,
}

/// Reference to a named schema in the [`Definitions`] arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRef(String);

impl SchemaRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Parse a `$ref` string. Only local definition references are accepted.
    pub fn parse(reference: &str, path: &str) -> Result<Self, SchemaError> {
        match reference.strip_prefix(DEFINITIONS_PREFIX) {
            Some(name) if !name.is_empty() && !name.contains('/') => {
                Ok(Self(name.replace("~1", "/").replace("~0", "~")))
            }
            _ => Err(SchemaError::UnsupportedRef {
                path: path.to_string(),
                reference: reference.to_string(),
            }),
        }
    }
}

/// What an object accepts beyond its declared properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AdditionalProperties {
    #[default]
    Any,
    Forbidden,
    Schema(Box<SchemaNode>),
}

/// One node of the type-description tree.
///
/// Immutable once the owning spec is loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaNode {
    pub kind: Option<Kind>,
    pub format: Option<String>,
    pub items: Option<Box<SchemaNode>>,
    pub properties: IndexMap<String, SchemaNode>,
    pub required: IndexSet<String>,
    pub default: Option<Value>,
    /// Set only when this node is a named record type.
    pub record_name: Option<String>,
    pub reference: Option<SchemaRef>,
    /// `x-nullable`: an explicit null is accepted even when required.
    pub nullable: bool,
    pub additional_properties: AdditionalProperties,
    /// Validation keywords from [`CONSTRAINT_KEYWORDS`].
    pub constraints: Map<String, Value>,
    /// JSON pointer of this node in the source document.
    pub path: String,
}

impl SchemaNode {
    /// A bare primitive node, mostly useful for tests and parameter schemas.
    pub fn primitive(primitive: Primitive) -> Self {
        Self {
            kind: Some(Kind::Primitive(primitive)),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn array(items: SchemaNode) -> Self {
        Self {
            kind: Some(Kind::Array),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            reference: Some(SchemaRef::new(name)),
            ..Self::default()
        }
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.contains(field)
    }

    pub fn is_object(&self) -> bool {
        self.kind == Some(Kind::Object)
    }
}

/// Arena of named schemas, keyed by definition name.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    nodes: IndexMap<String, SchemaNode>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, node: SchemaNode) {
        self.nodes.insert(name.into(), node);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follow a chain of references to the node that carries structure.
    ///
    /// Returns `node` itself when it is not a reference.
    pub fn follow<'a>(&'a self, node: &'a SchemaNode) -> Result<&'a SchemaNode, SchemaError> {
        let mut current = node;
        let mut chain: Vec<String> = Vec::new();
        while let Some(reference) = &current.reference {
            let name = reference.name();
            if chain.iter().any(|seen| seen == name) {
                chain.push(name.to_string());
                return Err(SchemaError::CircularRef { chain });
            }
            chain.push(name.to_string());
            current = self.get(name).ok_or_else(|| SchemaError::UnresolvedRef {
                reference: format!("{DEFINITIONS_PREFIX}{name}"),
            })?;
        }
        Ok(current)
    }

    /// Check that every reference reachable from `node` resolves.
    pub fn check_refs(&self, node: &SchemaNode) -> Result<(), SchemaError> {
        if let Some(reference) = &node.reference {
            if !self.contains(reference.name()) {
                return Err(SchemaError::UnresolvedRef {
                    reference: format!("{DEFINITIONS_PREFIX}{}", reference.name()),
                });
            }
        }
        if let Some(items) = &node.items {
            self.check_refs(items)?;
        }
        for prop in node.properties.values() {
            self.check_refs(prop)?;
        }
        if let AdditionalProperties::Schema(extra) = &node.additional_properties {
            self.check_refs(extra)?;
        }
        Ok(())
    }
}

/// Parses schema objects out of a spec document.
///
/// Inline schemas tagged with `x-model` are collected while parsing so they
/// can be registered in the arena next to the top-level definitions.
pub struct SchemaParser<'a> {
    doc: &'a Value,
    models: IndexMap<String, SchemaNode>,
}

impl<'a> SchemaParser<'a> {
    pub fn new(doc: &'a Value) -> Self {
        Self {
            doc,
            models: IndexMap::new(),
        }
    }

    /// Parse every entry of the document's `definitions` section.
    pub fn parse_definitions(&mut self) -> Result<Definitions, SchemaError> {
        let mut defs = Definitions::new();
        let Some(raw) = self.doc.get("definitions") else {
            return Ok(defs);
        };
        let raw = raw.as_object().ok_or_else(|| SchemaError::InvalidSchema {
            message: format!("definitions must be an object, got {}", json_type_name(raw)),
        })?;

        for (name, value) in raw {
            let path = format!("/definitions/{}", name.replace('~', "~0").replace('/', "~1"));
            let mut node = self.parse(value, &path)?;
            if node.is_object() && node.record_name.is_none() {
                node.record_name = Some(name.clone());
            }
            defs.insert(name.clone(), node);
        }
        Ok(defs)
    }

    /// Parse one schema object found at `path`.
    pub fn parse(&mut self, value: &Value, path: &str) -> Result<SchemaNode, SchemaError> {
        let Some(map) = value.as_object() else {
            return Err(SchemaError::InvalidSchema {
                message: format!("schema at {path} must be an object, got {}", json_type_name(value)),
            });
        };

        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            return Ok(SchemaNode {
                reference: Some(SchemaRef::parse(reference, path)?),
                path: path.to_string(),
                ..SchemaNode::default()
            });
        }

        if map.contains_key("allOf") {
            let merged = flatten_all_of(value, self.doc, path, &mut HashSet::new())?;
            return self.parse(&merged, path);
        }

        let kind = parse_kind(map, path)?;
        let mut node = SchemaNode {
            kind,
            format: map.get("format").and_then(Value::as_str).map(String::from),
            default: map.get("default").cloned(),
            nullable: map.get("x-nullable").and_then(Value::as_bool).unwrap_or(false),
            path: path.to_string(),
            ..SchemaNode::default()
        };

        if let Some(items) = map.get("items") {
            node.items = Some(Box::new(self.parse(items, &format!("{path}/items"))?));
        }

        if let Some(props) = map.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                let prop_path = format!("{path}/properties/{name}");
                node.properties
                    .insert(name.clone(), self.parse(prop, &prop_path)?);
            }
        }

        if let Some(required) = map.get("required").and_then(Value::as_array) {
            node.required = required
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }

        node.additional_properties = match map.get("additionalProperties") {
            None | Some(Value::Bool(true)) => AdditionalProperties::Any,
            Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
            Some(schema) => AdditionalProperties::Schema(Box::new(
                self.parse(schema, &format!("{path}/additionalProperties"))?,
            )),
        };

        for key in CONSTRAINT_KEYWORDS {
            if let Some(v) = map.get(*key) {
                node.constraints.insert((*key).to_string(), v.clone());
            }
        }

        if let Some(model) = map.get("x-model").and_then(Value::as_str) {
            node.record_name = Some(model.to_string());
            if !path.starts_with("/definitions/") {
                self.models.insert(model.to_string(), node.clone());
            }
        }

        Ok(node)
    }

    /// Hand over the inline `x-model` schemas collected so far.
    pub fn finish(self) -> IndexMap<String, SchemaNode> {
        self.models
    }
}

fn parse_kind(map: &Map<String, Value>, path: &str) -> Result<Option<Kind>, SchemaError> {
    match map.get("type") {
        Some(Value::String(t)) => match t.as_str() {
            "array" => Ok(Some(Kind::Array)),
            "object" => Ok(Some(Kind::Object)),
            other => Primitive::parse(other)
                .map(|p| Some(Kind::Primitive(p)))
                .ok_or_else(|| SchemaError::UnknownType {
                    path: path.to_string(),
                    value: other.to_string(),
                }),
        },
        Some(other) => Err(SchemaError::UnknownType {
            path: path.to_string(),
            value: other.to_string(),
        }),
        None if map.contains_key("properties") || map.contains_key("additionalProperties") => {
            Ok(Some(Kind::Object))
        }
        None => Ok(None),
    }
}

/// Merge an `allOf` composition into a single raw object schema.
///
/// Properties from later branches override earlier ones; `required` lists are
/// unioned. Referenced branches are looked up in the document and flattened
/// recursively.
fn flatten_all_of(
    value: &Value,
    doc: &Value,
    path: &str,
    visiting: &mut HashSet<String>,
) -> Result<Value, SchemaError> {
    let Some(map) = value.as_object() else {
        return Ok(value.clone());
    };

    if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
        if !visiting.insert(reference.to_string()) {
            return Err(SchemaError::CircularRef {
                chain: visiting.iter().cloned().collect(),
            });
        }
        SchemaRef::parse(reference, path)?;
        let target = navigate_fragment(doc, reference).map_err(|_| SchemaError::UnresolvedRef {
            reference: reference.to_string(),
        })?;
        let flat = flatten_all_of(&target, doc, path, visiting)?;
        visiting.remove(reference);
        return Ok(flat);
    }

    let mut merged = map.clone();
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    if let Some(branches) = map.get("allOf").and_then(Value::as_array) {
        for (i, branch) in branches.iter().enumerate() {
            let flat = flatten_all_of(branch, doc, &format!("{path}/allOf/{i}"), visiting)?;
            absorb(&flat, &mut properties, &mut required);
        }
    }
    absorb(value, &mut properties, &mut required);

    merged.remove("allOf");
    merged
        .entry("type".to_string())
        .or_insert_with(|| Value::String("object".to_string()));
    merged.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        merged.insert("required".to_string(), Value::Array(required));
    }
    Ok(Value::Object(merged))
}

fn absorb(schema: &Value, properties: &mut Map<String, Value>, required: &mut Vec<Value>) {
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (k, v) in props {
            properties.insert(k.clone(), v.clone());
        }
    }
    if let Some(req) = schema.get("required").and_then(Value::as_array) {
        for r in req {
            if !required.contains(r) {
                required.push(r.clone());
            }
        }
    }
}
