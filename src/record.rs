//! Record types built from named object schemas.
//!
//! Every named object schema gets a [`RecordType`]: a static table of field
//! descriptors. Instances are built from a field map rather than through any
//! runtime type synthesis.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::descriptor::{self, TypeTag};
use crate::error::{MappingError, SchemaError};
use crate::format::FormatRegistry;
use crate::schema::{Definitions, Primitive, SchemaNode};
use crate::types::Native;
use crate::validator;

/// One field of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub tag: TypeTag,
    /// Value used when a field is not supplied at construction.
    pub initial: Native,
}

/// Generated type descriptor for one named object schema.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    definition: String,
    fields: Vec<FieldDescriptor>,
    required: IndexSet<String>,
}

impl RecordType {
    /// Build the record type for the definition named `definition`.
    ///
    /// `name` is the record name, which differs from the definition key only
    /// when the schema carries `x-model`.
    pub fn build(
        name: &str,
        definition: &str,
        defs: &Definitions,
        formats: &FormatRegistry,
    ) -> Result<Self, SchemaError> {
        let node = defs
            .get(definition)
            .ok_or_else(|| SchemaError::UnresolvedRef {
                reference: format!("{}{definition}", crate::schema::DEFINITIONS_PREFIX),
            })?;
        let schema = defs.follow(node)?;

        let mut fields = Vec::with_capacity(schema.properties.len());
        for (field, prop) in &schema.properties {
            let tag = descriptor::resolve(defs, prop)?;
            let default = match &prop.default {
                Some(d) => Some(d),
                None => defs.follow(prop)?.default.as_ref(),
            };
            let initial = match default {
                Some(wire) => default_to_native(&tag, wire, formats).map_err(|message| {
                    SchemaError::InvalidSchema {
                        message: format!("default of {name}.{field}: {message}"),
                    }
                })?,
                None => field_zero(&tag, defs.follow(prop)?, formats),
            };
            fields.push(FieldDescriptor {
                name: field.clone(),
                tag,
                initial,
            });
        }

        tracing::debug!(record = name, fields = fields.len(), "built record type");
        Ok(Self {
            name: name.to_string(),
            definition: definition.to_string(),
            fields,
            required: schema.required.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the backing schema in the definitions arena.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required(&self) -> &IndexSet<String> {
        &self.required
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.contains(field)
    }

    /// Create an instance from keyword-style field assignments.
    ///
    /// Fields not supplied get their default or their type's zero value.
    /// Names not declared by the schema are rejected all at once.
    pub fn instantiate(
        self: &Arc<Self>,
        values: impl IntoIterator<Item = (String, Native)>,
    ) -> Result<RecordInstance, MappingError> {
        let mut supplied: IndexMap<String, Native> = values.into_iter().collect();

        let unknown: Vec<String> = supplied
            .keys()
            .filter(|k| self.field(k).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(MappingError::UnknownFields {
                record: self.name.clone(),
                keys: unknown,
            });
        }

        let values = self
            .fields
            .iter()
            .map(|f| {
                let value = supplied
                    .shift_remove(&f.name)
                    .unwrap_or_else(|| f.initial.clone());
                (f.name.clone(), value)
            })
            .collect();

        Ok(RecordInstance {
            record: Arc::clone(self),
            values,
        })
    }
}

/// Zero value of a field type.
///
/// Strings are empty, numbers zero, arrays empty. Objects, records, files and
/// strings with a registered format (dates, bytes) start absent.
pub fn zero_value(tag: &TypeTag, formats: &FormatRegistry) -> Native {
    match tag {
        TypeTag::Primitive(p) => primitive_zero(*p),
        TypeTag::Formatted(Primitive::String, format) if formats.contains(format) => Native::Null,
        TypeTag::Formatted(p, _) => primitive_zero(*p),
        TypeTag::Array(_) => Native::Array(Vec::new()),
        TypeTag::Object | TypeTag::Record(_) => Native::Null,
    }
}

/// The zero value of a field, or absent when the field's own constraints
/// reject it (an `enum` without it, a `minimum` above it, a `pattern` or
/// `minLength` the empty string misses).
fn field_zero(tag: &TypeTag, node: &SchemaNode, formats: &FormatRegistry) -> Native {
    let zero = zero_value(tag, formats);
    if zero.is_null() || validator::validate(node, &zero.to_json(), "").is_ok() {
        zero
    } else {
        Native::Null
    }
}

fn primitive_zero(p: Primitive) -> Native {
    match p {
        Primitive::String => Native::String(String::new()),
        Primitive::Integer => Native::Int(0),
        Primitive::Number => Native::Float(0.0),
        Primitive::Boolean => Native::Bool(false),
        Primitive::File => Native::Null,
    }
}

fn default_to_native(
    tag: &TypeTag,
    wire: &serde_json::Value,
    formats: &FormatRegistry,
) -> Result<Native, String> {
    match tag {
        TypeTag::Formatted(_, format) => match formats.get(format) {
            Some(conv) => conv.to_native(wire),
            None => Ok(Native::from_json(wire)),
        },
        TypeTag::Primitive(Primitive::Number) => Ok(wire
            .as_f64()
            .map_or_else(|| Native::from_json(wire), Native::Float)),
        _ => Ok(Native::from_json(wire)),
    }
}

/// A value of a record type.
///
/// Owns its field values. Two instances are equal when they belong to the
/// same record type and every field compares equal.
#[derive(Debug, Clone)]
pub struct RecordInstance {
    record: Arc<RecordType>,
    values: IndexMap<String, Native>,
}

impl RecordInstance {
    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record
    }

    pub fn record_name(&self) -> &str {
        self.record.name()
    }

    pub fn get(&self, field: &str) -> Option<&Native> {
        self.values.get(field)
    }

    /// Assign a declared field.
    pub fn set(&mut self, field: &str, value: impl Into<Native>) -> Result<(), MappingError> {
        match self.values.get_mut(field) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(MappingError::UnknownFields {
                record: self.record.name().to_string(),
                keys: vec![field.to_string()],
            }),
        }
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Native)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_fields(self) -> IndexMap<String, Native> {
        self.values
    }
}

impl PartialEq for RecordInstance {
    fn eq(&self, other: &Self) -> bool {
        self.record.name() == other.record.name() && self.values == other.values
    }
}

/// All record types of one spec, keyed by record name.
#[derive(Debug, Clone, Default)]
pub struct RecordRegistry {
    types: HashMap<String, Arc<RecordType>>,
}

impl RecordRegistry {
    /// Build a record type for every named object schema in the arena.
    pub fn build(defs: &Definitions, formats: &FormatRegistry) -> Result<Self, SchemaError> {
        let mut types = HashMap::new();
        for (definition, node) in defs.iter() {
            if let Some(name) = &node.record_name {
                let record = RecordType::build(name, definition, defs, formats)?;
                types.insert(name.clone(), Arc::new(record));
            }
        }
        Ok(Self { types })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RecordType>> {
        self.types.get(name)
    }

    /// Look up a record type, failing with a mapping error when unknown.
    pub fn lookup(&self, name: &str) -> Result<&Arc<RecordType>, MappingError> {
        self.get(name).ok_or_else(|| MappingError::UnknownRecord {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
