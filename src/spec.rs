//! The loaded API description: definitions, record types and operations.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{MappingError, SchemaError};
use crate::format::FormatRegistry;
use crate::loader::{is_url, load_document_auto, navigate_fragment, parse_document};
use crate::param::{Param, ParamLocation};
use crate::record::RecordRegistry;
use crate::schema::{Definitions, SchemaNode, SchemaParser};
use crate::types::Native;
use crate::validator::validate_document;

/// Path item keys that describe operations.
pub const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch"];

/// Media type that permits file parameters.
pub const MULTIPART_FORM: &str = "multipart/form-data";

/// Options controlling how a spec is loaded and used.
#[derive(Debug, Clone)]
pub struct SpecConfig {
    /// Check the document against the Swagger 2.0 meta-schema before parsing.
    pub validate_spec: bool,
    /// Run the validator adapter on marshaled request values.
    pub validate_requests: bool,
    /// Run the validator adapter on wire values before unmarshaling.
    pub validate_responses: bool,
    /// Unmarshal named object schemas into record instances. When false
    /// they become plain mappings.
    pub use_records: bool,
    /// Give untagged objects a null entry for every declared property the
    /// wire value lacks.
    pub include_missing_properties: bool,
}

impl Default for SpecConfig {
    fn default() -> Self {
        Self {
            validate_spec: true,
            validate_requests: true,
            validate_responses: true,
            use_records: true,
            include_missing_properties: true,
        }
    }
}

impl SpecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_spec(mut self, on: bool) -> Self {
        self.validate_spec = on;
        self
    }

    pub fn validate_requests(mut self, on: bool) -> Self {
        self.validate_requests = on;
        self
    }

    pub fn validate_responses(mut self, on: bool) -> Self {
        self.validate_responses = on;
        self
    }

    pub fn use_records(mut self, on: bool) -> Self {
        self.use_records = on;
        self
    }

    pub fn include_missing_properties(mut self, on: bool) -> Self {
        self.include_missing_properties = on;
        self
    }
}

/// HTTP method of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
}

impl HttpMethod {
    /// Parse a path item key (lowercase).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "get" => Some(HttpMethod::Get),
            "put" => Some(HttpMethod::Put),
            "post" => Some(HttpMethod::Post),
            "delete" => Some(HttpMethod::Delete),
            "options" => Some(HttpMethod::Options),
            "head" => Some(HttpMethod::Head),
            "patch" => Some(HttpMethod::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared response of an operation.
#[derive(Debug, Clone, Default)]
pub struct ResponseSpec {
    pub description: String,
    /// `None` when the response has no body.
    pub schema: Option<SchemaNode>,
    pub headers: IndexMap<String, SchemaNode>,
}

/// One operation of the API. Read-only after load.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: String,
    pub method: HttpMethod,
    /// Path template relative to the base URL, e.g. `/pets/{petId}`.
    pub path: String,
    pub params: Vec<Param>,
    /// Keyed by status code text or `default`.
    pub responses: IndexMap<String, ResponseSpec>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

impl Operation {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The response declared for `status`, falling back to `default`.
    pub fn response_for(&self, status: u16) -> Option<&ResponseSpec> {
        self.responses
            .get(status.to_string().as_str())
            .or_else(|| self.responses.get("default"))
    }

    pub fn is_multipart(&self) -> bool {
        self.consumes.iter().any(|c| media_type_is(c, MULTIPART_FORM))
    }
}

/// Compare media types ignoring parameters and case.
pub fn media_type_is(value: &str, expected: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|m| m.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

/// A loaded spec. Shared read-only by every call made against it.
#[derive(Debug)]
pub struct Spec {
    config: SpecConfig,
    formats: FormatRegistry,
    definitions: Definitions,
    records: RecordRegistry,
    operations: IndexMap<String, Arc<Operation>>,
    base_url: String,
    title: String,
    version: String,
}

impl Spec {
    /// Build a spec from a parsed document.
    pub fn from_document(doc: &Value, config: SpecConfig) -> Result<Self, SchemaError> {
        Self::with_formats(doc, config, FormatRegistry::default())
    }

    /// Build a spec with a custom format table.
    pub fn with_formats(
        doc: &Value,
        config: SpecConfig,
        formats: FormatRegistry,
    ) -> Result<Self, SchemaError> {
        if config.validate_spec {
            validate_document(doc)?;
        }

        let mut parser = SchemaParser::new(doc);
        let mut definitions = parser.parse_definitions()?;
        let operations = parse_operations(doc, &mut parser, &definitions)?;

        for (name, node) in parser.finish() {
            if !definitions.contains(&name) {
                definitions.insert(name, node);
            }
        }
        for (_, node) in definitions.iter() {
            definitions.check_refs(node)?;
        }
        for op in operations.values() {
            for p in &op.params {
                definitions.check_refs(&p.schema)?;
            }
            for resp in op.responses.values() {
                if let Some(schema) = &resp.schema {
                    definitions.check_refs(schema)?;
                }
            }
        }

        let records = RecordRegistry::build(&definitions, &formats)?;

        let info = doc.get("info");
        let text = |key: &str| {
            info.and_then(|i| i.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let spec = Self {
            config,
            formats,
            records,
            operations,
            base_url: base_url(doc, None),
            title: text("title"),
            version: text("version"),
            definitions,
        };
        tracing::debug!(
            title = %spec.title,
            operations = spec.operations.len(),
            records = spec.records.len(),
            "loaded spec"
        );
        Ok(spec)
    }

    /// Parse a JSON or YAML document string.
    pub fn parse(content: &str, config: SpecConfig) -> Result<Self, SchemaError> {
        Self::from_document(&parse_document(content)?, config)
    }

    /// Load from a file path or URL.
    ///
    /// A spec fetched from a URL without `host` takes the host of that URL.
    pub fn load(source: &str, config: SpecConfig) -> Result<Self, SchemaError> {
        let doc = load_document_auto(source)?;
        let mut spec = Self::from_document(&doc, config)?;
        if is_url(source) {
            spec.base_url = base_url(&doc, url::Url::parse(source).ok().as_ref());
        }
        Ok(spec)
    }

    /// Replace the base URL derived from `schemes`, `host` and `basePath`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn config(&self) -> &SpecConfig {
        &self.config
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&SchemaNode> {
        self.definitions.get(name)
    }

    pub fn records(&self) -> &RecordRegistry {
        &self.records
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.operations.values()
    }

    pub fn operation(&self, id: &str) -> Option<&Arc<Operation>> {
        self.operations.get(id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Convert a wire value to a native value against `node`.
    pub fn unmarshal(&self, node: &SchemaNode, wire: &Value) -> Result<Native, MappingError> {
        crate::unmarshal::unmarshal(self, node, wire)
    }

    /// Convert a native value to a wire value against `node`.
    pub fn marshal(&self, node: &SchemaNode, native: &Native) -> Result<Value, MappingError> {
        crate::marshal::marshal(self, node, native)
    }
}

impl std::str::FromStr for Spec {
    type Err = SchemaError;

    /// Parse with the default configuration.
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Self::parse(content, SpecConfig::default())
    }
}

fn base_url(doc: &Value, source: Option<&url::Url>) -> String {
    let scheme = doc
        .get("schemes")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| source.map(|u| u.scheme().to_string()))
        .unwrap_or_else(|| "http".to_string());

    let host = doc
        .get("host")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| {
            source.and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{h}:{port}"),
                    None => h.to_string(),
                })
            })
        })
        .unwrap_or_else(|| "localhost".to_string());

    let base_path = doc.get("basePath").and_then(Value::as_str).unwrap_or("");
    format!("{scheme}://{host}{base_path}")
        .trim_end_matches('/')
        .to_string()
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Follow a `$ref` into a top-level document section, if present.
fn deref_section(
    raw: &Value,
    doc: &Value,
    section: &str,
    path: &str,
) -> Result<Value, SchemaError> {
    match raw.get("$ref").and_then(Value::as_str) {
        Some(reference) if reference.starts_with(&format!("#/{section}/")) => {
            navigate_fragment(doc, reference)
        }
        Some(reference) => Err(SchemaError::UnsupportedRef {
            path: path.to_string(),
            reference: reference.to_string(),
        }),
        None => Ok(raw.clone()),
    }
}

fn media_types(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|list| {
        list.iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    })
}

fn generated_id(method: &str, path: &str) -> String {
    let mut id = String::with_capacity(method.len() + path.len() + 1);
    id.push_str(method);
    id.push('_');
    let mut last_underscore = true;
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
            last_underscore = false;
        } else if !last_underscore {
            id.push('_');
            last_underscore = true;
        }
    }
    id.trim_end_matches('_').to_string()
}

fn parse_operations(
    doc: &Value,
    parser: &mut SchemaParser<'_>,
    defs: &Definitions,
) -> Result<IndexMap<String, Arc<Operation>>, SchemaError> {
    let mut operations = IndexMap::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Ok(operations);
    };
    let global_consumes = media_types(doc.get("consumes")).unwrap_or_default();
    let global_produces = media_types(doc.get("produces")).unwrap_or_default();

    for (template, item) in paths {
        if template.starts_with("x-") {
            continue;
        }
        let item_path = format!("/paths/{}", escape_pointer(template));

        let mut shared = Vec::new();
        if let Some(list) = item.get("parameters").and_then(Value::as_array) {
            for (i, raw) in list.iter().enumerate() {
                let p = format!("{item_path}/parameters/{i}");
                let resolved = deref_section(raw, doc, "parameters", &p)?;
                shared.push(Param::parse(&resolved, parser, defs, &p)?);
            }
        }

        for method_key in HTTP_METHODS {
            let Some(op) = item.get(*method_key) else {
                continue;
            };
            let Some(method) = HttpMethod::parse(method_key) else {
                continue;
            };
            let op_path = format!("{item_path}/{method_key}");

            let mut params: Vec<Param> = shared.clone();
            if let Some(list) = op.get("parameters").and_then(Value::as_array) {
                for (i, raw) in list.iter().enumerate() {
                    let p = format!("{op_path}/parameters/{i}");
                    let resolved = deref_section(raw, doc, "parameters", &p)?;
                    let param = Param::parse(&resolved, parser, defs, &p)?;
                    // Operation-level parameters override path-level ones.
                    params.retain(|existing| {
                        !(existing.name == param.name && existing.location == param.location)
                    });
                    params.push(param);
                }
            }
            if params
                .iter()
                .filter(|p| p.location == ParamLocation::Body)
                .count()
                > 1
            {
                return Err(SchemaError::InvalidParameter {
                    path: op_path,
                    message: "more than one body parameter".into(),
                });
            }

            let mut responses = IndexMap::new();
            if let Some(map) = op.get("responses").and_then(Value::as_object) {
                for (code, raw) in map {
                    if code.starts_with("x-") {
                        continue;
                    }
                    let p = format!("{op_path}/responses/{code}");
                    let resolved = deref_section(raw, doc, "responses", &p)?;
                    responses.insert(code.clone(), parse_response(&resolved, parser, &p)?);
                }
            }

            let id = op
                .get("operationId")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| generated_id(method_key, template));

            let operation = Operation {
                id: id.clone(),
                method,
                path: template.clone(),
                params,
                responses,
                consumes: media_types(op.get("consumes"))
                    .unwrap_or_else(|| global_consumes.clone()),
                produces: media_types(op.get("produces"))
                    .unwrap_or_else(|| global_produces.clone()),
                tags: op
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|t| t.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default(),
                summary: op.get("summary").and_then(Value::as_str).map(String::from),
            };

            if operations.contains_key(&id) {
                tracing::warn!(operation = %id, path = %op_path, "duplicate operationId ignored");
                continue;
            }
            operations.insert(id, Arc::new(operation));
        }
    }

    Ok(operations)
}

fn parse_response(
    raw: &Value,
    parser: &mut SchemaParser<'_>,
    path: &str,
) -> Result<ResponseSpec, SchemaError> {
    let schema = match raw.get("schema") {
        Some(s) => Some(parser.parse(s, &format!("{path}/schema"))?),
        None => None,
    };

    let mut headers = IndexMap::new();
    if let Some(map) = raw.get("headers").and_then(Value::as_object) {
        for (name, header) in map {
            let header_path = format!("{path}/headers/{}", escape_pointer(name));
            headers.insert(name.to_ascii_lowercase(), parser.parse(header, &header_path)?);
        }
    }

    Ok(ResponseSpec {
        description: raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        schema,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore() -> Value {
        json!({
            "swagger": "2.0",
            "info": { "title": "Petstore", "version": "1.0.0" },
            "host": "petstore.example.com",
            "basePath": "/v1/",
            "schemes": ["https"],
            "consumes": ["application/json"],
            "parameters": {
                "limitParam": { "name": "limit", "in": "query", "type": "integer", "default": 20 }
            },
            "responses": {
                "NotFound": { "description": "not found", "schema": { "$ref": "#/definitions/Error" } }
            },
            "paths": {
                "/pets/{petId}": {
                    "parameters": [
                        { "name": "petId", "in": "path", "type": "string" }
                    ],
                    "get": {
                        "operationId": "getPet",
                        "tags": ["pets"],
                        "parameters": [
                            { "name": "petId", "in": "path", "type": "integer", "format": "int64" }
                        ],
                        "responses": {
                            "200": {
                                "description": "ok",
                                "schema": { "$ref": "#/definitions/Pet" },
                                "headers": { "X-Rate-Limit": { "type": "integer" } }
                            },
                            "404": { "$ref": "#/responses/NotFound" }
                        }
                    }
                },
                "/pets": {
                    "get": {
                        "parameters": [{ "$ref": "#/parameters/limitParam" }],
                        "responses": { "default": { "description": "anything" } }
                    },
                    "post": {
                        "operationId": "uploadPhoto",
                        "consumes": ["multipart/form-data"],
                        "parameters": [
                            { "name": "photo", "in": "formData", "type": "file" }
                        ],
                        "responses": {
                            "201": {
                                "description": "created",
                                "schema": {
                                    "type": "object",
                                    "x-model": "Receipt",
                                    "properties": { "size": { "type": "integer" } }
                                }
                            }
                        }
                    }
                }
            },
            "definitions": {
                "Pet": {
                    "type": "object",
                    "required": ["id"],
                    "properties": { "id": { "type": "integer", "format": "int64" } }
                },
                "Error": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } }
                }
            }
        })
    }

    #[test]
    fn base_url_from_schemes_host_and_base_path() {
        let spec = Spec::from_document(&petstore(), SpecConfig::default()).unwrap();
        assert_eq!(spec.base_url(), "https://petstore.example.com/v1");
        assert_eq!(spec.title(), "Petstore");
        assert_eq!(spec.version(), "1.0.0");
    }

    #[test]
    fn base_url_falls_back_to_source_url() {
        let mut doc = petstore();
        let map = doc.as_object_mut().unwrap();
        map.remove("host");
        map.remove("schemes");
        let source = url::Url::parse("http://127.0.0.1:8080/api/swagger.json").unwrap();
        assert_eq!(base_url(&doc, Some(&source)), "http://127.0.0.1:8080/v1");
        assert_eq!(base_url(&doc, None), "http://localhost/v1");
    }

    #[test]
    fn operation_level_params_override_path_level() {
        let spec = Spec::from_document(&petstore(), SpecConfig::default()).unwrap();
        let op = spec.operation("getPet").unwrap();
        assert_eq!(op.params.len(), 1);
        assert_eq!(op.params[0].tag.to_string(), "integer:int64");
        assert_eq!(op.method, HttpMethod::Get);
        assert_eq!(op.tags, vec!["pets".to_string()]);
        assert_eq!(op.consumes, vec!["application/json".to_string()]);
    }

    #[test]
    fn shared_parameter_and_response_refs_resolve() {
        let spec = Spec::from_document(&petstore(), SpecConfig::default()).unwrap();
        let list = spec.operation("get_pets").unwrap();
        assert_eq!(list.params[0].name, "limit");
        assert_eq!(list.params[0].default, Some(json!(20)));

        let get = spec.operation("getPet").unwrap();
        assert_eq!(get.response_for(404).unwrap().description, "not found");
        assert!(get.response_for(200).unwrap().headers.contains_key("x-rate-limit"));
        assert!(get.response_for(500).is_none());
        assert_eq!(list.response_for(418).unwrap().description, "anything");
    }

    #[test]
    fn inline_x_model_becomes_a_record() {
        let spec = Spec::from_document(&petstore(), SpecConfig::default()).unwrap();
        assert!(spec.records().get("Receipt").is_some());
        assert!(spec.records().get("Pet").is_some());
        assert!(spec.operation("uploadPhoto").unwrap().is_multipart());
    }

    #[test]
    fn structural_validation_runs_first() {
        let mut doc = petstore();
        doc["swagger"] = json!("1.2");
        assert!(matches!(
            Spec::from_document(&doc, SpecConfig::default()),
            Err(SchemaError::InvalidDocument { .. })
        ));
        assert!(Spec::from_document(&doc, SpecConfig::default().validate_spec(false)).is_ok());
    }

    #[test]
    fn dangling_reference_fails_load() {
        let mut doc = petstore();
        doc["definitions"]["Pet"]["properties"]["owner"] = json!({ "$ref": "#/definitions/Owner" });
        assert!(matches!(
            Spec::from_document(&doc, SpecConfig::default()),
            Err(SchemaError::UnresolvedRef { .. })
        ));
    }

    #[test]
    fn generated_ids_are_identifier_like() {
        assert_eq!(generated_id("get", "/pets/{petId}/photos"), "get_pets_petId_photos");
        assert_eq!(generated_id("post", "/"), "post");
    }

    #[test]
    fn media_type_comparison_ignores_parameters() {
        assert!(media_type_is("Multipart/Form-Data; boundary=x", MULTIPART_FORM));
        assert!(!media_type_is("application/json", MULTIPART_FORM));
    }

    #[test]
    fn yaml_documents_load() {
        let yaml = r#"
swagger: "2.0"
info:
  title: Tiny
  version: "1"
paths:
  /ping:
    get:
      operationId: ping
      responses:
        "200":
          description: pong
"#;
        let spec = Spec::parse(yaml, SpecConfig::default()).unwrap();
        assert!(spec.operation("ping").is_some());

        let defaulted: Spec = yaml.parse().unwrap();
        assert_eq!(defaulted.title(), "Tiny");
    }
}
