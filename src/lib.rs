//! Swagger Bind
//!
//! Schema-driven marshaling, record types and parameter binding for
//! Swagger 2.0 APIs.
//!
//! A [`Spec`] is loaded once from a JSON or YAML document. Every named object
//! schema becomes a [`RecordType`]; wire values are converted to [`Native`]
//! values (and back) by walking the schema tree; call arguments are bound
//! into a [`RequestDescription`] that a [`Transport`] executes. The result
//! comes back through a [`ResultFuture`].
//!
//! # Example
//!
//! ```
//! use swagger_bind::{Native, SchemaNode, Spec, SpecConfig};
//! use serde_json::json;
//!
//! let doc = json!({
//!     "swagger": "2.0",
//!     "info": { "title": "Petstore", "version": "1.0" },
//!     "paths": {},
//!     "definitions": {
//!         "Pet": {
//!             "type": "object",
//!             "required": ["id", "name"],
//!             "properties": {
//!                 "id": { "type": "integer", "format": "int64" },
//!                 "name": { "type": "string" },
//!                 "tags": { "type": "array", "items": { "type": "string" } }
//!             }
//!         }
//!     }
//! });
//!
//! let spec = Spec::from_document(&doc, SpecConfig::default()).unwrap();
//! let pet_schema = SchemaNode::reference("Pet");
//!
//! let pet = spec.unmarshal(&pet_schema, &json!({ "id": 1, "name": "Fido" })).unwrap();
//! assert_eq!(pet.as_record().unwrap().record_name(), "Pet");
//! // Missing optional arrays start out empty.
//! assert_eq!(pet.get("tags"), Some(&Native::Array(vec![])));
//!
//! let wire = spec.marshal(&pet_schema, &pet).unwrap();
//! assert_eq!(wire, json!({ "id": 1, "name": "Fido", "tags": [] }));
//! ```
//!
//! # Type Tags
//!
//! | Schema | Tag |
//! |--------|-----|
//! | `{"type": "string", "format": "date"}` | `string:date` |
//! | `{"type": "array", "items": {"type": "integer"}}` | `array:integer` |
//! | `{"$ref": "#/definitions/Pet"}` | `record:Pet` |
//! | `{"type": "object"}` | `object` |
//!
//! # Status Classification
//!
//! | Status | Declared response | Outcome |
//! |--------|-------------------|---------|
//! | 5xx | any | [`HttpStatusError`] |
//! | other | matching or `default` | success, body unmarshaled |
//! | other | none | [`MappingError::NoResponseSpec`] |

mod binder;
mod cache;
mod client;
mod descriptor;
mod error;
mod format;
mod future;
mod loader;
mod marshal;
mod param;
mod record;
mod response;
mod schema;
mod spec;
#[cfg(feature = "remote")]
mod transport;
mod types;
mod unmarshal;
mod validator;

pub use binder::{bind, bind_all, ParamValue, RequestDescription};
pub use cache::{Clock, ManualClock, SpecCache, SystemClock, TtlCache};
pub use client::{Client, RequestOptions};
pub use descriptor::{resolve, TypeTag};
pub use error::{
    BindingError, BoxError, Error, HttpStatusError, MappingError, SchemaError, TimeoutError,
    TransportError, Violation,
};
pub use format::{
    ByteFormat, DateFormat, DateTimeFormat, FormatConverter, FormatRegistry, Int32Format,
    Int64Format,
};
pub use future::{
    FutureState, OperationResponse, ResponseCallback, ResultFuture, Transport, TransportFuture,
};
pub use loader::{is_url, load_document, load_document_auto, navigate_fragment, parse_document};
pub use marshal::marshal;
pub use param::{CollectionFormat, Param, ParamLocation};
pub use record::{zero_value, FieldDescriptor, RecordInstance, RecordRegistry, RecordType};
pub use response::{decode_body, IncomingResponse, Response, MSGPACK};
pub use schema::{
    AdditionalProperties, Definitions, Kind, Primitive, SchemaNode, SchemaParser, SchemaRef,
};
pub use spec::{HttpMethod, Operation, ResponseSpec, Spec, SpecConfig};
pub use types::{Arguments, FilePart, Native};
pub use unmarshal::unmarshal;
pub use validator::{validate, validate_against_schema, validate_document};

#[cfg(feature = "remote")]
pub use loader::load_spec_url;
#[cfg(feature = "remote")]
pub use transport::{BlockingTransport, ReactorTransport};
