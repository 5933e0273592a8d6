//! Error types for spec loading, marshaling, parameter binding and transport.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::future::FutureState;
use crate::response::Response;
use crate::types::Native;

/// Boxed error used where a collaborator's own error type is carried along.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The schema tree or the document it came from is unusable.
///
/// Always fatal: a spec that produced one of these never reaches the engine.
#[derive(Debug, Error)]
pub enum SchemaError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("spec document failed structural validation with {} error(s)", errors.len())]
    InvalidDocument { errors: Vec<Violation> },

    // Schema tree errors (exit code 2)
    #[error("no type tag can be derived for schema at {path}")]
    NoTypeTag { path: String },

    #[error("array schema at {path} has no items")]
    MissingItems { path: String },

    #[error("unknown type \"{value}\" at {path}")]
    UnknownType { path: String, value: String },

    #[error("unsupported reference \"{reference}\" at {path}")]
    UnsupportedRef { path: String, reference: String },

    #[error("reference \"{reference}\" does not resolve")]
    UnresolvedRef { reference: String },

    #[error("circular reference: {}", chain.join(" -> "))]
    CircularRef { chain: Vec<String> },

    #[error("invalid parameter at {path}: {message}")]
    InvalidParameter { path: String, message: String },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
}

impl SchemaError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::FileNotFound { .. } | SchemaError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            SchemaError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// A value does not conform to the schema it is being converted against.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("required value was null at {path}")]
    RequiredNull { path: String },

    #[error("required field \"{field}\" is absent at {path}")]
    RequiredAbsent { path: String, field: String },

    #[error("expected {expected} at {path}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("unknown record type \"{name}\"")]
    UnknownRecord { name: String },

    #[error("record {record} has no field(s) named {}", keys.join(", "))]
    UnknownFields { record: String, keys: Vec<String> },

    #[error("cannot convert {format} value at {path}: {message}")]
    Format {
        path: String,
        format: String,
        message: String,
    },

    #[error("value at {path} failed validation with {} error(s)", errors.len())]
    Invalid {
        path: String,
        errors: Vec<Violation>,
    },

    #[error("no response declared for status {status} and no default")]
    NoResponseSpec { status: u16 },

    #[error("cannot decode {content_type} body: {message}")]
    Body {
        content_type: String,
        message: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl MappingError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            MappingError::Schema(e) => e.exit_code(),
            _ => 1,
        }
    }
}

/// Call-time arguments do not satisfy an operation's parameter contract.
///
/// Raised before anything is handed to a transport.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("unknown operation \"{operation_id}\"")]
    UnknownOperation { operation_id: String },

    #[error("missing required parameter \"{name}\"")]
    MissingRequired { name: String },

    #[error("unrecognized parameter(s): {}", names.join(", "))]
    Unrecognized { names: Vec<String> },

    #[error("parameter \"{name}\" in {location}: {message}")]
    WrongType {
        name: String,
        location: String,
        message: String,
    },

    #[error("file parameter \"{name}\" needs an operation consuming multipart/form-data")]
    FileWithoutMultipart { name: String },

    #[error("parameter \"{name}\": {source}")]
    Mapping {
        name: String,
        #[source]
        source: MappingError,
    },

    #[error("cannot serialize body: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

impl BindingError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// A transport-level timeout.
///
/// The transport's own error is kept as the source, so callers can match on
/// this type or downcast to the native one with [`TimeoutError::native`].
#[derive(Debug, Error)]
#[error("request timed out{}", after.map(|d| format!(" after {d:?}")).unwrap_or_default())]
pub struct TimeoutError {
    after: Option<Duration>,
    #[source]
    native: BoxError,
}

impl TimeoutError {
    /// Wrap a transport-native timeout error.
    pub fn new(native: impl Into<BoxError>, after: Option<Duration>) -> Self {
        Self {
            after,
            native: native.into(),
        }
    }

    /// The timeout that elapsed, when the transport knows it.
    pub fn after(&self) -> Option<Duration> {
        self.after
    }

    /// Downcast to the transport's native timeout type.
    pub fn native<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.native.downcast_ref::<E>()
    }
}

/// Failures reported by a transport while executing a request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("connection failed: {source}")]
    Connection {
        #[source]
        source: BoxError,
    },

    #[error("request was cancelled")]
    Cancelled,

    #[error("transport failure: {source}")]
    Other {
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        3
    }
}

/// A response status code classified as an error.
///
/// `payload` holds the unmarshaled body when the operation declares a
/// response for this status (or a default one) and the body conforms to it.
#[derive(Debug, Error)]
#[error("HTTP {status} from {operation}")]
pub struct HttpStatusError {
    pub operation: String,
    pub status: u16,
    pub payload: Option<Native>,
    pub response: Response,
}

/// Any failure surfaced by the client-facing API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    HttpStatus(#[from] HttpStatusError),

    #[error("response callback failed: {source}")]
    Callback {
        #[source]
        source: BoxError,
    },

    #[error("result future is {state}, not pending")]
    NotPending { state: FutureState },
}

impl Error {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Schema(e) => e.exit_code(),
            Error::Mapping(e) => e.exit_code(),
            Error::Binding(e) => e.exit_code(),
            Error::Transport(e) => e.exit_code(),
            Error::HttpStatus(_) | Error::Callback { .. } => 1,
            Error::NotPending { .. } => 2,
        }
    }

    /// The timeout behind this error, if it is one.
    pub fn timeout(&self) -> Option<&TimeoutError> {
        match self {
            Error::Transport(TransportError::Timeout(t)) => Some(t),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.timeout().is_some()
    }
}

/// Single validation failure with path context.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Violation {
    /// JSON Pointer (RFC 6901) to the invalid value.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
