//! Spec document loading from various sources.
//!
//! Handles loading documents from files, strings, and HTTP URLs. Documents
//! may be JSON or YAML.

use std::path::Path;

use serde_json::Value;

use crate::error::SchemaError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for fetching spec documents (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a spec document from a file path.
///
/// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else goes
/// through [`parse_document`].
///
/// # Errors
///
/// Returns `SchemaError::FileNotFound` if the file doesn't exist,
/// or a parse error if the content is neither valid JSON nor YAML.
pub fn load_document(path: &Path) -> Result<Value, SchemaError> {
    if !path.exists() {
        return Err(SchemaError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        parse_yaml(&content)
    } else {
        parse_document(&content)
    }
}

/// Parse a document from a string.
///
/// Content that looks like JSON (starts with `{` or `[`) must be valid JSON;
/// anything else is parsed as YAML.
///
/// # Errors
///
/// Returns `SchemaError::InvalidJson` or `SchemaError::InvalidYaml`.
pub fn parse_document(content: &str) -> Result<Value, SchemaError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(content).map_err(|source| SchemaError::InvalidJson { source })
    } else {
        parse_yaml(content)
    }
}

fn parse_yaml(content: &str) -> Result<Value, SchemaError> {
    serde_yaml::from_str(content).map_err(|source| SchemaError::InvalidYaml { source })
}

/// Load a spec document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `SchemaError::NetworkError` if the request fails,
/// or a parse error if the body isn't a valid document.
#[cfg(feature = "remote")]
pub fn load_spec_url(url: &str) -> Result<Value, SchemaError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| SchemaError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|source| SchemaError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    // Check for HTTP errors before parsing
    let response = response
        .error_for_status()
        .map_err(|source| SchemaError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let body = response.text().map_err(|source| SchemaError::NetworkError {
        url: url.to_string(),
        source,
    })?;

    tracing::debug!(url, bytes = body.len(), "fetched spec document");
    if url.ends_with(".yaml") || url.ends_with(".yml") {
        parse_yaml(&body)
    } else {
        parse_document(&body)
    }
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Navigate a JSON Pointer fragment (e.g., "#/definitions/Pet").
///
/// Returns the value at the given JSON Pointer path within the document.
/// The fragment should start with '#'.
pub fn navigate_fragment(doc: &Value, fragment: &str) -> Result<Value, SchemaError> {
    // Remove leading # and split by /
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Ok(doc.clone());
    }

    let mut current = doc;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        current = current.get(&key).ok_or_else(|| SchemaError::UnresolvedRef {
            reference: fragment.to_string(),
        })?;
    }
    Ok(current.clone())
}

/// Load a spec document from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_document_auto(source: &str) -> Result<Value, SchemaError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_spec_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(SchemaError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_document_valid_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"swagger": "2.0"}}"#).unwrap();

        let doc = load_document(file.path()).unwrap();
        assert_eq!(doc["swagger"], "2.0");
    }

    #[test]
    fn load_document_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "swagger: '2.0'\ninfo:\n  title: Pets").unwrap();

        let doc = load_document(file.path()).unwrap();
        assert_eq!(doc["info"]["title"], "Pets");
    }

    #[test]
    fn load_document_file_not_found() {
        let result = load_document(Path::new("/nonexistent/path.json"));
        assert!(matches!(result, Err(SchemaError::FileNotFound { .. })));
    }

    #[test]
    fn load_document_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{not valid json").unwrap();

        let result = load_document(file.path());
        assert!(matches!(result, Err(SchemaError::InvalidJson { .. })));
    }

    #[test]
    fn parse_document_falls_back_to_yaml() {
        let doc = parse_document("swagger: '2.0'\npaths: {}\n").unwrap();
        assert_eq!(doc["swagger"], "2.0");
        assert!(doc["paths"].is_object());
    }

    #[test]
    fn parse_document_invalid_yaml() {
        let result = parse_document("swagger: [unclosed");
        assert!(matches!(result, Err(SchemaError::InvalidYaml { .. })));
    }

    #[test]
    fn is_url_detection() {
        assert!(is_url("https://example.com/swagger.json"));
        assert!(is_url("http://example.com/swagger.json"));
        assert!(!is_url("/path/to/swagger.json"));
        assert!(!is_url("swagger.yaml"));
    }

    #[test]
    fn navigate_fragment_finds_nested_values() {
        let doc = serde_json::json!({
            "parameters": { "a/b": { "name": "x" } }
        });
        let found = navigate_fragment(&doc, "#/parameters/a~1b").unwrap();
        assert_eq!(found["name"], "x");
        assert!(matches!(
            navigate_fragment(&doc, "#/parameters/missing"),
            Err(SchemaError::UnresolvedRef { .. })
        ));
    }

    #[test]
    fn load_document_auto_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"swagger": "2.0"}}"#).unwrap();

        let doc = load_document_auto(file.path().to_str().unwrap()).unwrap();
        assert_eq!(doc["swagger"], "2.0");
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn load_spec_url_valid() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/swagger.json")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(r#"{"swagger": "2.0"}"#)
                .create();

            let doc = load_spec_url(&format!("{}/swagger.json", server.url())).unwrap();
            assert_eq!(doc["swagger"], "2.0");
            mock.assert();
        }

        #[test]
        fn load_spec_url_404() {
            let mut server = mockito::Server::new();
            server.mock("GET", "/missing.json").with_status(404).create();

            let result = load_spec_url(&format!("{}/missing.json", server.url()));
            assert!(matches!(result, Err(SchemaError::NetworkError { .. })));
        }

        #[test]
        fn load_spec_url_invalid_host() {
            let result =
                load_spec_url("https://this-domain-does-not-exist-12345.invalid/swagger.json");
            assert!(matches!(result, Err(SchemaError::NetworkError { .. })));
        }
    }
}
