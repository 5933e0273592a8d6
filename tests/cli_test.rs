//! CLI integration tests for the swagger-bind binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("swagger-bind"))
}

// Helper to create a temp spec or payload file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const PETSTORE: &str = r##"{
    "swagger": "2.0",
    "info": { "title": "Petstore", "version": "1.0.0" },
    "host": "petstore.example.com",
    "basePath": "/v1",
    "paths": {
        "/pets/{petId}": {
            "get": {
                "operationId": "getPet",
                "parameters": [
                    { "name": "petId", "in": "path", "required": true, "type": "integer" }
                ],
                "responses": {
                    "200": { "description": "pet", "schema": { "$ref": "#/definitions/Pet" } }
                }
            }
        }
    },
    "definitions": {
        "Pet": {
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": { "type": "integer", "format": "int64" },
                "name": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        }
    }
}"##;

// === Check Command Tests ===

mod check_command {
    use super::*;

    #[test]
    fn valid_spec() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);

        cmd()
            .args(["check", spec.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid: Petstore 1.0.0"))
            .stdout(predicate::str::contains("Base URL: http://petstore.example.com/v1"))
            .stdout(predicate::str::contains("getPet"))
            .stdout(predicate::str::contains("Records: Pet"));
    }

    #[test]
    fn yaml_spec() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(
            &dir,
            "petstore.yaml",
            r#"
swagger: "2.0"
info:
  title: Yaml Store
  version: "2.1"
paths: {}
definitions:
  Tag:
    type: object
    properties:
      name:
        type: string
"#,
        );

        cmd()
            .args(["check", spec.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid: Yaml Store 2.1"))
            .stdout(predicate::str::contains("Records: Tag"));
    }

    #[test]
    fn json_output() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);

        cmd()
            .args(["check", spec.to_str().unwrap(), "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""valid":true"#))
            .stdout(predicate::str::contains(r#""id":"getPet""#))
            .stdout(predicate::str::contains(r#""records":["Pet"]"#));
    }

    #[test]
    fn invalid_document() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "bad.json", r#"{"swagger": "2.0", "paths": {}}"#);

        cmd()
            .args(["check", spec.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Error"));
    }

    #[test]
    fn invalid_document_json_output() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "bad.json", r#"{"swagger": "2.0", "paths": {}}"#);

        cmd()
            .args(["check", spec.to_str().unwrap(), "--json"])
            .assert()
            .code(2)
            .stdout(predicate::str::contains(r#""valid":false"#));
    }
}

// === Decode Command Tests ===

mod decode_command {
    use super::*;

    #[test]
    fn fills_missing_optional_fields() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);
        let payload = write_temp_file(&dir, "pet.json", r#"{"id": 1, "name": "Fido"}"#);

        cmd()
            .args([
                "decode",
                spec.to_str().unwrap(),
                "--definition",
                "Pet",
                payload.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"id":1,"name":"Fido","tags":[]}"#));
    }

    #[test]
    fn missing_required_field() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);
        let payload = write_temp_file(&dir, "pet.json", r#"{"id": 1}"#);

        cmd()
            .args([
                "decode",
                spec.to_str().unwrap(),
                "-d",
                "Pet",
                payload.to_str().unwrap(),
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("name"));
    }

    #[test]
    fn unknown_definition() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);
        let payload = write_temp_file(&dir, "pet.json", "{}");

        cmd()
            .args([
                "decode",
                spec.to_str().unwrap(),
                "-d",
                "Cat",
                payload.to_str().unwrap(),
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unknown definition"));
    }
}

// === Call Command Tests ===

mod call_command {
    use super::*;

    #[test]
    fn calls_operation() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/pets/7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7, "name": "Rex"}"#)
            .create();

        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);

        cmd()
            .args([
                "call",
                spec.to_str().unwrap(),
                "getPet",
                "--arg",
                "petId=7",
                "--base-url",
                &server.url(),
            ])
            .assert()
            .success()
            .stderr(predicate::str::contains("HTTP 200"))
            .stdout(predicate::str::contains(r#""name":"Rex""#));

        mock.assert();
    }

    #[test]
    fn unknown_operation() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);

        cmd()
            .args(["call", spec.to_str().unwrap(), "deletePet"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unknown operation"));
    }

    #[test]
    fn malformed_argument() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);

        cmd()
            .args(["call", spec.to_str().unwrap(), "getPet", "-a", "petId"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("NAME=VALUE"));
    }

    #[test]
    fn missing_required_argument() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "petstore.json", PETSTORE);

        cmd()
            .args(["call", spec.to_str().unwrap(), "getPet"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("petId"));
    }
}

// === Error Handling Tests ===

mod error_handling {
    use super::*;

    #[test]
    fn missing_spec_file() {
        cmd()
            .args(["check", "/nonexistent/swagger.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn invalid_json() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "broken.json", "{ not json");

        cmd()
            .args(["check", spec.to_str().unwrap()])
            .assert()
            .code(2);
    }

    #[test]
    fn help_and_version() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("check"))
            .stdout(predicate::str::contains("decode"))
            .stdout(predicate::str::contains("call"));

        cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("swagger-bind"));
    }
}
