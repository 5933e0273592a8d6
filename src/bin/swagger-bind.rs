//! Swagger Bind CLI
//!
//! Command-line interface for checking specs, decoding payloads through a
//! definition and calling operations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use swagger_bind::{
    load_document, Arguments, BlockingTransport, Client, Error, FilePart, MappingError, Native,
    Param, Primitive, RequestOptions, SchemaNode, Spec, SpecConfig, TypeTag,
};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "swagger-bind")]
#[command(about = "Check Swagger 2.0 specs, decode payloads and call operations")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a spec, validate it and list its operations and record types
    Check {
        /// Spec source: file path or URL (http:// or https://)
        spec: String,

        /// Skip structural validation against the Swagger 2.0 meta-schema
        #[arg(long)]
        no_validate: bool,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Unmarshal a payload through a definition and print it re-marshaled
    Decode {
        /// Spec source: file path or URL
        spec: String,

        /// Definition to decode against (e.g., Pet)
        #[arg(long, short)]
        definition: String,

        /// Payload file (JSON or YAML)
        payload: PathBuf,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Bind arguments for an operation, send it and print the decoded result
    Call {
        /// Spec source: file path or URL
        spec: String,

        /// Operation id (e.g., getPetById)
        operation: String,

        /// Argument as name=value; repeatable. File parameters take a path.
        #[arg(long = "arg", short = 'a', value_name = "NAME=VALUE")]
        args: Vec<String>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Override the base URL derived from the spec
        #[arg(long)]
        base_url: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn init_tracing(verbose: u8) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,swagger_bind=debug".to_string(),
            _ => "debug,swagger_bind=trace".to_string(),
        },
    };
    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Check {
            spec,
            no_validate,
            json,
        } => run_check(&spec, !no_validate, json),

        Commands::Decode {
            spec,
            definition,
            payload,
            pretty,
        } => run_decode(&spec, &definition, &payload, pretty),

        Commands::Call {
            spec,
            operation,
            args,
            timeout,
            base_url,
            pretty,
        } => run_call(CallArgs {
            spec,
            operation,
            args,
            timeout,
            base_url,
            pretty,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn load_spec(source: &str, config: SpecConfig) -> Result<Spec, u8> {
    Spec::load(source, config).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn run_check(source: &str, validate: bool, json_output: bool) -> Result<(), u8> {
    let spec = match Spec::load(source, SpecConfig::default().validate_spec(validate)) {
        Ok(spec) => spec,
        Err(e) => {
            if json_output {
                let output = serde_json::json!({ "valid": false, "error": e.to_string() });
                println!("{}", output);
            } else {
                eprintln!("Error: {}", e);
            }
            if let swagger_bind::SchemaError::InvalidDocument { errors } = &e {
                if !json_output {
                    for error in errors {
                        eprintln!("  {}", error);
                    }
                }
            }
            return Err(e.exit_code() as u8);
        }
    };

    let mut records: Vec<&str> = spec.records().names().collect();
    records.sort_unstable();

    if json_output {
        let operations: Vec<Value> = spec
            .operations()
            .map(|op| {
                serde_json::json!({
                    "id": op.id,
                    "method": op.method.as_str(),
                    "path": op.path,
                })
            })
            .collect();
        let output = serde_json::json!({
            "valid": true,
            "title": spec.title(),
            "version": spec.version(),
            "base_url": spec.base_url(),
            "operations": operations,
            "records": records,
        });
        println!("{}", output);
    } else {
        println!("Valid: {} {}", spec.title(), spec.version());
        println!("Base URL: {}", spec.base_url());
        println!("Operations:");
        for op in spec.operations() {
            println!("  {:<24} {:<7} {}", op.id, op.method, op.path);
        }
        println!("Records: {}", records.join(", "));
    }
    Ok(())
}

fn run_decode(source: &str, definition: &str, payload_path: &Path, pretty: bool) -> Result<(), u8> {
    let spec = load_spec(source, SpecConfig::default())?;
    if spec.definition(definition).is_none() {
        eprintln!("Error: unknown definition \"{}\"", definition);
        return Err(2);
    }

    let payload = load_document(payload_path).map_err(|e| {
        eprintln!("Error loading payload: {}", e);
        e.exit_code() as u8
    })?;

    let node = SchemaNode::reference(definition);
    let wire = spec
        .unmarshal(&node, &payload)
        .and_then(|native| spec.marshal(&node, &native))
        .map_err(|e| {
            report_mapping_error(&e);
            e.exit_code() as u8
        })?;

    print_json(&wire, pretty)
}

struct CallArgs {
    spec: String,
    operation: String,
    args: Vec<String>,
    timeout: Option<f64>,
    base_url: Option<String>,
    pretty: bool,
}

fn run_call(call: CallArgs) -> Result<(), u8> {
    let mut spec = load_spec(&call.spec, SpecConfig::default())?;
    if let Some(base_url) = call.base_url {
        spec = spec.with_base_url(base_url);
    }
    let spec = Arc::new(spec);

    let Some(operation) = spec.operation(&call.operation).cloned() else {
        eprintln!("Error: unknown operation \"{}\"", call.operation);
        return Err(2);
    };

    let mut args = Arguments::new();
    for raw in &call.args {
        let Some((name, text)) = raw.split_once('=') else {
            eprintln!("Error: argument \"{}\" is not NAME=VALUE", raw);
            return Err(2);
        };
        let value = match operation.param(name) {
            Some(param) => parse_arg(&spec, param, text)?,
            None => Native::from(text),
        };
        args.insert(name.to_string(), value);
    }

    let timeout = match call.timeout {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => {
            eprintln!("Error: invalid timeout {}", secs);
            return Err(2);
        }
        None => None,
    };
    let mut options = RequestOptions::new();
    if let Some(t) = timeout {
        options = options.timeout(t);
    }

    let client = Client::new(Arc::clone(&spec), Arc::new(BlockingTransport::new()));
    let outcome = client
        .call(&call.operation, args, options)
        .and_then(|future| future.result(timeout));

    match outcome {
        Ok(response) => {
            eprintln!("HTTP {}", response.status);
            print_json(&response.result.to_json(), call.pretty)
        }
        Err(Error::HttpStatus(e)) => {
            eprintln!("Error: {}", e);
            if let Some(payload) = &e.payload {
                eprintln!("{}", payload.to_json());
            }
            Err(1)
        }
        Err(Error::Mapping(e)) => {
            report_mapping_error(&e);
            Err(e.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(e.exit_code() as u8)
        }
    }
}

/// Turn command-line text into a native value for `param`.
fn parse_arg(spec: &Spec, param: &Param, text: &str) -> Result<Native, u8> {
    if param.tag.is_file() {
        let path = Path::new(text);
        let bytes = std::fs::read(path).map_err(|e| {
            eprintln!("Error reading {}: {}", path.display(), e);
            3u8
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| text.to_string());
        return Ok(Native::File(FilePart::new(filename, bytes)));
    }

    let wire = match &param.tag {
        TypeTag::Array(items) => {
            Value::Array(text.split(',').map(|item| scalar_wire(items, item)).collect())
        }
        tag => scalar_wire(tag, text),
    };
    spec.unmarshal(&param.schema, &wire).map_err(|e| {
        eprintln!("Error: argument \"{}\": {}", param.name, e);
        2u8
    })
}

fn scalar_wire(tag: &TypeTag, text: &str) -> Value {
    match tag {
        TypeTag::Primitive(Primitive::String) | TypeTag::Formatted(Primitive::String, _) => {
            Value::String(text.to_string())
        }
        _ => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

fn report_mapping_error(e: &MappingError) {
    eprintln!("Error: {}", e);
    if let MappingError::Invalid { errors, .. } = e {
        for error in errors {
            eprintln!("  {}", error);
        }
    }
}

fn print_json(value: &Value, pretty: bool) -> Result<(), u8> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", text);
    Ok(())
}
