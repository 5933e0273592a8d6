//! HTTP transports backed by `reqwest`.
//!
//! Both transports start the call as soon as it is requested and report the
//! outcome over a channel. [`BlockingTransport`] runs the blocking client on a
//! worker thread; [`ReactorTransport`] spawns the call on a background tokio
//! runtime. Waiting, timeouts, cancellation and error mapping are shared, so
//! callers cannot tell the two apart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::binder::{ParamValue, RequestDescription};
use crate::error::{BoxError, TimeoutError, TransportError};
use crate::future::{Transport, TransportFuture};
use crate::response::Response;
use crate::spec::HttpMethod;
use crate::types::FilePart;

fn method(m: HttpMethod) -> reqwest::Method {
    match m {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Options => reqwest::Method::OPTIONS,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

/// Query pairs with `multi` values repeated per item.
fn pairs(values: &IndexMap<String, ParamValue>) -> Vec<(String, String)> {
    values
        .iter()
        .flat_map(|(k, v)| v.values().into_iter().map(move |item| (k.clone(), item.to_string())))
        .collect()
}

fn header_map(request: &RequestDescription) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(other)?;
        for item in value.values() {
            headers.append(name.clone(), HeaderValue::from_str(item).map_err(other)?);
        }
    }
    Ok(headers)
}

fn other(e: impl Into<BoxError>) -> TransportError {
    TransportError::Other { source: e.into() }
}

/// Map a `reqwest` failure, keeping timeouts catchable as both types.
fn map_reqwest(e: reqwest::Error, timeout: Option<Duration>) -> TransportError {
    if e.is_timeout() {
        TimeoutError::new(e, timeout).into()
    } else if e.is_connect() {
        TransportError::Connection { source: e.into() }
    } else {
        other(e)
    }
}

fn collect_headers(map: &HeaderMap) -> IndexMap<String, String> {
    let mut headers = IndexMap::new();
    for (name, value) in map {
        if let Ok(text) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(text);
                })
                .or_insert_with(|| text.to_string());
        }
    }
    headers
}

fn adapt(status: u16, headers: &HeaderMap, body: Vec<u8>) -> Response {
    collect_headers(headers)
        .into_iter()
        .fold(Response::new(status), |resp, (k, v)| resp.with_header(&k, v))
        .with_body(body)
}

/// What goes in the request body.
enum Payload {
    Empty,
    Body(String),
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<(String, FilePart)>,
    },
}

/// A request description checked and flattened for `reqwest`.
struct Prepared {
    method: reqwest::Method,
    url: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    timeout: Option<Duration>,
    payload: Payload,
}

fn prepare(request: RequestDescription) -> Result<Prepared, TransportError> {
    let headers = header_map(&request)?;
    let payload = if !request.files.is_empty() {
        Payload::Multipart {
            fields: pairs(&request.form),
            files: request.files,
        }
    } else if !request.form.is_empty() {
        Payload::Form(pairs(&request.form))
    } else if let Some(body) = request.body {
        Payload::Body(body)
    } else {
        Payload::Empty
    };
    Ok(Prepared {
        method: method(request.method),
        query: pairs(&request.query),
        url: request.url,
        headers,
        timeout: request.timeout,
        payload,
    })
}

type Outcome = Result<Response, TransportError>;

/// Waits on the channel a worker reports its outcome on.
struct ChannelFuture {
    rx: Mutex<Receiver<Outcome>>,
    cancelled: AtomicBool,
    task: Option<tokio::task::JoinHandle<()>>,
    // Keeps the reactor alive until this call settles, even if the transport
    // that spawned it is gone.
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl ChannelFuture {
    fn new(rx: Receiver<Outcome>) -> Self {
        Self {
            rx: Mutex::new(rx),
            cancelled: AtomicBool::new(false),
            task: None,
            _runtime: None,
        }
    }

    fn on_runtime(
        mut self,
        task: tokio::task::JoinHandle<()>,
        runtime: Arc<tokio::runtime::Runtime>,
    ) -> Self {
        self.task = Some(task);
        self._runtime = Some(runtime);
        self
    }

    fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl TransportFuture for ChannelFuture {
    fn wait(&self, timeout: Option<Duration>) -> Result<Response, TransportError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(TransportError::Cancelled);
        }
        let rx = self.rx.lock().unwrap_or_else(|p| p.into_inner());
        let received = match timeout {
            Some(t) => rx.recv_timeout(t),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(outcome) => outcome,
            Err(e @ RecvTimeoutError::Timeout) => {
                self.abort();
                Err(TimeoutError::new(e, timeout).into())
            }
            Err(RecvTimeoutError::Disconnected) if self.cancelled.load(Ordering::SeqCst) => {
                Err(TransportError::Cancelled)
            }
            Err(RecvTimeoutError::Disconnected) => Err(other("request worker stopped without reporting")),
        }
    }

    /// A blocking worker cannot be interrupted; its late outcome is discarded.
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort();
    }
}

// ---------------------------------------------------------------------------
// Blocking model
// ---------------------------------------------------------------------------

/// Transport that performs each call with the blocking client on its own
/// worker thread.
#[derive(Debug, Clone, Default)]
pub struct BlockingTransport {
    client: reqwest::blocking::Client,
}

impl BlockingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }

    fn build(&self, prepared: Prepared) -> Result<reqwest::blocking::RequestBuilder, TransportError> {
        let mut builder = self
            .client
            .request(prepared.method, &prepared.url)
            .query(&prepared.query)
            .headers(prepared.headers);
        if let Some(t) = prepared.timeout {
            builder = builder.timeout(t);
        }

        Ok(match prepared.payload {
            Payload::Empty => builder,
            Payload::Body(body) => builder.body(body),
            Payload::Form(fields) => builder.form(&fields),
            Payload::Multipart { fields, files } => {
                let mut form = reqwest::blocking::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for (name, file) in files {
                    let mut part = reqwest::blocking::multipart::Part::bytes(file.bytes)
                        .file_name(file.filename);
                    if let Some(ct) = &file.content_type {
                        part = part.mime_str(ct).map_err(other)?;
                    }
                    form = form.part(name, part);
                }
                builder.multipart(form)
            }
        })
    }
}

fn send_blocking(builder: reqwest::blocking::RequestBuilder, timeout: Option<Duration>) -> Outcome {
    let response = builder.send().map_err(|e| map_reqwest(e, timeout))?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().map_err(|e| map_reqwest(e, timeout))?;
    Ok(adapt(status, &headers, body.to_vec()))
}

impl Transport for BlockingTransport {
    fn request(&self, request: RequestDescription) -> Result<Box<dyn TransportFuture>, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "sending blocking request");
        let prepared = prepare(request)?;
        let timeout = prepared.timeout;
        let builder = self.build(prepared)?;
        let (tx, rx) = mpsc::sync_channel::<Outcome>(1);

        std::thread::Builder::new()
            .name("swagger-bind-blocking".to_string())
            .spawn(move || {
                // The waiter may have gone away; nothing to report to then.
                let _ = tx.send(send_blocking(builder, timeout));
            })
            .map_err(other)?;

        Ok(Box::new(ChannelFuture::new(rx)))
    }
}

// ---------------------------------------------------------------------------
// Reactor model
// ---------------------------------------------------------------------------

/// Transport that issues calls on a background tokio runtime.
#[derive(Clone)]
pub struct ReactorTransport {
    runtime: Arc<tokio::runtime::Runtime>,
    client: reqwest::Client,
}

impl ReactorTransport {
    pub fn new() -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("swagger-bind-reactor")
            .enable_all()
            .build()
            .map_err(other)?;
        Ok(Self {
            runtime: Arc::new(runtime),
            client: reqwest::Client::new(),
        })
    }

    fn build(&self, prepared: Prepared) -> Result<reqwest::RequestBuilder, TransportError> {
        let mut builder = self
            .client
            .request(prepared.method, &prepared.url)
            .query(&prepared.query)
            .headers(prepared.headers);
        if let Some(t) = prepared.timeout {
            builder = builder.timeout(t);
        }

        Ok(match prepared.payload {
            Payload::Empty => builder,
            Payload::Body(body) => builder.body(body),
            Payload::Form(fields) => builder.form(&fields),
            Payload::Multipart { fields, files } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for (name, file) in files {
                    let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.filename);
                    if let Some(ct) = &file.content_type {
                        part = part.mime_str(ct).map_err(other)?;
                    }
                    form = form.part(name, part);
                }
                builder.multipart(form)
            }
        })
    }
}

impl std::fmt::Debug for ReactorTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorTransport").finish_non_exhaustive()
    }
}

impl Transport for ReactorTransport {
    fn request(&self, request: RequestDescription) -> Result<Box<dyn TransportFuture>, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "spawning request");
        let prepared = prepare(request)?;
        let timeout = prepared.timeout;
        let builder = self.build(prepared)?;
        let (tx, rx) = mpsc::sync_channel::<Outcome>(1);

        let task = self.runtime.spawn(async move {
            let outcome = async {
                let response = builder.send().await.map_err(|e| map_reqwest(e, timeout))?;
                let status = response.status().as_u16();
                let headers = response.headers().clone();
                let body = response.bytes().await.map_err(|e| map_reqwest(e, timeout))?;
                Ok::<_, TransportError>(adapt(status, &headers, body.to_vec()))
            }
            .await;
            let _ = tx.send(outcome);
        });

        Ok(Box::new(
            ChannelFuture::new(rx).on_runtime(task, Arc::clone(&self.runtime)),
        ))
    }
}
