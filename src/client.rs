//! Client composition: a spec plus a transport.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::binder::{bind_all, ParamValue};
use crate::cache::SpecCache;
use crate::error::{BindingError, BoxError, Error};
use crate::future::{ResponseCallback, ResultFuture, Transport};
use crate::response::{Response, MSGPACK};
use crate::spec::{Spec, SpecConfig};
use crate::types::Arguments;

/// Per-call options.
#[derive(Default)]
pub struct RequestOptions {
    /// Extra headers, added after parameter binding.
    pub headers: IndexMap<String, String>,
    /// Transport timeout for the call.
    pub timeout: Option<Duration>,
    /// Ask for MessagePack responses.
    pub msgpack: bool,
    callbacks: Vec<ResponseCallback>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn msgpack(mut self, on: bool) -> Self {
        self.msgpack = on;
        self
    }

    /// Run `callback` once when the call completes, successfully or not.
    pub fn callback(
        mut self,
        callback: impl FnOnce(Option<&Response>) -> Result<(), BoxError> + Send + 'static,
    ) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("msgpack", &self.msgpack)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Calls operations of one spec through one transport.
#[derive(Clone)]
pub struct Client {
    spec: Arc<Spec>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(spec: Arc<Spec>, transport: Arc<dyn Transport>) -> Self {
        Self { spec, transport }
    }

    /// Load the spec at `source` and build a client for it.
    pub fn from_source(
        source: &str,
        config: SpecConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Error> {
        let spec = Spec::load(source, config)?;
        Ok(Self::new(Arc::new(spec), transport))
    }

    /// Like [`Client::from_source`], reusing a spec loaded within `ttl`.
    pub fn from_source_cached(
        source: &str,
        cache: &SpecCache,
        ttl: Duration,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Error> {
        let spec = cache.get_or_build(source, ttl, || Spec::load(source, SpecConfig::default()))?;
        Ok(Self::new(spec, transport))
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    /// Bind `args` for `operation_id` and hand the request to the transport.
    ///
    /// Binding errors are returned before the transport is involved.
    pub fn call(
        &self,
        operation_id: &str,
        args: Arguments,
        options: RequestOptions,
    ) -> Result<ResultFuture, Error> {
        let operation = self
            .spec
            .operation(operation_id)
            .cloned()
            .ok_or_else(|| BindingError::UnknownOperation {
                operation_id: operation_id.to_string(),
            })?;

        let mut request = bind_all(&self.spec, &operation, args)?;
        for (name, value) in options.headers {
            request.headers.insert(name, ParamValue::Single(value));
        }
        if options.msgpack {
            request.set_header("Accept", format!("{MSGPACK}, application/json;q=0.5"));
        }
        request.timeout = options.timeout;

        let inner = self.transport.request(request)?;
        Ok(ResultFuture::new(
            Arc::clone(&self.spec),
            operation,
            inner,
            options.callbacks,
        ))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("spec", &self.spec.title())
            .finish_non_exhaustive()
    }
}
