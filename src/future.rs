//! One-shot completion handle for an in-flight call.
//!
//! A [`ResultFuture`] wraps exactly one transport future. Waiting on it
//! classifies the response status, unmarshals the body through the
//! operation's response schema and runs the registered callbacks exactly
//! once, whatever the outcome.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexMap;

use crate::binder::RequestDescription;
use crate::error::{BoxError, Error, HttpStatusError, MappingError, TransportError};
use crate::response::{decode_body, header_wire_value, IncomingResponse, Response};
use crate::spec::{Operation, Spec};
use crate::types::Native;

/// Executes requests. Implemented by every transport.
pub trait Transport: Send + Sync {
    /// Start (or prepare) the call described by `request`.
    fn request(&self, request: RequestDescription) -> Result<Box<dyn TransportFuture>, TransportError>;
}

/// A transport's handle on one in-flight request.
pub trait TransportFuture: Send + Sync {
    /// Block until the response is available or `timeout` elapses.
    fn wait(&self, timeout: Option<Duration>) -> Result<Response, TransportError>;

    /// Ask the transport to stop. Transports that cannot cancel ignore it.
    fn cancel(&self) {}
}

/// Callback run once a call completes.
///
/// Receives the raw response when one arrived, `None` when the transport
/// failed or the call was cancelled.
pub type ResponseCallback = Box<dyn FnOnce(Option<&Response>) -> Result<(), BoxError> + Send>;

/// Lifecycle of a [`ResultFuture`]. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Resolved,
    Failed,
    Cancelled,
}

impl fmt::Display for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FutureState::Pending => "pending",
            FutureState::Resolved => "resolved",
            FutureState::Failed => "failed",
            FutureState::Cancelled => "cancelled",
        })
    }
}

/// A successfully classified and unmarshaled response.
#[derive(Debug, Clone)]
pub struct OperationResponse {
    pub status: u16,
    /// Body unmarshaled through the matching response schema.
    pub result: Native,
    /// Declared response headers that were present, by lowercase name.
    pub headers: IndexMap<String, Native>,
    pub response: Response,
}

pub struct ResultFuture {
    spec: Arc<Spec>,
    operation: Arc<Operation>,
    inner: Box<dyn TransportFuture>,
    state: Mutex<FutureState>,
    callbacks: Mutex<Vec<ResponseCallback>>,
}

impl ResultFuture {
    pub fn new(
        spec: Arc<Spec>,
        operation: Arc<Operation>,
        inner: Box<dyn TransportFuture>,
        callbacks: Vec<ResponseCallback>,
    ) -> Self {
        Self {
            spec,
            operation,
            inner,
            state: Mutex::new(FutureState::Pending),
            callbacks: Mutex::new(callbacks),
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn state(&self) -> FutureState {
        *lock(&self.state)
    }

    /// Register another completion callback.
    pub fn add_callback(
        &self,
        callback: impl FnOnce(Option<&Response>) -> Result<(), BoxError> + Send + 'static,
    ) {
        lock(&self.callbacks).push(Box::new(callback));
    }

    /// Wait for the response and unmarshal it.
    ///
    /// A timeout surfaces as [`TransportError::Timeout`], which keeps the
    /// transport's native error reachable through [`crate::TimeoutError::native`].
    /// The future is terminal afterwards; calling again fails with
    /// [`Error::NotPending`].
    pub fn result(&self, timeout: Option<Duration>) -> Result<OperationResponse, Error> {
        {
            let state = lock(&self.state);
            if *state != FutureState::Pending {
                return Err(Error::NotPending { state: *state });
            }
        }

        let mut guard = CallbackGuard {
            callbacks: std::mem::take(&mut *lock(&self.callbacks)),
            response: None,
        };

        let outcome = match self.inner.wait(timeout) {
            Ok(response) => {
                guard.response = Some(response.clone());
                self.classify(response)
            }
            Err(e) => Err(Error::Transport(e)),
        };

        let callback_result = guard.run();

        let outcome = match (outcome, callback_result) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(source)) => Err(Error::Callback { source }),
            (Err(original), Err(source)) => {
                tracing::warn!(
                    operation = %self.operation.id,
                    error = %original,
                    "call failed and a response callback failed too"
                );
                Err(Error::Callback { source })
            }
        };

        let mut state = lock(&self.state);
        if *state == FutureState::Pending {
            *state = match &outcome {
                Ok(_) => FutureState::Resolved,
                Err(Error::Transport(TransportError::Cancelled)) => FutureState::Cancelled,
                Err(_) => FutureState::Failed,
            };
        }
        outcome
    }

    /// Forward cancellation to the transport. Safe to call repeatedly.
    ///
    /// Callbacks that no waiter has claimed yet run here with no response;
    /// the first callback failure is returned. Later calls return `Ok`.
    pub fn cancel(&self) -> Result<(), Error> {
        let mut state = lock(&self.state);
        if *state != FutureState::Pending {
            return Ok(());
        }
        *state = FutureState::Cancelled;
        drop(state);

        tracing::debug!(operation = %self.operation.id, "cancelling call");
        self.inner.cancel();

        let mut guard = CallbackGuard {
            callbacks: std::mem::take(&mut *lock(&self.callbacks)),
            response: None,
        };
        guard.run().map_err(|source| Error::Callback { source })
    }

    fn classify(&self, response: Response) -> Result<OperationResponse, Error> {
        let status = response.status_code();

        // Server errors are never successes, whatever the spec declares.
        if status >= 500 {
            let payload = self
                .operation
                .response_for(status)
                .and_then(|declared| declared.schema.as_ref())
                .and_then(|schema| {
                    let wire = decode_body(&response).ok().flatten()?;
                    self.spec.unmarshal(schema, &wire).ok()
                });
            return Err(HttpStatusError {
                operation: self.operation.id.clone(),
                status,
                payload,
                response,
            }
            .into());
        }

        let declared = self
            .operation
            .response_for(status)
            .ok_or(MappingError::NoResponseSpec { status })?;

        let wire = decode_body(&response)?;
        let result = match (&declared.schema, wire) {
            (Some(schema), Some(wire)) => self.spec.unmarshal(schema, &wire)?,
            (Some(schema), None) => self.spec.unmarshal(schema, &serde_json::Value::Null)?,
            (None, Some(wire)) => Native::from_json(&wire),
            (None, None) => Native::Null,
        };

        let mut headers = IndexMap::new();
        for (name, schema) in &declared.headers {
            if let Some(text) = response.header(name) {
                let value = self.spec.unmarshal(schema, &header_wire_value(text))?;
                headers.insert(name.clone(), value);
            }
        }

        tracing::debug!(operation = %self.operation.id, status, "call resolved");
        Ok(OperationResponse {
            status,
            result,
            headers,
            response,
        })
    }
}

impl fmt::Debug for ResultFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFuture")
            .field("operation", &self.operation.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Runs pending callbacks, on drop if nothing ran them earlier.
struct CallbackGuard {
    callbacks: Vec<ResponseCallback>,
    response: Option<Response>,
}

impl CallbackGuard {
    /// Run every callback. All of them run; the first error is returned.
    fn run(&mut self) -> Result<(), BoxError> {
        let mut first_error = None;
        for callback in self.callbacks.drain(..) {
            if let Err(e) = callback(self.response.as_ref()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if !self.callbacks.is_empty() {
            if let Err(e) = self.run() {
                tracing::warn!(error = %e, "response callback failed during unwind");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
