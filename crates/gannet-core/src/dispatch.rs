//! The per-call dispatch state machine.
//!
//! Each inbound call moves through strictly ordered phases:
//!
//! ```text
//!   STREAM_READ   drain arg1 into the endpoint name
//!   LOOKUP        name the span, fire before-receive, resolve handler
//!   NEGOTIATE     declared "as" header vs. handler's request scheme
//!   RESPOND_INIT  build the Response bound to the response scheme
//!   RESERVE       register the response buffer with the connection
//!   INVOKE        run the handler with (request, response, proxy)
//!   SETTLE        flush, or convert the rejection/fault to a wire frame
//! ```
//!
//! The ordering is load-bearing: no lookup happens on a partially
//! assembled name, and the reservation happens-before any handler code
//! so the connection always tracks an outstanding buffer.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::channel::Channel;
use crate::connection::Connection;
use crate::error::{DispatchError, ErrorCode, Fault, ServiceError};
use crate::event::{Event, EventSink};
use crate::proxy::CallProxy;
use crate::registry::{HandlerRegistry, Lookup};
use crate::request::{Request, AS_HEADER};
use crate::response::Response;
use crate::scheme::scheme_name;

/// Cap on the assembled endpoint name, fixed by the framing protocol's
/// arg1 size limit.
pub const MAX_ENDPOINT_SIZE: usize = 16 * 1024;

/// Routes inbound calls to registered endpoint handlers.
pub struct RequestDispatcher {
    registry: HandlerRegistry,
    channel: Arc<dyn Channel>,
    events: Arc<dyn EventSink>,
}

impl RequestDispatcher {
    pub fn new(
        registry: HandlerRegistry,
        channel: Arc<dyn Channel>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            channel,
            events,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Dispatch one inbound call to completion.
    ///
    /// Returns the (possibly faulted) response for composition and
    /// testing, or a [`DispatchError`] for the two pre-invoke aborts; in
    /// either error case the matching `BadRequest` frame has already
    /// been sent.
    pub async fn handle_call(
        &self,
        request: Arc<Request>,
        connection: Arc<dyn Connection>,
    ) -> Result<Arc<Response>, DispatchError> {
        // STREAM_READ: arg1 must be fully drained before any lookup.
        // After this loop the stream is exhausted; re-reads yield nothing.
        if let Some(arg1) = request.arg(0) {
            while let Some(chunk) = arg1.read().await {
                let len = request.push_endpoint_chunk(&chunk);
                if len > MAX_ENDPOINT_SIZE {
                    tracing::warn!(id = request.id, len, "endpoint name over arg1 cap");
                    connection.send_error(
                        ErrorCode::BadRequest,
                        &format!("endpoint name exceeds {MAX_ENDPOINT_SIZE} bytes"),
                        request.id,
                    );
                    return Err(DispatchError::EndpointOverflow {
                        len,
                        max: MAX_ENDPOINT_SIZE,
                    });
                }
            }
        }
        let endpoint = request.endpoint();
        request.set_span_name(&endpoint);
        tracing::debug!(id = request.id, endpoint = %endpoint, service = %request.service, "received call");

        self.events.fire(Event::BeforeReceiveRequest {
            request: request.clone(),
        });

        // LOOKUP: exact match, else fallback, else built-in not-found.
        let handler = match self.registry.lookup(&endpoint) {
            Lookup::Found(handler) => handler,
            Lookup::NotFound => self.registry.not_found_handler(),
        };

        // NEGOTIATE: declared scheme must match the handler's.
        let declared = request.arg_scheme();
        if declared != Some(handler.req_scheme().name()) {
            let expected = handler.req_scheme().name();
            tracing::warn!(
                id = request.id,
                endpoint = %endpoint,
                expected,
                declared = declared.unwrap_or("<none>"),
                "arg scheme mismatch"
            );
            connection.send_error(
                ErrorCode::BadRequest,
                &format!(
                    "invalid arg scheme in request header: expected '{}', got '{}'",
                    expected,
                    declared.unwrap_or("<none>"),
                ),
                request.id,
            );
            return Err(DispatchError::SchemeMismatch {
                expected: expected.to_string(),
                actual: declared.map(str::to_string),
            });
        }
        request.bind_scheme(handler.req_scheme().clone());

        // RESPOND_INIT: response headers echo the negotiated scheme.
        let mut headers = HashMap::new();
        headers.insert(
            AS_HEADER.to_string(),
            declared.unwrap_or(scheme_name::RAW).to_string(),
        );
        let response = Arc::new(Response::new(
            request.id,
            request.checksum,
            request.tracing(),
            headers,
            handler.resp_scheme().clone(),
            connection.clone(),
        ));

        // RESERVE: happens-before INVOKE, so the transport tracks the
        // buffer even if the handler never completes normally.
        connection.reserve(response.id);

        // INVOKE. A panicking handler must not wedge the connection; it
        // settles as an uncaught fault like any other.
        let proxy = CallProxy::new(self.channel.clone(), request.tracing());
        let invocation = handler.invoke(request.clone(), response.clone(), proxy);
        let outcome = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(ServiceError::Fault(Fault::new(panic_message(&panic)))),
        };

        // SETTLE: exactly one of flush, bad-request, or unexpected.
        match outcome {
            Ok(()) => {
                // Handlers may flush on their own; the settle here is a
                // no-op in that case.
                if response.flush().is_err() {
                    tracing::debug!(id = response.id, "response already settled by the handler");
                } else {
                    tracing::debug!(id = response.id, endpoint = %endpoint, "flushed response");
                }
            }
            Err(err @ ServiceError::InvalidEndpoint { .. }) => {
                tracing::debug!(id = request.id, endpoint = %endpoint, "invalid endpoint");
                connection.send_error(ErrorCode::BadRequest, &err.to_string(), request.id);
            }
            Err(ServiceError::Fault(fault)) => {
                tracing::error!(
                    id = request.id,
                    endpoint = %endpoint,
                    error = %fault,
                    "uncaught fault from handler"
                );
                if response.set_fault(fault.clone()).is_err() {
                    tracing::error!(id = response.id, "response was already settled at fault");
                }
                connection.release(response.id);
                connection.send_error(
                    ErrorCode::Unexpected,
                    "An unexpected error has occurred from the handler",
                    response.id,
                );
                self.events.fire(Event::ApplicationError {
                    request: request.clone(),
                    fault,
                });
            }
        }

        Ok(response)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic in handler: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic in handler: {s}")
    } else {
        "panic in handler".to_string()
    }
}
