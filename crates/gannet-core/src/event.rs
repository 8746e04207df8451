//! Fire-and-forget notification sink.

use std::fmt;
use std::sync::Arc;

use crate::error::Fault;
use crate::request::Request;

/// Events emitted by the dispatcher at documented points.
#[derive(Clone)]
pub enum Event {
    /// Fired once per call, after the endpoint name is fully assembled
    /// and before the handler is resolved or invoked, so instrumentation
    /// observes the final endpoint name.
    BeforeReceiveRequest { request: Arc<Request> },
    /// Fired exactly once when a handler terminates with an uncaught
    /// fault, carrying the original request and fault.
    ApplicationError { request: Arc<Request>, fault: Fault },
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeReceiveRequest { request } => f
                .debug_struct("BeforeReceiveRequest")
                .field("id", &request.id)
                .field("endpoint", &request.endpoint())
                .finish(),
            Self::ApplicationError { request, fault } => f
                .debug_struct("ApplicationError")
                .field("id", &request.id)
                .field("fault", &fault.message())
                .finish(),
        }
    }
}

/// Destination for dispatcher events. Delivery is fire-and-forget; the
/// dispatcher never blocks on the sink.
pub trait EventSink: Send + Sync {
    fn fire(&self, event: Event);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn fire(&self, _event: Event) {}
}
