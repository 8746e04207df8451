//! gannet-testkit: shared test doubles for the dispatch core.
//!
//! Provides recording implementations of the dispatcher's collaborator
//! contracts plus a builder for inbound requests:
//!
//! ```ignore
//! let connection = Arc::new(RecordingConnection::default());
//! let channel = Arc::new(StaticChannel::new("127.0.0.1:4040"));
//! let events = Arc::new(CollectingSink::default());
//!
//! let request = RequestBuilder::new("echo", "svc").payload("hi").build();
//! let response = dispatcher.handle_call(request, connection.clone()).await?;
//! assert_eq!(connection.responses().len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use gannet_core::{
    ArgStream, CallOptions, Channel, Checksum, Connection, ErrorCode, Event, EventSink,
    OutboundCall, Promise, Request, ResponseFrame, Tracing, AS_HEADER,
};
use parking_lot::Mutex;

/// One wire error frame captured by [`RecordingConnection`].
#[derive(Debug, Clone)]
pub struct SentError {
    pub code: ErrorCode,
    pub message: String,
    pub id: u32,
}

/// Connection double that records every interaction.
///
/// The reservation table models the transport's response-buffer table:
/// `reserve` adds an id, `release` removes it and is idempotent.
#[derive(Default)]
pub struct RecordingConnection {
    outstanding: Mutex<Vec<u32>>,
    reserved_log: Mutex<Vec<u32>>,
    released_log: Mutex<Vec<u32>>,
    errors: Mutex<Vec<SentError>>,
    responses: Mutex<Vec<ResponseFrame>>,
}

impl RecordingConnection {
    /// Ids currently reserved and not yet released.
    pub fn outstanding(&self) -> Vec<u32> {
        self.outstanding.lock().clone()
    }

    /// Every id ever reserved, in order.
    pub fn reserved(&self) -> Vec<u32> {
        self.reserved_log.lock().clone()
    }

    /// Every release call, in order (including idempotent no-ops).
    pub fn released(&self) -> Vec<u32> {
        self.released_log.lock().clone()
    }

    pub fn errors(&self) -> Vec<SentError> {
        self.errors.lock().clone()
    }

    pub fn responses(&self) -> Vec<ResponseFrame> {
        self.responses.lock().clone()
    }
}

impl Connection for RecordingConnection {
    fn reserve(&self, id: u32) {
        self.outstanding.lock().push(id);
        self.reserved_log.lock().push(id);
    }

    fn release(&self, id: u32) {
        self.outstanding.lock().retain(|&r| r != id);
        self.released_log.lock().push(id);
    }

    fn send_error(&self, code: ErrorCode, message: &str, id: u32) {
        self.errors.lock().push(SentError {
            code,
            message: message.to_string(),
            id,
        });
    }

    fn send_response(&self, frame: ResponseFrame) {
        self.responses.lock().push(frame);
    }
}

/// Channel double with a fixed hostport that records outbound calls.
pub struct StaticChannel {
    hostport: String,
    closed: AtomicBool,
    next_id: AtomicU32,
    issued: Mutex<Vec<CallOptions>>,
}

impl StaticChannel {
    pub fn new(hostport: impl Into<String>) -> Self {
        Self {
            hostport: hostport.into(),
            closed: AtomicBool::new(false),
            next_id: AtomicU32::new(1),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    /// Options of every outbound call issued through this channel.
    pub fn issued(&self) -> Vec<CallOptions> {
        self.issued.lock().clone()
    }
}

impl Channel for StaticChannel {
    fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn hostport(&self) -> &str {
        &self.hostport
    }

    fn request(&self, options: CallOptions) -> OutboundCall {
        self.issued.lock().push(options);
        OutboundCall {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            response: Promise::new(),
        }
    }
}

/// Event sink that collects every fired event.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for CollectingSink {
    fn fire(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Builder for inbound requests fed straight to the dispatcher.
///
/// Lays out the conventional three argument streams: arg1 is the
/// endpoint name (optionally split into chunks), arg2 the application
/// headers, arg3 the payload.
pub struct RequestBuilder {
    id: u32,
    service: String,
    headers: HashMap<String, String>,
    tracing: Tracing,
    checksum: Checksum,
    endpoint_chunks: Vec<Bytes>,
    app_headers: Bytes,
    payload: Bytes,
}

impl RequestBuilder {
    pub fn new(endpoint: impl Into<String>, service: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            id: 1,
            service: service.into(),
            headers: HashMap::from([(AS_HEADER.to_string(), "raw".to_string())]),
            tracing: Tracing::default(),
            checksum: Checksum::default(),
            endpoint_chunks: vec![Bytes::from(endpoint.into_bytes())],
            app_headers: Bytes::new(),
            payload: Bytes::new(),
        }
    }

    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Override the declared `"as"` header.
    pub fn arg_scheme(mut self, scheme: &str) -> Self {
        self.headers
            .insert(AS_HEADER.to_string(), scheme.to_string());
        self
    }

    /// Drop the `"as"` header entirely.
    pub fn no_arg_scheme(mut self) -> Self {
        self.headers.remove(AS_HEADER);
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn tracing(mut self, tracing: Tracing) -> Self {
        self.tracing = tracing;
        self
    }

    /// Deliver the endpoint name split into the given arg1 chunks.
    pub fn endpoint_chunks<I>(mut self, chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        self.endpoint_chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// Set the arg2 application-header blob.
    pub fn app_headers(mut self, headers: impl Into<Bytes>) -> Self {
        self.app_headers = headers.into();
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn build(self) -> Arc<Request> {
        let args = vec![
            ArgStream::from_chunks(self.endpoint_chunks),
            ArgStream::from_chunks([self.app_headers]),
            ArgStream::from_chunks([self.payload]),
        ];
        Arc::new(Request::new(
            self.id,
            self.service,
            self.headers,
            self.checksum,
            self.tracing,
            args,
        ))
    }
}
