//! Inbound call requests and argument streams.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::scheme::ArgScheme;
use crate::trace::Tracing;

/// Transport header key naming the negotiated argument scheme.
pub const AS_HEADER: &str = "as";

/// Checksum algorithms defined by the framing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChecksumKind {
    #[default]
    None = 0x00,
    Crc32 = 0x01,
    Farmhash = 0x02,
    Crc32C = 0x03,
}

/// Checksum carried on call frames, echoed onto the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checksum {
    pub kind: ChecksumKind,
    pub value: u32,
}

/// Ordered byte-chunk stream carrying one positional call argument.
///
/// Backed by an unbounded channel fed by the framing layer; `read`
/// suspends until the next chunk arrives and returns `None` once the
/// stream is exhausted. Exhausted streams return `None` forever, so a
/// consumer that drained a stream observes nothing on re-read.
pub struct ArgStream {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl ArgStream {
    /// Create a connected writer/stream pair.
    pub fn channel() -> (ArgWriter, ArgStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ArgWriter { tx },
            ArgStream {
                rx: tokio::sync::Mutex::new(rx),
            },
        )
    }

    /// Build an already-complete stream from the given chunks.
    pub fn from_chunks<I>(chunks: I) -> ArgStream
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let (writer, stream) = Self::channel();
        for chunk in chunks {
            writer.push(chunk);
        }
        stream
    }

    /// Read the next chunk, or `None` at end of stream.
    pub async fn read(&self) -> Option<Bytes> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

impl fmt::Debug for ArgStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgStream").finish_non_exhaustive()
    }
}

/// Producer half of an [`ArgStream`]; dropping it ends the stream.
pub struct ArgWriter {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ArgWriter {
    /// Append a chunk. Chunks pushed after the reader exhausted the
    /// stream are delivered in order; there is no interior close signal
    /// other than dropping the writer.
    pub fn push(&self, chunk: impl Into<Bytes>) {
        // The receiver half only disappears when the request is dropped,
        // at which point the chunk has nowhere to go anyway.
        let _ = self.tx.send(chunk.into());
    }

    /// End the stream.
    pub fn close(self) {}
}

/// An inbound call, as handed to the dispatcher by the framing layer.
///
/// Argument stream 0 carries the endpoint name and is consumed exactly
/// once during dispatch; afterwards the assembled name is available via
/// [`Request::endpoint`].
pub struct Request {
    pub id: u32,
    /// Target service name from the call frame.
    pub service: String,
    /// Transport headers; the scheme name lives under [`AS_HEADER`].
    pub headers: HashMap<String, String>,
    pub checksum: Checksum,
    tracing: Mutex<Tracing>,
    args: Vec<ArgStream>,
    endpoint: Mutex<EndpointBuf>,
    scheme: Mutex<Option<Arc<dyn ArgScheme>>>,
}

/// Endpoint name under assembly. The wire length is tracked separately
/// from the decoded name: invalid UTF-8 is replaced in the name, but the
/// arg1 size cap is measured against the raw bytes received.
#[derive(Default)]
struct EndpointBuf {
    name: String,
    wire_len: usize,
}

impl Request {
    pub fn new(
        id: u32,
        service: impl Into<String>,
        headers: HashMap<String, String>,
        checksum: Checksum,
        tracing: Tracing,
        args: Vec<ArgStream>,
    ) -> Self {
        Self {
            id,
            service: service.into(),
            headers,
            checksum,
            tracing: Mutex::new(tracing),
            args,
            endpoint: Mutex::new(EndpointBuf::default()),
            scheme: Mutex::new(None),
        }
    }

    /// The positional argument stream at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&ArgStream> {
        self.args.get(index)
    }

    /// The assembled endpoint name. Empty until stream 0 is drained.
    pub fn endpoint(&self) -> String {
        self.endpoint.lock().name.clone()
    }

    /// Append a stream-0 chunk to the endpoint name; returns the total
    /// arg1 wire length in bytes. Invalid UTF-8 becomes replacement
    /// characters in the name without affecting the returned length.
    pub(crate) fn push_endpoint_chunk(&self, chunk: &[u8]) -> usize {
        let mut endpoint = self.endpoint.lock();
        endpoint.wire_len += chunk.len();
        endpoint.name.push_str(&String::from_utf8_lossy(chunk));
        endpoint.wire_len
    }

    /// Snapshot of the call's tracing context.
    pub fn tracing(&self) -> Tracing {
        self.tracing.lock().clone()
    }

    /// Name the span after the assembled endpoint.
    pub(crate) fn set_span_name(&self, name: &str) {
        self.tracing.lock().name = name.to_string();
    }

    /// The declared `"as"` header, if any.
    pub fn arg_scheme(&self) -> Option<&str> {
        self.headers.get(AS_HEADER).map(String::as_str)
    }

    /// The scheme bound at negotiation, if negotiation has happened.
    pub fn scheme(&self) -> Option<Arc<dyn ArgScheme>> {
        self.scheme.lock().clone()
    }

    pub(crate) fn bind_scheme(&self, scheme: Arc<dyn ArgScheme>) {
        *self.scheme.lock() = Some(scheme);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("endpoint", &self.endpoint.lock().name)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
