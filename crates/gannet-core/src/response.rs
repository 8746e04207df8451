//! Outbound call responses.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::error::{AlreadySettled, Fault};
use crate::request::Checksum;
use crate::scheme::{Arg, ArgScheme, CodecError};
use crate::trace::Tracing;

/// Response code on the call-response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ResponseCode {
    #[default]
    Ok = 0x00,
    Error = 0x01,
}

/// Fully assembled response frame handed to the connection on flush.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub id: u32,
    pub code: ResponseCode,
    pub headers: HashMap<String, String>,
    pub checksum: Checksum,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettleKind {
    Flushed,
    Faulted,
}

struct Inner {
    code: ResponseCode,
    body: BytesMut,
    settled: Option<SettleKind>,
    fault: Option<Fault>,
}

/// An in-flight response for one inbound call.
///
/// Constructed by the dispatcher once negotiation succeeds, reserved
/// with the connection before the handler runs, and settled exactly
/// once: either flushed with the accumulated body or marked faulted.
pub struct Response {
    pub id: u32,
    pub checksum: Checksum,
    pub tracing: Tracing,
    /// Transport headers echoing the negotiated `"as"` scheme.
    pub headers: HashMap<String, String>,
    scheme: Arc<dyn ArgScheme>,
    connection: Arc<dyn Connection>,
    inner: Mutex<Inner>,
}

impl Response {
    pub fn new(
        id: u32,
        checksum: Checksum,
        tracing: Tracing,
        headers: HashMap<String, String>,
        scheme: Arc<dyn ArgScheme>,
        connection: Arc<dyn Connection>,
    ) -> Self {
        Self {
            id,
            checksum,
            tracing,
            headers,
            scheme,
            connection,
            inner: Mutex::new(Inner {
                code: ResponseCode::Ok,
                body: BytesMut::new(),
                settled: None,
                fault: None,
            }),
        }
    }

    /// The bound response scheme.
    pub fn scheme(&self) -> &Arc<dyn ArgScheme> {
        &self.scheme
    }

    /// Append raw bytes to the pending response body.
    pub fn write(&self, chunk: impl Into<Bytes>) {
        self.inner.lock().body.extend_from_slice(&chunk.into());
    }

    /// Encode a positional argument with the bound scheme and append it.
    pub fn write_arg(&self, arg: &Arg) -> Result<(), CodecError> {
        let encoded = self.scheme.encode(arg)?;
        self.write(encoded);
        Ok(())
    }

    /// Mark the response as an application-level error response.
    pub fn set_code(&self, code: ResponseCode) {
        self.inner.lock().code = code;
    }

    /// Serialize the pending body and emit the response frame.
    ///
    /// A response is flushed or error-signaled exactly once; a second
    /// settle attempt is rejected and the connection sees nothing.
    pub fn flush(&self) -> Result<(), AlreadySettled> {
        let frame = {
            let mut inner = self.inner.lock();
            if inner.settled.is_some() {
                return Err(AlreadySettled);
            }
            inner.settled = Some(SettleKind::Flushed);
            ResponseFrame {
                id: self.id,
                code: inner.code,
                headers: self.headers.clone(),
                checksum: self.checksum,
                body: inner.body.split().freeze(),
            }
        };
        self.connection.send_response(frame);
        Ok(())
    }

    /// Attach a terminal fault, consuming this response's one settle.
    pub(crate) fn set_fault(&self, fault: Fault) -> Result<(), AlreadySettled> {
        let mut inner = self.inner.lock();
        if inner.settled.is_some() {
            return Err(AlreadySettled);
        }
        inner.settled = Some(SettleKind::Faulted);
        inner.code = ResponseCode::Error;
        inner.fault = Some(fault);
        Ok(())
    }

    /// The terminal fault, if the call ended with one.
    pub fn fault(&self) -> Option<Fault> {
        self.inner.lock().fault.clone()
    }

    pub fn is_flushed(&self) -> bool {
        self.inner.lock().settled == Some(SettleKind::Flushed)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Response")
            .field("id", &self.id)
            .field("code", &inner.code)
            .field("settled", &inner.settled)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
