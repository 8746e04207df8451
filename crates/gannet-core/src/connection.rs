//! Narrow contract to the framing and socket layer.

use crate::error::ErrorCode;
use crate::response::ResponseFrame;

/// What the dispatcher needs from a connection, and nothing more.
///
/// The implementation owns the response-buffer table; under the
/// single-task-per-connection model it needs no locking, but a
/// multi-threaded implementation must add its own mutual exclusion.
pub trait Connection: Send + Sync {
    /// Register the response buffer for an in-flight call.
    ///
    /// The dispatcher guarantees this happens before any handler code
    /// runs, so the transport always tracks an outstanding buffer even if
    /// the handler never completes normally.
    fn reserve(&self, id: u32);

    /// Drop the reserved buffer for a call that terminated with a fault.
    ///
    /// Must be idempotent: releasing an id that is no longer reserved is
    /// a no-op.
    fn release(&self, id: u32);

    /// Emit a wire error frame in place of a normal response.
    fn send_error(&self, code: ErrorCode, message: &str, id: u32);

    /// Emit a completed call-response frame.
    fn send_response(&self, frame: ResponseFrame);
}
