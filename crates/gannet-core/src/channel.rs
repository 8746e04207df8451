//! The owning channel, as seen from inside a dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::promise::Promise;
use crate::response::Response;
use crate::trace::Tracing;

/// Options for an outbound call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Explicit peer to dial, if not left to the channel's peer selection.
    pub hostport: Option<String>,
    /// Target service name.
    pub service: Option<String>,
    /// Argument scheme for the outbound call.
    pub arg_scheme: Option<String>,
    /// Transport headers for the outbound call.
    pub headers: HashMap<String, String>,
    /// Parent span for the outbound call. A [`CallProxy`]
    /// (`crate::CallProxy`) overrides this with the inbound call's
    /// tracing context.
    pub parent_tracing: Option<Tracing>,
}

/// Handle for an in-flight outbound call.
pub struct OutboundCall {
    /// Call id assigned by the channel.
    pub id: u32,
    /// Settles with the peer's response, or a fault.
    pub response: Promise<Arc<Response>>,
}

/// Capabilities of the channel that owns the current connection.
///
/// Implemented by the surrounding client/peer machinery; the dispatcher
/// only forwards to it through [`CallProxy`](crate::CallProxy).
pub trait Channel: Send + Sync {
    /// Whether the channel has been shut down.
    fn closed(&self) -> bool;

    /// The channel's own listening address.
    fn hostport(&self) -> &str;

    /// Issue a new outbound call.
    fn request(&self, options: CallOptions) -> OutboundCall;
}
