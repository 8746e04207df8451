//! Forwarding handle passed to endpoint handlers.

use std::sync::Arc;

use crate::channel::{CallOptions, Channel, OutboundCall};
use crate::trace::Tracing;

/// A per-dispatch handle that lets a handler issue further outbound
/// calls which inherit the inbound call's tracing context.
///
/// A proxy is created for each dispatch and is not meant to be retained
/// once the handler future completes; it carries no state beyond the
/// channel reference and the parent tracing.
pub struct CallProxy {
    channel: Arc<dyn Channel>,
    parent_tracing: Tracing,
}

impl CallProxy {
    pub(crate) fn new(channel: Arc<dyn Channel>, parent_tracing: Tracing) -> Self {
        Self {
            channel,
            parent_tracing,
        }
    }

    /// Whether the owning channel has been shut down.
    pub fn closed(&self) -> bool {
        self.channel.closed()
    }

    /// The owning channel's listening address.
    pub fn hostport(&self) -> &str {
        self.channel.hostport()
    }

    /// The tracing context of the inbound call that created this proxy.
    pub fn parent_tracing(&self) -> &Tracing {
        &self.parent_tracing
    }

    /// Issue an outbound call parented to the current inbound call.
    ///
    /// Always overrides `options.parent_tracing` with the inbound call's
    /// context, regardless of what the caller supplied.
    pub fn request(&self, mut options: CallOptions) -> OutboundCall {
        options.parent_tracing = Some(self.parent_tracing.clone());
        self.channel.request(options)
    }
}
