//! Opaque tracing span context propagated across calls.

/// Span identifiers for a single call.
///
/// The dispatcher treats this as an opaque value: it names the span after
/// the assembled endpoint and hands the context to the [`CallProxy`]
/// (`crate::CallProxy`) so outbound calls are parented correctly. Actual
/// span reporting lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tracing {
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_span_id: u64,
    /// Sampling flags from the inbound frame.
    pub flags: u8,
    /// Span name; set to the endpoint once assembly completes.
    pub name: String,
}

impl Tracing {
    pub fn new(trace_id: u64, span_id: u64, parent_span_id: u64, flags: u8) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
            flags,
            name: String::new(),
        }
    }
}
