//! Trace identity types carried through contexts and over the wire.
//!
//! The propagation layer does not start or end spans; it only moves their
//! identity around. [`SpanContext`] is that identity — trace id, span id,
//! flags, remoteness, and the vendor [`TraceState`] — and [`Span`] is the
//! minimal capability a live span must expose for its identity to be
//! injected.

mod span_context;

pub use crate::trace_ids::{SpanId, TraceFlags, TraceId};
pub use span_context::{SpanContext, TraceState, TraceStateError};

/// The context key under which the active span (or a remotely extracted span
/// context) is stored.
pub const SPAN_KEY: &str = "active_span";

/// A live span, as far as context propagation is concerned.
///
/// Tracing implementations hand their span types to
/// [`Context::with_span`](crate::Context::with_span); this crate only ever
/// reads the identity back out.
pub trait Span {
    /// The immutable identity of this span.
    fn span_context(&self) -> &SpanContext;
}
