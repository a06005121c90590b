//! W3C trace-context propagator (`traceparent` / `tracestate`).

use crate::otel_debug;
use crate::propagation::{
    text_map_propagator::FieldIter, valid_lower_hex, Extractor, Injector, TextMapPropagator,
};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use crate::Context;
use std::str::FromStr;
use std::sync::OnceLock;

const SUPPORTED_VERSION: u8 = 0;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";

static TRACE_CONTEXT_HEADER_FIELDS: OnceLock<[String; 2]> = OnceLock::new();

fn trace_context_header_fields() -> &'static [String; 2] {
    TRACE_CONTEXT_HEADER_FIELDS
        .get_or_init(|| [TRACEPARENT_HEADER.to_owned(), TRACESTATE_HEADER.to_owned()])
}

/// Propagates span contexts in [W3C trace-context] format.
///
/// The `traceparent` header carries the trace identity in a fixed 55
/// character layout:
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// with four dash-separated fields: version, trace-id, parent-id, and
/// trace-flags. The `tracestate` header carries vendor-specific data and is
/// passed through verbatim; a malformed `tracestate` never invalidates an
/// otherwise valid `traceparent`.
///
/// On injection the `tracestate` header is always written when a valid span
/// context exists, even when its value is empty — the header key itself
/// signals participation.
///
/// [W3C trace-context]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(TRACEPARENT_HEADER).unwrap_or_default();
        let header_value = header_value.trim();

        // Exactly four dash-separated fields of fixed width.
        let parts = header_value.split('-').collect::<Vec<&str>>();
        if parts.len() != 4 {
            return Err(());
        }
        let (version, trace_id, span_id, flags) = (parts[0], parts[1], parts[2], parts[3]);
        if version.len() != 2 || trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
            return Err(());
        }
        if !valid_lower_hex(version)
            || !valid_lower_hex(trace_id)
            || !valid_lower_hex(span_id)
            || !valid_lower_hex(flags)
        {
            return Err(());
        }

        // Version ff is forbidden by the spec.
        if version == "ff" {
            return Err(());
        }

        let trace_id = TraceId::from_hex(trace_id).map_err(|_| ())?;
        let span_id = SpanId::from_hex(span_id).map_err(|_| ())?;
        let opts = u8::from_str_radix(flags, 16).map_err(|_| ())?;

        // Only the sampled bit is defined for version 00.
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        // tracestate is best effort; a parse failure degrades to empty.
        let trace_state = extractor
            .get(TRACESTATE_HEADER)
            .and_then(|s| TraceState::from_str(&s).ok())
            .unwrap_or_default();

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    /// Writes `traceparent` and `tracestate` for a valid span context, and
    /// nothing at all otherwise.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
            let header_value = format!(
                "{:02x}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags() & TraceFlags::SAMPLED
            );
            injector.set(TRACEPARENT_HEADER, header_value);
            injector.set(TRACESTATE_HEADER, span_context.trace_state().header());
        }
    }

    /// Parses `traceparent`/`tracestate` from the carrier. A missing or
    /// malformed header stores an explicitly invalid span context, shadowing
    /// any span the input context carried, so the failure is observable via
    /// [`SpanContext::is_valid`] rather than as an error.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let span_context = self.extract_span_context(extractor).unwrap_or_else(|()| {
            otel_debug!(name: "TraceContextPropagator.Extract.NoValidHeader");
            SpanContext::empty_context()
        });
        cx.with_remote_span_context(span_context)
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(trace_context_header_fields())
    }
}
