//! Jaeger propagator (`uber-trace-id` header).

use crate::otel_debug;
use crate::propagation::{
    text_map_propagator::FieldIter, valid_lower_hex, Extractor, Injector, TextMapPropagator,
};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use crate::Context;
use std::sync::OnceLock;

const JAEGER_HEADER: &str = "uber-trace-id";
const DEPRECATED_PARENT_SPAN: &str = "0";

static JAEGER_HEADER_FIELD: OnceLock<[String; 1]> = OnceLock::new();

fn jaeger_header_field() -> &'static [String] {
    JAEGER_HEADER_FIELD.get_or_init(|| [JAEGER_HEADER.to_owned()])
}

/// Propagates span contexts in [Jaeger propagation format]:
///
/// `uber-trace-id: {trace-id}:{span-id}:{parent-span-id}:{flags}`
///
/// The parent span id field is deprecated and ignored on extraction, and
/// always written as `0` on injection. The flags field is a hex byte whose
/// low bit is the sampled flag; the debug bit is honored on extraction (it
/// implies nothing here beyond its own bit) but never re-emitted on
/// injection.
///
/// Jaeger headers sometimes arrive URL-encoded; a value without any `:` is
/// retried with `%3A` decoded before parsing.
///
/// [Jaeger propagation format]: https://www.jaegertracing.io/docs/1.18/client-libraries/#propagation-format
#[derive(Clone, Debug, Default)]
pub struct JaegerPropagator {
    _private: (),
}

impl JaegerPropagator {
    /// Create a Jaeger propagator.
    pub fn new() -> Self {
        JaegerPropagator::default()
    }

    fn extract_span_context(&self, header_value: &str) -> Result<SpanContext, ()> {
        let parts = header_value.split(':').collect::<Vec<&str>>();
        if parts.len() != 4 {
            return Err(());
        }

        let trace_id = Self::extract_trace_id(parts[0])?;
        let span_id = Self::extract_span_id(parts[1])?;
        // parts[2] is the deprecated parent span id.
        let trace_flags = Self::extract_flags(parts[3])?;

        let span_context =
            SpanContext::new(trace_id, span_id, trace_flags, true, TraceState::default());
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }

    /// Jaeger trace ids are variable length up to 32 hex chars, left-padded
    /// with zeros.
    fn extract_trace_id(trace_id: &str) -> Result<TraceId, ()> {
        if trace_id.len() > 32 || !valid_lower_hex(trace_id) {
            return Err(());
        }
        TraceId::from_hex(trace_id).map_err(|_| ())
    }

    fn extract_span_id(span_id: &str) -> Result<SpanId, ()> {
        if span_id.len() > 16 || !valid_lower_hex(span_id) {
            return Err(());
        }
        SpanId::from_hex(span_id).map_err(|_| ())
    }

    /// The flags field is one hex byte. Bit 0 is sampled, bit 1 is debug;
    /// the remaining bits are carried through untouched.
    fn extract_flags(flags: &str) -> Result<TraceFlags, ()> {
        if flags.len() > 2 || !valid_lower_hex(flags) {
            return Err(());
        }
        u8::from_str_radix(flags, 16)
            .map(TraceFlags::new)
            .map_err(|_| ())
    }
}

impl TextMapPropagator for JaegerPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
            let sampled = if span_context.is_sampled() { "1" } else { "0" };
            injector.set(
                JAEGER_HEADER,
                format!(
                    "{:032x}:{:016x}:{}:0{}",
                    span_context.trace_id(),
                    span_context.span_id(),
                    DEPRECATED_PARENT_SPAN,
                    sampled,
                ),
            );
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let header_value = extractor.get(JAEGER_HEADER).unwrap_or_default();
        // A header with no separators may be URL-encoded; decode and retry.
        let extracted = if header_value.contains(':') {
            self.extract_span_context(&header_value)
        } else {
            self.extract_span_context(&header_value.replace("%3A", ":"))
        };

        let span_context = extracted.unwrap_or_else(|()| {
            otel_debug!(name: "JaegerPropagator.Extract.NoValidHeader");
            SpanContext::empty_context()
        });
        cx.with_remote_span_context(span_context)
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(jaeger_header_field())
    }
}
