//! B3 propagator (Zipkin's `b3` single header and `x-b3-*` multi headers).

use crate::otel_debug;
use crate::propagation::{
    text_map_propagator::FieldIter, valid_lower_hex, Extractor, Injector, TextMapPropagator,
};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use crate::Context;
use std::sync::OnceLock;

const B3_SINGLE_HEADER: &str = "b3";
const B3_TRACE_ID_HEADER: &str = "x-b3-traceid";
const B3_SPAN_ID_HEADER: &str = "x-b3-spanid";
const B3_SAMPLED_HEADER: &str = "x-b3-sampled";

static B3_SINGLE_FIELDS: OnceLock<[String; 1]> = OnceLock::new();
static B3_MULTI_FIELDS: OnceLock<[String; 3]> = OnceLock::new();

fn b3_single_fields() -> &'static [String] {
    B3_SINGLE_FIELDS.get_or_init(|| [B3_SINGLE_HEADER.to_owned()])
}

fn b3_multi_fields() -> &'static [String] {
    B3_MULTI_FIELDS.get_or_init(|| {
        [
            B3_TRACE_ID_HEADER.to_owned(),
            B3_SPAN_ID_HEADER.to_owned(),
            B3_SAMPLED_HEADER.to_owned(),
        ]
    })
}

/// Which header layout a [`B3Propagator`] writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum B3Encoding {
    /// A single `b3` header: `{trace_id}-{span_id}-{sampling}`.
    #[default]
    SingleHeader,
    /// Separate `x-b3-traceid`, `x-b3-spanid`, and `x-b3-sampled` headers.
    MultipleHeader,
}

/// Propagates span contexts in [B3 format].
///
/// The encoding selects what `inject` writes; `extract` always accepts both
/// layouts, preferring a non-empty `b3` single header over the multi headers.
/// A present single header is authoritative: when it is malformed, extraction
/// does not fall back to the multi headers.
///
/// Sampling in B3 is forgiving: a sampled value of `1` or `d` (debug) means
/// sampled, and any other value means not sampled. The sampling field never
/// makes an otherwise valid header unparseable.
///
/// [B3 format]: https://github.com/openzipkin/b3-propagation
#[derive(Clone, Debug, Default)]
pub struct B3Propagator {
    encoding: B3Encoding,
}

impl B3Propagator {
    /// Create a `B3Propagator` with the given injection encoding.
    pub fn with_encoding(encoding: B3Encoding) -> Self {
        B3Propagator { encoding }
    }

    /// Create a `B3Propagator` that injects the single `b3` header.
    pub fn new() -> Self {
        B3Propagator::default()
    }

    /// `1` and `d` (debug) mean sampled; everything else, including absence,
    /// means not sampled.
    fn extract_sampled(sampled: Option<&str>) -> TraceFlags {
        match sampled {
            Some("1") | Some("d") => TraceFlags::SAMPLED,
            _ => TraceFlags::NOT_SAMPLED,
        }
    }

    fn extract_trace_id(trace_id: &str) -> Result<TraceId, ()> {
        // Short (64-bit) ids are left-padded to 128 bits.
        if trace_id.len() != 16 && trace_id.len() != 32 || !valid_lower_hex(trace_id) {
            return Err(());
        }
        TraceId::from_hex(trace_id).map_err(|_| ())
    }

    fn extract_span_id(span_id: &str) -> Result<SpanId, ()> {
        if span_id.len() != 16 || !valid_lower_hex(span_id) {
            return Err(());
        }
        SpanId::from_hex(span_id).map_err(|_| ())
    }

    /// Extract a span context from the `b3` single header:
    /// `{trace_id}-{span_id}-{sampling}-{parent_span_id}`, where the last two
    /// fields are optional and the deprecated parent span id is ignored.
    fn extract_single_header(&self, header_value: &str) -> Result<SpanContext, ()> {
        let parts = header_value.split('-').collect::<Vec<&str>>();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(());
        }

        let trace_id = Self::extract_trace_id(parts[0])?;
        let span_id = Self::extract_span_id(parts[1])?;
        let trace_flags = Self::extract_sampled(parts.get(2).copied());

        let span_context =
            SpanContext::new(trace_id, span_id, trace_flags, true, TraceState::default());
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }

    /// Extract a span context from the `x-b3-*` multi headers.
    fn extract_multi_header(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let trace_id =
            Self::extract_trace_id(extractor.get(B3_TRACE_ID_HEADER).unwrap_or_default().trim())?;
        let span_id =
            Self::extract_span_id(extractor.get(B3_SPAN_ID_HEADER).unwrap_or_default().trim())?;
        let trace_flags = Self::extract_sampled(
            extractor.get(B3_SAMPLED_HEADER).as_deref().map(str::trim),
        );

        let span_context =
            SpanContext::new(trace_id, span_id, trace_flags, true, TraceState::default());
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }
}

impl TextMapPropagator for B3Propagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
            match self.encoding {
                B3Encoding::SingleHeader => {
                    injector.set(
                        B3_SINGLE_HEADER,
                        format!(
                            "{:032x}-{:016x}-{:01x}",
                            span_context.trace_id(),
                            span_context.span_id(),
                            span_context.trace_flags().to_u8() & 0x0f
                        ),
                    );
                }
                B3Encoding::MultipleHeader => {
                    injector.set(B3_TRACE_ID_HEADER, span_context.trace_id().to_string());
                    injector.set(B3_SPAN_ID_HEADER, span_context.span_id().to_string());
                    injector.set(
                        B3_SAMPLED_HEADER,
                        format!("{:01x}", span_context.trace_flags().to_u8() & 0x0f),
                    );
                }
            }
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let single = extractor
            .get(B3_SINGLE_HEADER)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());

        let extracted = match single {
            Some(header_value) => self.extract_single_header(&header_value),
            None => self.extract_multi_header(extractor),
        };

        // Failure is stored as an invalid, non-remote span context so a stale
        // span in `cx` cannot masquerade as an extraction result.
        let span_context = extracted.unwrap_or_else(|()| {
            otel_debug!(name: "B3Propagator.Extract.NoValidHeader");
            SpanContext::empty_context()
        });
        cx.with_remote_span_context(span_context)
    }

    fn fields(&self) -> FieldIter<'_> {
        match self.encoding {
            B3Encoding::SingleHeader => FieldIter::new(b3_single_fields()),
            B3Encoding::MultipleHeader => FieldIter::new(b3_multi_fields()),
        }
    }
}
