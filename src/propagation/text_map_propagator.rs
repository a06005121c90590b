//! The text-map propagator abstraction.

use crate::propagation::{Extractor, Injector};
use crate::Context;
use std::fmt;
use std::slice;

/// A propagator serializes context payloads into, and parses them out of,
/// string key/value carriers.
///
/// Implementations own one wire format each (W3C trace-context, B3, Jaeger,
/// baggage). Both directions are infallible by contract:
///
/// - `inject` writes nothing when the context has no valid payload for the
///   format, and
/// - `extract` returns a context derived from its input; on malformed or
///   absent wire data a span-context format stores an explicitly *invalid*
///   span context, so failure is detectable through
///   [`SpanContext::is_valid`](crate::trace::SpanContext::is_valid) and a
///   stale span in the input context is never mistaken for a fresh
///   extraction.
pub trait TextMapPropagator: fmt::Debug {
    /// Injects the current context's payload into the carrier.
    fn inject(&self, injector: &mut dyn Injector) {
        self.inject_context(&Context::current(), injector)
    }

    /// Injects the given context's payload into the carrier.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Extracts a context from the carrier, derived from the current context.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        self.extract_with_context(&Context::current(), extractor)
    }

    /// Extracts a context from the carrier, derived from `cx`.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// The header names this propagator reads and writes, for allow-listing.
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over the header names used by a propagator.
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` from a slice of header names.
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}

/// A propagator that reads and writes nothing.
///
/// This is the default for the [global propagator
/// slot](crate::global::set_text_map_propagator) until an application selects
/// real wire formats.
#[derive(Debug, Default)]
pub struct NoopTextMapPropagator {
    _private: (),
}

impl NoopTextMapPropagator {
    /// Create a new noop propagator.
    pub fn new() -> Self {
        NoopTextMapPropagator { _private: () }
    }
}

impl TextMapPropagator for NoopTextMapPropagator {
    fn inject_context(&self, _cx: &Context, _injector: &mut dyn Injector) {
        // ignored
    }

    fn extract_with_context(&self, cx: &Context, _extractor: &dyn Extractor) -> Context {
        cx.clone()
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContextValue;
    use std::collections::HashMap;

    #[test]
    fn noop_extract_preserves_input_context() {
        let propagator = NoopTextMapPropagator::new();
        let cx = Context::new().with_value("k", ContextValue::I64(1));

        let mut carrier = HashMap::new();
        carrier.insert("traceparent".to_string(), "anything".to_string());

        let extracted = propagator.extract_with_context(&cx, &carrier);
        assert_eq!(extracted, cx);
        assert_eq!(propagator.fields().count(), 0);
    }

    #[test]
    fn noop_inject_writes_nothing() {
        let propagator = NoopTextMapPropagator::new();
        let mut carrier = HashMap::new();
        propagator.inject_context(&Context::new(), &mut carrier);
        assert!(carrier.is_empty());
    }
}
