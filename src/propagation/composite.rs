//! Chaining multiple propagators into one.

use crate::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use crate::Context;
use std::collections::HashSet;

/// Composite propagator for [`TextMapPropagator`]s.
///
/// Runs each child propagator in construction order. On injection every child
/// writes its own headers, so a later child sharing a header with an earlier
/// one overwrites it. On extraction the context is threaded through the
/// children in order, each child layering its findings on top of the previous
/// result; children that find nothing pass the context through untouched.
///
/// # Examples
///
/// ```
/// use context_propagation::propagation::{
///     BaggagePropagator, TextMapCompositePropagator, TextMapPropagator, TraceContextPropagator,
/// };
/// use std::collections::HashMap;
///
/// let composite = TextMapCompositePropagator::new(vec![
///     Box::new(TraceContextPropagator::new()),
///     Box::new(BaggagePropagator::new()),
/// ]);
///
/// let mut carrier = HashMap::new();
/// carrier.insert(
///     "traceparent".to_string(),
///     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
/// );
/// carrier.insert("baggage".to_string(), "user_id=1".to_string());
///
/// let cx = composite.extract(&carrier);
/// assert!(cx.span_context().is_some());
/// assert!(cx.baggage().is_some());
/// ```
#[derive(Debug)]
pub struct TextMapCompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,
    fields: Vec<String>,
}

impl TextMapCompositePropagator {
    /// Constructs a composite out of instances of [`TextMapPropagator`].
    ///
    /// The advertised fields are the deduplicated union of the children's
    /// fields.
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>) -> Self {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for propagator in &propagators {
            for field in propagator.fields() {
                if seen.insert(field.to_string()) {
                    fields.push(field.to_string());
                }
            }
        }

        TextMapCompositePropagator {
            propagators,
            fields,
        }
    }
}

impl TextMapPropagator for TextMapCompositePropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(cx, injector)
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.propagators
            .iter()
            .fold(cx.clone(), |current_cx, propagator| {
                propagator.extract_with_context(&current_cx, extractor)
            })
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baggage::Baggage;
    use crate::propagation::{B3Propagator, BaggagePropagator, TraceContextPropagator};
    use crate::testing::TestSpan;
    use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use std::collections::HashMap;

    /// A propagator moving a single context value through a single header.
    #[derive(Debug)]
    struct TestPropagator {
        header: &'static str,
        fields: Vec<String>,
    }

    impl TestPropagator {
        fn new(header: &'static str) -> Self {
            TestPropagator {
                header,
                fields: vec![header.to_string()],
            }
        }
    }

    impl TextMapPropagator for TestPropagator {
        fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
            if let crate::ContextValue::I64(v) = cx.value(self.header) {
                injector.set(self.header, v.to_string());
            }
        }

        fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
            match extractor.get(self.header).and_then(|v| v.parse::<i64>().ok()) {
                Some(v) => cx.with_value(self.header.to_string(), v),
                None => cx.clone(),
            }
        }

        fn fields(&self) -> FieldIter<'_> {
            FieldIter::new(self.fields.as_slice())
        }
    }

    fn span_context() -> SpanContext {
        SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(11u64),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        )
    }

    #[test]
    fn zero_propagators_are_noop() {
        let composite = TextMapCompositePropagator::new(vec![]);
        let cx = Context::new().with_span(TestSpan(span_context()));

        let mut injector = HashMap::new();
        composite.inject_context(&cx, &mut injector);
        assert!(injector.is_empty());

        let mut extractor = HashMap::new();
        extractor.insert("a".to_string(), "1".to_string());
        let extracted = composite.extract_with_context(&cx, &extractor);
        assert_eq!(extracted, cx);
        assert_eq!(composite.fields().count(), 0);
    }

    #[test]
    fn inject_runs_all_children() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]);

        let baggage: Baggage = [("user_id", "1")].into_iter().collect();
        let cx = Context::new()
            .with_span(TestSpan(span_context()))
            .with_baggage(baggage);

        let mut injector = HashMap::new();
        composite.inject_context(&cx, &mut injector);

        assert!(Extractor::get(&injector, "traceparent").is_some());
        assert_eq!(Extractor::get(&injector, "baggage").as_deref(), Some("user_id=1"));
    }

    #[test]
    fn extract_folds_through_children() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("a")),
            Box::new(TestPropagator::new("b")),
        ]);

        let mut extractor = HashMap::new();
        extractor.insert("a".to_string(), "1".to_string());
        extractor.insert("b".to_string(), "2".to_string());

        let cx = composite.extract_with_context(&Context::new(), &extractor);
        assert_eq!(cx.value("a"), crate::ContextValue::I64(1));
        assert_eq!(cx.value("b"), crate::ContextValue::I64(2));
    }

    #[test]
    fn extract_later_children_win() {
        // Two children sharing a header; the later extraction shadows the
        // earlier one in the context chain.
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("a")),
            Box::new(TestPropagator::new("a")),
        ]);

        let mut extractor = HashMap::new();
        extractor.insert("a".to_string(), "7".to_string());

        let cx = composite.extract_with_context(&Context::new(), &extractor);
        assert_eq!(cx.value("a"), crate::ContextValue::I64(7));
    }

    #[test]
    fn extract_last_span_context_format_wins() {
        // Both formats present in the carrier; the B3 child runs second and
        // its span context shadows the W3C one.
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(B3Propagator::new()),
        ]);

        let mut extractor = HashMap::new();
        extractor.insert(
            "traceparent".to_string(),
            "00-11111111111111111111111111111111-1111111111111111-01".to_string(),
        );
        extractor.insert(
            "b3".to_string(),
            "22222222222222222222222222222222-2222222222222222-1".to_string(),
        );

        let cx = composite.extract_with_context(&Context::new(), &extractor);
        let sc = cx.span_context().expect("a span context was extracted");
        assert!(sc.is_valid());
        assert!(sc.is_remote());
        assert_eq!(
            sc.trace_id(),
            TraceId::from_hex("22222222222222222222222222222222").unwrap()
        );
        assert_eq!(sc.span_id(), SpanId::from_hex("2222222222222222").unwrap());
    }

    #[test]
    fn fields_are_deduplicated_union() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("a")),
            Box::new(TestPropagator::new("b")),
            Box::new(TestPropagator::new("a")),
        ]);

        let fields: Vec<&str> = composite.fields().collect();
        assert_eq!(fields, vec!["a", "b"]);
    }
}
