//! Test utilities.
//!
//! Enable the `testing` feature to use these helpers from other crates.

use crate::trace::{Span, SpanContext};

/// A span that carries a fixed [`SpanContext`] and does nothing else.
#[derive(Clone, Debug)]
pub struct TestSpan(pub SpanContext);

impl Span for TestSpan {
    fn span_context(&self) -> &SpanContext {
        &self.0
    }
}
