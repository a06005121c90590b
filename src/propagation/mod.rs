//! Moving context across process boundaries.
//!
//! Propagators read and write context data through *carriers*: string-keyed
//! transports such as HTTP header maps or environment variables. The carrier
//! capability is split into [`Injector`] (outbound writes) and [`Extractor`]
//! (inbound reads); concrete carriers implement whichever direction they
//! support, with no shared base type required.
//!
//! The [`TextMapPropagator`] trait ties the two together: `inject` serializes
//! a [`Context`](crate::Context)'s payload into a carrier, `extract` parses a
//! carrier back into a context. Concrete wire formats live in this module:
//!
//! - [`TraceContextPropagator`]: W3C `traceparent`/`tracestate`
//! - [`B3Propagator`]: B3 single- and multi-header
//! - [`JaegerPropagator`]: `uber-trace-id`
//! - [`BaggagePropagator`]: W3C `baggage`
//! - [`TextMapCompositePropagator`]: ordered composition of the above

use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

pub mod b3;
pub mod baggage;
pub mod composite;
pub mod jaeger;
pub mod text_map_propagator;
pub mod trace_context;

pub use b3::{B3Encoding, B3Propagator};
pub use baggage::BaggagePropagator;
pub use composite::TextMapCompositePropagator;
pub use jaeger::JaegerPropagator;
pub use text_map_propagator::{FieldIter, NoopTextMapPropagator, TextMapPropagator};
pub use trace_context::TraceContextPropagator;

/// Write half of a carrier: adds string fields to an underlying transport
/// such as a header map.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Read half of a carrier: retrieves string fields from an underlying
/// transport.
pub trait Extractor {
    /// Get the value for a key from the underlying data, if present.
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;

    /// Collect all keys known to the underlying data.
    fn keys(&self) -> Vec<Cow<'_, str>>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Keys are case-folded to lowercase, matching HTTP header semantics.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Lookup is case-insensitive via lowercase folding.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(&key.to_lowercase())
            .map(|v| Cow::Borrowed(v.as_str()))
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.keys().map(|k| Cow::Borrowed(k.as_str())).collect()
    }
}

/// Injector for [`std::process::Command`] that passes context to child
/// processes through environment variables.
///
/// Header names are converted to uppercase env names (`traceparent` →
/// `TRACEPARENT`).
impl Injector for std::process::Command {
    fn set(&mut self, key: &str, value: String) {
        self.env(key.to_uppercase(), value);
    }
}

/// Extractor reading context from this process's environment variables.
///
/// Lowercase header names are folded to uppercase env names, so the W3C
/// propagator transparently reads `TRACEPARENT`/`TRACESTATE` and the baggage
/// propagator reads `BAGGAGE`. Values are cached on first read: later `get`
/// calls for the same key return the originally observed value even if the
/// environment has changed underneath the carrier.
#[derive(Debug, Default)]
pub struct EnvExtractor {
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl EnvExtractor {
    /// Create a new extractor reading from the process environment.
    pub fn new() -> Self {
        EnvExtractor::default()
    }
}

impl Extractor for EnvExtractor {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        let name = key.to_uppercase();
        let mut cache = self.cache.lock().ok()?;
        cache
            .entry(name.clone())
            .or_insert_with(|| env::var(&name).ok())
            .clone()
            .map(Cow::Owned)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        env::vars().map(|(k, _)| Cow::Owned(k.to_lowercase())).collect()
    }
}

/// Wire-format hex fields must be lowercase; uppercase or sign characters
/// accepted by integer parsing are rejected up front.
pub(crate) fn valid_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
