use crate::trace::{SpanId, TraceFlags, TraceId};
use std::str::FromStr;
use thiserror::Error;

/// Vendor-specific trace configuration, propagated as the W3C `tracestate`
/// header.
///
/// A `TraceState` is an ordered list of key/value pairs; it lets multiple
/// tracing systems participate in the same trace. Keys and values are
/// validated against the [W3C trace-context specification], and the list
/// order is preserved verbatim across a propagation round trip.
///
/// [W3C trace-context specification]: https://www.w3.org/TR/trace-context/#tracestate-header
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Vec<(String, String)>);

impl TraceState {
    /// The empty `TraceState`.
    pub const NONE: TraceState = TraceState(Vec::new());

    /// Validates a list-member key per the [W3C trace-context key grammar].
    ///
    /// [W3C trace-context key grammar]: https://www.w3.org/TR/trace-context/#key
    fn valid_key(key: &str) -> bool {
        if key.is_empty() || key.len() > 256 {
            return false;
        }

        fn valid_part(part: &str) -> bool {
            let bytes = part.as_bytes();
            !bytes.is_empty()
                && (bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit())
                && bytes.iter().all(|&b| {
                    b.is_ascii_lowercase()
                        || b.is_ascii_digit()
                        || matches!(b, b'_' | b'-' | b'*' | b'/')
                })
        }

        let mut parts = key.splitn(3, '@');
        match (parts.next(), parts.next(), parts.next()) {
            // multi-tenant form: `tenant@system`, system part at most 14 chars
            (Some(tenant), Some(system), None) => {
                valid_part(tenant) && valid_part(system) && system.len() <= 14
            }
            (Some(simple), None, None) => valid_part(simple),
            _ => false,
        }
    }

    /// Validates a list-member value per the [W3C trace-context value grammar].
    ///
    /// [W3C trace-context value grammar]: https://www.w3.org/TR/trace-context/#value
    fn valid_value(value: &str) -> bool {
        value.len() <= 256
            && value
                .bytes()
                .all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
    }

    /// Creates a `TraceState` from a key/value collection, preserving order.
    ///
    /// # Examples
    ///
    /// ```
    /// use context_propagation::trace::TraceState;
    ///
    /// let ts = TraceState::from_key_value([("foo", "bar"), ("apple", "banana")]).unwrap();
    /// assert_eq!(ts.header(), "foo=bar,apple=banana");
    /// ```
    pub fn from_key_value<T, K, V>(entries: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        entries
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !TraceState::valid_key(&key) {
                    return Err(TraceStateError::Key(key));
                }
                if !TraceState::valid_value(&value) {
                    return Err(TraceStateError::Value(value));
                }
                Ok((key, value))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TraceState)
    }

    /// Retrieves the value for a given key, if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a new `TraceState` with the key/value pair inserted at the
    /// front, replacing any previous entry for the key.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(&key) {
            return Err(TraceStateError::Key(key));
        }
        if !TraceState::valid_value(&value) {
            return Err(TraceStateError::Value(value));
        }

        let mut entries = Vec::with_capacity(self.0.len() + 1);
        entries.push((key.clone(), value));
        entries.extend(self.0.iter().filter(|(k, _)| *k != key).cloned());

        Ok(TraceState(entries))
    }

    /// Returns a new `TraceState` without the entry for `key`.
    ///
    /// A key that is not present leaves the content unchanged; an invalid key
    /// is an error.
    pub fn delete<K: Into<String>>(&self, key: K) -> Result<TraceState, TraceStateError> {
        let key = key.into();
        if !TraceState::valid_key(&key) {
            return Err(TraceStateError::Key(key));
        }

        Ok(TraceState(
            self.0.iter().filter(|(k, _)| *k != key).cloned().collect(),
        ))
    }

    /// Serializes this `TraceState` into the `tracestate` header value:
    /// entries joined with `,`, each key and value separated by `=`.
    pub fn header(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for member in s.split_terminator(',') {
            match member.split_once('=') {
                Some((key, value)) => entries.push((key.trim(), value.trim())),
                None => return Err(TraceStateError::List(member.to_string())),
            }
        }

        TraceState::from_key_value(entries)
    }
}

/// Error returned by [`TraceState`] operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key violates the W3C trace-context key grammar.
    #[error("{0} is not a valid tracestate key, see https://www.w3.org/TR/trace-context/#key")]
    Key(String),

    /// The value violates the W3C trace-context value grammar.
    #[error("{0} is not a valid tracestate value, see https://www.w3.org/TR/trace-context/#value")]
    Value(String),

    /// A list member is not a `key=value` pair.
    #[error("{0} is not a valid tracestate list member, see https://www.w3.org/TR/trace-context/#list")]
    List(String),
}

/// The immutable, serializable identity of a span.
///
/// A `SpanContext` is what propagators move across process boundaries:
/// trace id, span id, trace flags, the vendor [`TraceState`], and whether the
/// identity was received from a remote parent.
///
/// Extraction failures are represented as an *invalid* span context (zero
/// trace or span id) rather than as an error; check [`is_valid`] before
/// trusting an extracted identity.
///
/// [`is_valid`]: SpanContext::is_valid
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context.
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Create an invalid empty span context.
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a new `SpanContext`.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The [`TraceId`] of this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] of this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The [`TraceFlags`] of this span context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if both the trace id and the span id are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if this identity was propagated from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor [`TraceState`] carried with this span context.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}
