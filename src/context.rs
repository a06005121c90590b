use crate::baggage::{Baggage, BAGGAGE_KEY};
use crate::trace::{Span, SpanContext, SPAN_KEY};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// An execution-scoped collection of values.
///
/// A [`Context`] is a propagation mechanism which carries execution-scoped
/// values across API boundaries and between logically associated execution
/// units. Cross-cutting concerns access their data in-process using the same
/// shared context object.
///
/// Contexts are immutable: every write operation returns a *new* context
/// whose storage shares the original's. Internally a context is a persistent
/// singly-linked chain of entries, so "setting" a key is O(1) and lookups walk
/// from the most recent entry toward the oldest, returning the first match.
/// This makes contexts freely shareable across threads without locking.
///
/// Two contexts compare equal only when they are the *same* chain (identity,
/// not structure). Independently built contexts with identical entries are not
/// equal; this is what lets the runtime stack validate detach tokens cheaply.
///
/// # Examples
///
/// ```
/// use context_propagation::{Context, ContextValue};
///
/// let cx = Context::new().with_value("tenant", ContextValue::I64(42));
/// let cx2 = cx.with_value("tenant", ContextValue::I64(7));
///
/// // The original context is unmodified; the newest entry wins in `cx2`.
/// assert_eq!(cx.value("tenant"), ContextValue::I64(42));
/// assert_eq!(cx2.value("tenant"), ContextValue::I64(7));
/// assert!(!cx.has_key("missing"));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<ContextNode>>,
}

struct ContextNode {
    key: Cow<'static, str>,
    value: ContextValue,
    tail: Option<Arc<ContextNode>>,
}

/// A value stored in a [`Context`].
///
/// This is a closed set of variants rather than an open `Any`-style slot:
/// the propagation layer only ever needs to move these payloads around, and
/// a closed enum keeps inject/extract code exhaustively checkable.
///
/// The reference-counted variants ([`ContextValue::Span`],
/// [`ContextValue::SpanContext`], [`ContextValue::Baggage`]) share ownership
/// with every context derived from the one they were stored in.
#[derive(Clone, Default)]
pub enum ContextValue {
    /// No value. Lookups for absent keys return this variant.
    #[default]
    Empty,
    /// A boolean value.
    Bool(bool),
    /// A signed 64-bit integer.
    I64(i64),
    /// An unsigned 64-bit integer.
    U64(u64),
    /// A 64-bit float.
    F64(f64),
    /// A reference to an active span.
    Span(Arc<dyn Span + Send + Sync>),
    /// A span context, typically extracted from a remote parent.
    SpanContext(Arc<SpanContext>),
    /// A baggage payload.
    Baggage(Arc<Baggage>),
}

impl ContextValue {
    /// Returns `true` if this is the [`ContextValue::Empty`] variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, ContextValue::Empty)
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ContextValue::Empty, ContextValue::Empty) => true,
            (ContextValue::Bool(a), ContextValue::Bool(b)) => a == b,
            (ContextValue::I64(a), ContextValue::I64(b)) => a == b,
            (ContextValue::U64(a), ContextValue::U64(b)) => a == b,
            (ContextValue::F64(a), ContextValue::F64(b)) => a == b,
            // Span handles have no structural equality; compare identity.
            (ContextValue::Span(a), ContextValue::Span(b)) => Arc::ptr_eq(a, b),
            (ContextValue::SpanContext(a), ContextValue::SpanContext(b)) => a == b,
            (ContextValue::Baggage(a), ContextValue::Baggage(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Empty => f.write_str("Empty"),
            ContextValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            ContextValue::I64(v) => f.debug_tuple("I64").field(v).finish(),
            ContextValue::U64(v) => f.debug_tuple("U64").field(v).finish(),
            ContextValue::F64(v) => f.debug_tuple("F64").field(v).finish(),
            ContextValue::Span(s) => f.debug_tuple("Span").field(s.span_context()).finish(),
            ContextValue::SpanContext(sc) => f.debug_tuple("SpanContext").field(sc).finish(),
            ContextValue::Baggage(b) => f.debug_tuple("Baggage").field(b).finish(),
        }
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        ContextValue::I64(value)
    }
}

impl From<u64> for ContextValue {
    fn from(value: u64) -> Self {
        ContextValue::U64(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        ContextValue::F64(value)
    }
}

impl From<SpanContext> for ContextValue {
    fn from(value: SpanContext) -> Self {
        ContextValue::SpanContext(Arc::new(value))
    }
}

impl From<Baggage> for ContextValue {
    fn from(value: Baggage) -> Self {
        ContextValue::Baggage(Arc::new(value))
    }
}

impl Context {
    /// Creates an empty `Context`.
    ///
    /// An empty context allocates nothing; all lookups return
    /// [`ContextValue::Empty`].
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a snapshot of the current thread's context.
    ///
    /// This reads the top of the runtime context stack; see
    /// [`runtime::current`](crate::runtime::current).
    pub fn current() -> Self {
        crate::runtime::current()
    }

    /// Returns a new context containing the entries of `self` plus the given
    /// key/value entry.
    ///
    /// The new entry shadows any previous entry with the same key; the
    /// shadowed entry remains reachable from older context snapshots.
    pub fn with_value(
        &self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<ContextValue>,
    ) -> Self {
        Context {
            head: Some(Arc::new(ContextNode {
                key: key.into(),
                value: value.into(),
                tail: self.head.clone(),
            })),
        }
    }

    /// Returns a new context extended with every key/value pair produced by
    /// the iterator.
    ///
    /// The pairs are linked in iteration order with the first pair at the
    /// head of the chain, so when the iterable repeats a key its *first*
    /// occurrence wins the lookup, and every new pair shadows existing
    /// entries. An empty iterator returns a context identical to `self`,
    /// including under identity comparison.
    pub fn with_values<K, I>(&self, entries: I) -> Self
    where
        K: Into<Cow<'static, str>>,
        I: IntoIterator<Item = (K, ContextValue)>,
    {
        let entries = entries.into_iter().collect::<Vec<_>>();
        let head = entries
            .into_iter()
            .rev()
            .fold(self.head.clone(), |tail, (key, value)| {
                Some(Arc::new(ContextNode {
                    key: key.into(),
                    value,
                    tail,
                }))
            });

        Context { head }
    }

    /// Returns the value for `key`, or [`ContextValue::Empty`] if the key is
    /// not present.
    ///
    /// Runs in O(depth) over the context chain; the most recently set entry
    /// for a key wins.
    pub fn value(&self, key: &str) -> ContextValue {
        let mut node = self.head.as_deref();
        while let Some(entry) = node {
            if entry.key == key {
                return entry.value.clone();
            }
            node = entry.tail.as_deref();
        }

        ContextValue::Empty
    }

    /// Returns `true` if `key` is present with a non-empty value.
    pub fn has_key(&self, key: &str) -> bool {
        !self.value(key).is_empty()
    }

    /// Returns a new context with the given span recorded as the active span.
    pub fn with_span<S: Span + Send + Sync + 'static>(&self, span: S) -> Self {
        self.with_value(SPAN_KEY, ContextValue::Span(Arc::new(span)))
    }

    /// Returns a new context carrying a span context received from a remote
    /// parent.
    pub fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_value(SPAN_KEY, ContextValue::SpanContext(Arc::new(span_context)))
    }

    /// Returns the span context of the active span, if any.
    ///
    /// Resolves both locally started spans and remotely extracted span
    /// contexts. Returns `None` when no span is associated with this context;
    /// callers interested only in validity can treat that the same as an
    /// invalid span context.
    pub fn span_context(&self) -> Option<SpanContext> {
        match self.value(SPAN_KEY) {
            ContextValue::Span(span) => Some(span.span_context().clone()),
            ContextValue::SpanContext(sc) => Some((*sc).clone()),
            _ => None,
        }
    }

    /// Returns a new context carrying the given baggage.
    pub fn with_baggage(&self, baggage: Baggage) -> Self {
        self.with_value(BAGGAGE_KEY, ContextValue::Baggage(Arc::new(baggage)))
    }

    /// Returns the baggage associated with this context, if any.
    pub fn baggage(&self) -> Option<Arc<Baggage>> {
        match self.value(BAGGAGE_KEY) {
            ContextValue::Baggage(baggage) => Some(baggage),
            _ => None,
        }
    }

    /// Makes this context the current context for this thread.
    ///
    /// The returned token restores the previous context when passed to
    /// [`runtime::detach`](crate::runtime::detach) or when dropped. Tokens
    /// must be detached in reverse attach order; an out-of-order detach is a
    /// detectable no-op, never a corruption.
    pub fn attach(self) -> crate::ContextToken {
        crate::runtime::attach(self)
    }

    fn depth(&self) -> usize {
        let mut len = 0;
        let mut node = self.head.as_deref();
        while let Some(entry) = node {
            len += 1;
            node = entry.tail.as_deref();
        }
        len
    }
}

impl PartialEq for Context {
    /// Identity equality: two contexts are equal only when they share the
    /// same head entry (or are both empty).
    fn eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.depth())
            .finish()
    }
}
