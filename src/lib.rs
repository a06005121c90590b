//! Vendor-neutral context propagation for distributed systems.
//!
//! This crate provides the plumbing needed to carry cross-cutting values (an
//! active span, user-defined baggage) through a call graph and across process
//! boundaries, without threading them through every function signature:
//!
//! - **[`Context`]**: an immutable, cheaply shareable chain of key/value
//!   entries. "Writing" to a context produces a new context that shares the
//!   old one's storage, so snapshots taken at any point stay valid forever.
//! - **[`runtime`]**: the per-thread "current context" stack. Contexts are
//!   made current with [`Context::attach`], which returns a [`ContextToken`]
//!   that restores the previous context when detached or dropped.
//! - **[`propagation`]**: the [`TextMapPropagator`] abstraction plus concrete
//!   wire formats — W3C `traceparent`/`tracestate`, B3 (single and multi
//!   header), Jaeger `uber-trace-id`, and W3C `baggage` — and a composite
//!   propagator that chains them with deterministic conflict resolution.
//! - **[`global`]**: the process-wide propagator slot, set once at startup.
//!
//! Malformed or missing wire data never raises an error from this crate: a
//! failed extraction simply yields a context whose span context is invalid
//! (see [`trace::SpanContext::is_valid`]), and injection with an invalid span
//! context writes no headers at all.
//!
//! # Examples
//!
//! ```
//! use context_propagation::{
//!     propagation::{TextMapPropagator, TraceContextPropagator},
//!     Context,
//! };
//! use std::collections::HashMap;
//!
//! // Inbound: extract the upstream trace identity from carrier headers.
//! let mut headers = HashMap::new();
//! headers.insert(
//!     "traceparent".to_string(),
//!     "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
//! );
//! let propagator = TraceContextPropagator::new();
//! let cx = propagator.extract(&headers);
//!
//! // Make it current for the duration of this unit of work.
//! let _token = cx.attach();
//!
//! // Outbound: inject the current context into the next hop's headers.
//! let mut outbound = HashMap::new();
//! propagator.inject(&mut outbound);
//! assert!(outbound.contains_key("traceparent"));
//! ```
#![warn(missing_docs, unreachable_pub, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod context;
mod trace_ids;

pub mod baggage;
pub mod global;
pub mod propagation;
pub mod runtime;
pub mod trace;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use context::{Context, ContextValue};
pub use runtime::{ContextToken, RuntimeContextStorage, ThreadLocalContextStorage};
#[doc(inline)]
pub use propagation::TextMapPropagator;

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
