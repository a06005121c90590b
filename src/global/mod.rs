//! Process-wide defaults.
//!
//! Instrumented libraries should not need to know which wire formats an
//! application has chosen. The application installs its propagator once with
//! [`set_text_map_propagator`], and libraries borrow it through
//! [`get_text_map_propagator`]:
//!
//! ```
//! use context_propagation::global;
//! use context_propagation::propagation::TraceContextPropagator;
//! use std::collections::HashMap;
//!
//! global::set_text_map_propagator(TraceContextPropagator::new());
//!
//! let mut headers: HashMap<String, String> = HashMap::new();
//! let cx = global::get_text_map_propagator(|propagator| propagator.extract(&headers));
//! ```
//!
//! Until a propagator is installed, the slot holds a
//! [`NoopTextMapPropagator`] that reads and writes nothing.

mod internal_logging;

use crate::propagation::{NoopTextMapPropagator, TextMapPropagator};
use std::sync::{OnceLock, RwLock};

/// The current global `TextMapPropagator`.
static GLOBAL_TEXT_MAP_PROPAGATOR: OnceLock<RwLock<Box<dyn TextMapPropagator + Send + Sync>>> =
    OnceLock::new();

/// Fallback used when the global slot's lock is poisoned.
static DEFAULT_TEXT_MAP_PROPAGATOR: OnceLock<NoopTextMapPropagator> = OnceLock::new();

#[inline]
fn global_text_map_propagator() -> &'static RwLock<Box<dyn TextMapPropagator + Send + Sync>> {
    GLOBAL_TEXT_MAP_PROPAGATOR.get_or_init(|| RwLock::new(Box::new(NoopTextMapPropagator::new())))
}

#[inline]
fn default_text_map_propagator() -> &'static NoopTextMapPropagator {
    DEFAULT_TEXT_MAP_PROPAGATOR.get_or_init(NoopTextMapPropagator::new)
}

/// Sets the given [`TextMapPropagator`] as the current global propagator.
///
/// Replaces whatever propagator was installed before; callers holding a
/// reference through [`get_text_map_propagator`] finish with the old one.
pub fn set_text_map_propagator<P: TextMapPropagator + Send + Sync + 'static>(propagator: P) {
    let _lock = global_text_map_propagator()
        .write()
        .map(|mut global_propagator| *global_propagator = Box::new(propagator));
}

/// Executes a closure with a reference to the current global
/// [`TextMapPropagator`].
pub fn get_text_map_propagator<T, F>(mut f: F) -> T
where
    F: FnMut(&dyn TextMapPropagator) -> T,
{
    global_text_map_propagator()
        .read()
        .map(|propagator| f(&**propagator))
        .unwrap_or_else(|_| {
            let default_propagator = default_text_map_propagator();
            f(default_propagator as &dyn TextMapPropagator)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::TraceContextPropagator;
    use std::collections::HashMap;

    // The global slot is process-wide state shared between tests, so one test
    // exercises the whole lifecycle.
    #[test]
    fn global_propagator_lifecycle() {
        // The default reads nothing.
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.insert(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        let cx = get_text_map_propagator(|p| p.extract(&carrier));
        assert!(cx.span_context().is_none());
        assert_eq!(get_text_map_propagator(|p| p.fields().count()), 0);

        // Installing a real propagator makes it visible to every caller.
        set_text_map_propagator(TraceContextPropagator::new());
        let cx = get_text_map_propagator(|p| p.extract(&carrier));
        assert!(cx.span_context().is_some_and(|sc| sc.is_valid()));

        // And a later install replaces it again.
        set_text_map_propagator(NoopTextMapPropagator::new());
        let cx = get_text_map_propagator(|p| p.extract(&carrier));
        assert!(cx.span_context().is_none());
    }
}
