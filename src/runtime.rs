//! The per-thread "current context" store and its attach/detach protocol.
//!
//! The runtime context is the only mutable state in this crate. It is a
//! per-thread stack of [`Context`] snapshots behind a process-wide, swappable
//! [`RuntimeContextStorage`] strategy. [`attach`] pushes a context and hands
//! back a [`ContextToken`]; [`detach`] pops only when the token matches the
//! top of the stack, which makes out-of-order detaches observable no-ops
//! instead of stack corruption.
//!
//! Nothing here blocks and nothing here panics: the worst outcome of misuse
//! is `detach` returning `false`.

use crate::{Context, ContextValue};
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, RwLock};

type SharedStorage = Arc<dyn RuntimeContextStorage + Send + Sync>;

/// The process-wide storage strategy slot.
static RUNTIME_CONTEXT_STORAGE: OnceLock<RwLock<SharedStorage>> = OnceLock::new();

#[inline]
fn storage_slot() -> &'static RwLock<SharedStorage> {
    RUNTIME_CONTEXT_STORAGE.get_or_init(|| RwLock::new(Arc::new(ThreadLocalContextStorage::new())))
}

/// Runs `f` against the active storage implementation.
///
/// Falls back to a fresh thread-local storage view if the slot lock was
/// poisoned; the propagation layer never surfaces lock errors.
fn with_storage<T>(f: impl FnOnce(&SharedStorage) -> T) -> T {
    match storage_slot().read() {
        Ok(storage) => f(&storage),
        Err(poisoned) => f(poisoned.get_ref()),
    }
}

/// A pluggable store for the current [`Context`].
///
/// Exactly one implementation is active per process (see [`set_storage`]).
/// The default, [`ThreadLocalContextStorage`], keeps one independent stack
/// per thread; alternative implementations can make the current context
/// follow fibers or other execution units without changing call sites.
pub trait RuntimeContextStorage: fmt::Debug {
    /// Returns the current context, or an empty context if none is attached.
    fn current(&self) -> Context;

    /// Makes `cx` the current context and returns the token required to
    /// detach it again.
    fn attach(&self, cx: Context) -> ContextToken;

    /// Restores the context that was current before `token`'s attach.
    ///
    /// Returns `false` without touching any state when `token` does not
    /// correspond to the innermost active attach.
    fn detach(&self, token: &ContextToken) -> bool;
}

/// The default [`RuntimeContextStorage`]: one independent context stack per
/// thread.
///
/// There is deliberately no cross-thread visibility of the current context.
/// Moving work to another thread means passing the `Context` value across and
/// re-attaching it there; the context itself is immutable and freely
/// shareable.
#[derive(Debug, Default)]
pub struct ThreadLocalContextStorage {
    _private: (),
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

impl ThreadLocalContextStorage {
    /// Create a new thread-local storage strategy.
    pub fn new() -> Self {
        ThreadLocalContextStorage { _private: () }
    }
}

impl RuntimeContextStorage for ThreadLocalContextStorage {
    fn current(&self) -> Context {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().last().cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn attach(&self, cx: Context) -> ContextToken {
        let _ = CONTEXT_STACK.try_with(|stack| stack.borrow_mut().push(cx.clone()));
        ContextToken::new(cx)
    }

    fn detach(&self, token: &ContextToken) -> bool {
        CONTEXT_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                // Identity check enforces LIFO discipline; a mismatched token
                // leaves the stack untouched.
                if stack.last() == Some(&token.context) {
                    stack.pop();
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false)
    }
}

/// A token returned by [`attach`], required to detach the context again.
///
/// Dropping an undetached token detaches automatically, so stack balance is
/// maintained across early returns and panics as long as tokens live in the
/// scope whose work they cover. Tokens are bound to the thread that created
/// them and are intentionally not `Send`.
pub struct ContextToken {
    context: Context,
    detached: bool,
    // Relies on a thread-local stack.
    _not_send: PhantomData<*const ()>,
}

impl ContextToken {
    fn new(context: Context) -> Self {
        ContextToken {
            context,
            detached: false,
            _not_send: PhantomData,
        }
    }
}

impl fmt::Debug for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextToken")
            .field("detached", &self.detached)
            .finish()
    }
}

impl Drop for ContextToken {
    fn drop(&mut self) {
        if !self.detached {
            let _ = with_storage(|storage| storage.detach(self));
        }
    }
}

/// Returns a snapshot of the current context.
pub fn current() -> Context {
    with_storage(|storage| storage.current())
}

/// Makes `cx` the current context until the returned token is detached or
/// dropped.
pub fn attach(cx: Context) -> ContextToken {
    with_storage(|storage| storage.attach(cx))
}

/// Explicitly detaches a token, restoring the previously current context.
///
/// Returns `true` if the token matched the innermost active attach and the
/// context was restored. Returns `false` for a double detach or an
/// out-of-order detach; the stack is left untouched in either case, and the
/// token can still succeed later once the contexts attached above it are
/// gone.
pub fn detach(token: &mut ContextToken) -> bool {
    if token.detached {
        return false;
    }
    let detached = with_storage(|storage| storage.detach(token));
    if detached {
        token.detached = true;
    }
    detached
}

/// Returns the value for `key` in the given context, or in the current
/// context when `cx` is `None`.
pub fn value(key: &str, cx: Option<&Context>) -> ContextValue {
    match cx {
        Some(cx) => cx.value(key),
        None => current().value(key),
    }
}

/// Returns a new context extending the given context (or the current context
/// when `cx` is `None`) with `key`/`value`.
///
/// The new context is *not* attached; callers decide whether to make it
/// current.
pub fn with_value(
    key: impl Into<Cow<'static, str>>,
    val: impl Into<ContextValue>,
    cx: Option<&Context>,
) -> Context {
    match cx {
        Some(cx) => cx.with_value(key, val),
        None => current().with_value(key, val),
    }
}

/// Replaces the process-wide [`RuntimeContextStorage`] implementation.
///
/// Intended to be called once at startup, before any context is attached.
/// Swapping the storage later is supported but lossy: frames that exist only
/// in the old storage's view are abandoned, not migrated.
pub fn set_storage<S>(storage: S)
where
    S: RuntimeContextStorage + Send + Sync + 'static,
{
    if let Ok(mut slot) = storage_slot().write() {
        *slot = Arc::new(storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContextValue;

    #[test]
    fn current_on_empty_stack_is_empty_context() {
        assert_eq!(current(), Context::new());
        assert_eq!(current().value("k"), ContextValue::Empty);
    }

    #[test]
    fn attach_makes_context_current() {
        let cx = Context::new().with_value("k", ContextValue::I64(7));
        let mut token = attach(cx.clone());

        assert_eq!(current(), cx);
        assert!(detach(&mut token));
        assert_eq!(current(), Context::new());
    }

    #[test]
    fn detach_requires_lifo_order() {
        let c1 = Context::new().with_value("n", ContextValue::I64(1));
        let c2 = Context::new().with_value("n", ContextValue::I64(2));

        let mut t1 = attach(c1.clone());
        let mut t2 = attach(c2.clone());

        // c2 is on top; detaching c1's token is a no-op.
        assert!(!detach(&mut t1));
        assert_eq!(current(), c2);

        assert!(detach(&mut t2));
        assert_eq!(current(), c1);

        // Now c1's token matches the top and succeeds.
        assert!(detach(&mut t1));
        assert_eq!(current(), Context::new());
    }

    #[test]
    fn double_detach_is_a_noop() {
        let mut token = attach(Context::new().with_value("k", ContextValue::Bool(true)));

        assert!(detach(&mut token));
        assert!(!detach(&mut token));
        assert_eq!(current(), Context::new());
    }

    #[test]
    fn dropped_token_detaches() {
        let cx = Context::new().with_value("k", ContextValue::U64(1));
        {
            let _token = attach(cx.clone());
            assert_eq!(current(), cx);
        }
        assert_eq!(current(), Context::new());
    }

    #[test]
    fn out_of_order_drop_resolves_safely() {
        let c1 = Context::new().with_value("n", ContextValue::I64(1));
        let c2 = Context::new().with_value("n", ContextValue::I64(2));

        let t1 = attach(c1.clone());
        let t2 = attach(c2.clone());

        // Dropping t1 first cannot pop c2's frame.
        drop(t1);
        assert_eq!(current(), c2);

        // Dropping t2 pops its own frame; c1's frame is now stranded until
        // the thread stack unwinds further, which is the documented cost of
        // out-of-order destruction.
        drop(t2);
        assert_eq!(current(), c1);

        // Clean up the stranded frame for the other tests on this thread.
        let mut rescue = ContextToken::new(c1);
        assert!(detach(&mut rescue));
    }

    #[test]
    fn identical_content_does_not_satisfy_detach() {
        let attached = Context::new().with_value("k", ContextValue::I64(1));
        let lookalike = Context::new().with_value("k", ContextValue::I64(1));

        let mut real = attach(attached);
        let mut fake = ContextToken::new(lookalike);

        assert!(!detach(&mut fake));
        assert!(detach(&mut real));
    }

    #[test]
    fn value_helpers_default_to_current_context() {
        let cx = Context::new().with_value("k", ContextValue::I64(3));
        let _token = attach(cx);

        assert_eq!(value("k", None), ContextValue::I64(3));

        let extended = with_value("j", ContextValue::I64(4), None);
        // Extending did not implicitly attach.
        assert_eq!(value("j", None), ContextValue::Empty);
        assert_eq!(extended.value("j"), ContextValue::I64(4));
        assert_eq!(value("j", Some(&extended)), ContextValue::I64(4));
    }

    #[test]
    fn threads_have_independent_stacks() {
        let cx = Context::new().with_value("k", ContextValue::I64(1));
        let _token = attach(cx);

        std::thread::spawn(|| {
            assert_eq!(current(), Context::new());
        })
        .join()
        .expect("spawned thread panicked");
    }
}
