//! Ambient schedule context.
//!
//! A continuation registered against a deferred handle may ask to be
//! marshaled back onto the context that was current at registration time (a
//! UI thread, a single-threaded executor, a test harness). This module holds
//! that ambient context as a thread-local so the handle can capture it when a
//! registration opts in.
//!
//! Capture is strictly opt-in: the default await path never reads the current
//! context, which is the primary way the dual-mode future differs from a
//! context-capturing one. Only
//! [`Presto::configure`](crate::future::Presto::configure) with `true`
//! captures it.
//!
//! Ordering between continuations posted onto a context follows that
//! context's own rules; the future machinery only guarantees each captured
//! continuation is posted exactly once, on settle.

use std::cell::RefCell;
use std::sync::Arc;

/// A continuation scheduled onto a context or run inline.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// A scheduling surface continuations can be marshaled onto.
pub trait ScheduleContext: Send + Sync {
    /// Posts a continuation onto this context.
    fn post(&self, continuation: Continuation);
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn ScheduleContext>>> = const { RefCell::new(None) };
}

/// Returns the context current on this thread, if one is installed.
#[must_use]
pub fn current() -> Option<Arc<dyn ScheduleContext>> {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// Installs `context` as current on this thread until the guard drops.
///
/// Guards nest: dropping one restores whatever was current when it was
/// created.
#[must_use = "dropping the guard immediately uninstalls the context"]
pub fn enter(context: Arc<dyn ScheduleContext>) -> ContextGuard {
    let previous = CURRENT.with(|cell| cell.borrow_mut().replace(context));
    ContextGuard { previous }
}

/// Restores the previously current context on drop.
pub struct ContextGuard {
    previous: Option<Arc<dyn ScheduleContext>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|cell| *cell.borrow_mut() = previous);
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard").finish_non_exhaustive()
    }
}
