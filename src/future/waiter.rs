//! The default awaiter.
//!
//! A suspension point queries [`Waiter::is_completed`] to decide whether to
//! suspend at all, extracts with [`Waiter::result`], and parks a continuation
//! with [`Waiter::on_completed`]. The default awaiter never restores the
//! ambient schedule context; [`Presto::configure`] is the opt-in.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use super::Presto;
use crate::context;

/// Wakes the most recently polled task when the awaited value settles.
pub(super) struct WakerSlot {
    waker: Mutex<Option<Waker>>,
}

impl WakerSlot {
    pub(super) fn new(waker: Waker) -> Arc<Self> {
        Arc::new(Self {
            waker: Mutex::new(Some(waker)),
        })
    }

    /// Records the waker from the latest poll; only that one is woken.
    pub(super) fn update(&self, waker: &Waker) {
        let mut slot = self.waker.lock();
        match &*slot {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    pub(super) fn wake(&self) {
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }
}

/// Registers `continuation` against whichever backing `value` holds.
///
/// An inline result dispatches immediately; a handle-backed value registers
/// on the handle directly, so an already-configured await never manufactures
/// a second handle on the way down.
pub(super) fn register<T>(
    value: &Presto<T>,
    restore_context: bool,
    continuation: impl FnOnce() + Send + 'static,
) {
    match value.backing_deferred() {
        Some(handle) => handle.on_settled(restore_context, continuation),
        None => dispatch_now(restore_context, continuation),
    }
}

fn dispatch_now(restore_context: bool, continuation: impl FnOnce() + Send + 'static) {
    if restore_context {
        if let Some(current) = context::current() {
            current.post(Box::new(continuation));
            return;
        }
    }
    continuation();
}

/// Polls `value`, parking the task's waker behind `slot` while incomplete.
///
/// Shared by the default and configured awaiters; only the context flag
/// differs between them.
pub(super) fn poll_value<T: Clone + Send + 'static>(
    value: &Presto<T>,
    slot: &mut Option<Arc<WakerSlot>>,
    restore_context: bool,
    cx: &mut Context<'_>,
) -> Poll<T> {
    if value.is_completed() {
        return Poll::Ready(value.result());
    }
    match slot {
        Some(slot) => {
            slot.update(cx.waker());
            // A settle racing the update has already consumed the previous
            // waker and scheduled a re-poll; answer it then.
            if value.is_completed() {
                return Poll::Ready(value.result());
            }
        }
        None => {
            let parked = WakerSlot::new(cx.waker().clone());
            *slot = Some(Arc::clone(&parked));
            register(value, restore_context, move || parked.wake());
        }
    }
    Poll::Pending
}

/// Awaiter for a [`Presto`] that never restores the ambient context.
///
/// Implements [`Future`], so `value.await` goes through here. Awaiting a
/// faulted value re-raises the fault from `poll`; awaiting a canceled one
/// panics with the cancellation reason.
pub struct Waiter<T> {
    value: Presto<T>,
    slot: Option<Arc<WakerSlot>>,
}

impl<T> Waiter<T> {
    pub(crate) fn new(value: Presto<T>) -> Self {
        Self { value, slot: None }
    }

    /// Whether the awaited value has completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.value.is_completed()
    }

    /// Registers `continuation` to run once the value completes, explicitly
    /// configured to not marshal back onto the ambient context.
    pub fn on_completed(&self, continuation: impl FnOnce() + Send + 'static) {
        register(&self.value, false, continuation);
    }
}

impl<T: Clone> Waiter<T> {
    /// Extracts the result, re-raising faults with their original payload so
    /// stack attribution stays with the awaited operation.
    #[must_use]
    pub fn result(&self) -> T {
        self.value.result()
    }
}

// The awaiter never projects a pin into its fields; it is movable regardless
// of `T`.
impl<T> Unpin for Waiter<T> {}

impl<T: Clone + Send + 'static> Future for Waiter<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        poll_value(&this.value, &mut this.slot, false, cx)
    }
}

impl<T: fmt::Debug> fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
