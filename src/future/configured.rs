//! Configured awaitable and awaiter.
//!
//! [`Presto::configure`] returns a [`Configured`] capturing the value and a
//! flag; its awaiter reproduces the default awaiter's contract exactly,
//! except continuation registration passes the captured flag instead of a
//! hard-coded "do not restore".

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::Presto;
use super::waiter::{WakerSlot, poll_value, register};

/// A [`Presto`] paired with an explicit context-restoration choice.
pub struct Configured<T> {
    value: Presto<T>,
    restore_context: bool,
}

impl<T> Configured<T> {
    pub(super) const fn new(value: Presto<T>, restore_context: bool) -> Self {
        Self {
            value,
            restore_context,
        }
    }

    /// Whether awaiting marshals the continuation back onto the context
    /// captured at registration.
    #[must_use]
    pub const fn restores_context(&self) -> bool {
        self.restore_context
    }
}

impl<T: Clone> Configured<T> {
    /// An awaiter carrying this configuration.
    #[must_use]
    pub fn waiter(&self) -> ConfiguredWaiter<T> {
        ConfiguredWaiter {
            value: self.value.clone(),
            restore_context: self.restore_context,
            slot: None,
        }
    }
}

impl<T: Clone> Clone for Configured<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            restore_context: self.restore_context,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Configured<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configured")
            .field("value", &self.value)
            .field("restore_context", &self.restore_context)
            .finish()
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Configured<T> {
    type Output = T;
    type IntoFuture = ConfiguredWaiter<T>;

    fn into_future(self) -> Self::IntoFuture {
        ConfiguredWaiter {
            value: self.value,
            restore_context: self.restore_context,
            slot: None,
        }
    }
}

/// Awaiter for a [`Configured`] value.
///
/// Identical to [`Waiter`](super::Waiter) except the captured flag decides
/// whether the continuation is posted back onto the ambient context.
pub struct ConfiguredWaiter<T> {
    value: Presto<T>,
    restore_context: bool,
    slot: Option<Arc<WakerSlot>>,
}

impl<T> ConfiguredWaiter<T> {
    /// Whether the awaited value has completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.value.is_completed()
    }

    /// Registers `continuation` to run once the value completes, marshaled
    /// per the captured flag.
    pub fn on_completed(&self, continuation: impl FnOnce() + Send + 'static) {
        register(&self.value, self.restore_context, continuation);
    }
}

impl<T: Clone> ConfiguredWaiter<T> {
    /// Extracts the result, re-raising faults with their original payload.
    #[must_use]
    pub fn result(&self) -> T {
        self.value.result()
    }
}

// Same rationale as the default awaiter: no pin projection into fields.
impl<T> Unpin for ConfiguredWaiter<T> {}

impl<T: Clone + Send + 'static> Future for ConfiguredWaiter<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        poll_value(&this.value, &mut this.slot, this.restore_context, cx)
    }
}

impl<T: fmt::Debug> fmt::Debug for ConfiguredWaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredWaiter")
            .field("value", &self.value)
            .field("restore_context", &self.restore_context)
            .finish_non_exhaustive()
    }
}
