//! The dual-mode future value.
//!
//! [`Presto`] holds either an inline result or a [`Deferred`] handle —
//! exactly one is live for any instance. Operations that usually finish on
//! their first step return it so the common case carries the result inline,
//! with no shared handle allocated; only an operation that actually suspends
//! pays for the heap-allocated handle.
//!
//! Awaiting a `Presto` never marshals the continuation back onto the ambient
//! schedule context. That makes it safe to return from library code without
//! sprinkling opt-outs at every await point; callers that do want context
//! restoration opt in with [`Presto::configure`].
//!
//! Unlike pooled future optimizations, the value wraps a plain handle
//! reference, so it is safe to await more than once and to read the result
//! after awaiting.

use std::fmt;
use std::future::IntoFuture;
use std::hash::{Hash, Hasher};

use crate::deferred::Deferred;
use crate::error::Failure;

mod configured;
mod waiter;

pub use configured::{Configured, ConfiguredWaiter};
pub use waiter::Waiter;

/// Backing storage. Exactly one side is live for any instance.
enum Backing<T> {
    /// Result available synchronously; no handle was ever allocated.
    Value(T),
    /// The handle is the authoritative source of the result.
    Deferred(Deferred<T>),
}

/// A future value holding either an inline result or a deferred handle.
///
/// Immutable once constructed: no field is reassigned, so concurrent reads
/// need no synchronization and clones are always safe to hand out.
pub struct Presto<T> {
    backing: Backing<T>,
}

impl<T> Presto<T> {
    /// Wraps an already-available result. Never allocates.
    #[must_use]
    pub const fn from_value(value: T) -> Self {
        Self {
            backing: Backing::Value(value),
        }
    }

    /// Wraps a deferred handle representing the operation.
    #[must_use]
    pub const fn from_deferred(handle: Deferred<T>) -> Self {
        Self {
            backing: Backing::Deferred(handle),
        }
    }

    /// True when no handle is present, or the handle has settled.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        match &self.backing {
            Backing::Value(_) => true,
            Backing::Deferred(handle) => handle.is_settled(),
        }
    }

    /// True when the result is (or will trivially be) a success value.
    #[must_use]
    pub fn is_completed_successfully(&self) -> bool {
        match &self.backing {
            Backing::Value(_) => true,
            Backing::Deferred(handle) => handle.is_completed_successfully(),
        }
    }

    /// True only when a handle is present and it faulted.
    ///
    /// An inline result can never represent a fault.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        match &self.backing {
            Backing::Value(_) => false,
            Backing::Deferred(handle) => handle.is_faulted(),
        }
    }

    /// True only when a handle is present and it was canceled.
    ///
    /// An inline result can never represent a canceled operation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        match &self.backing {
            Backing::Value(_) => false,
            Backing::Deferred(handle) => handle.is_canceled(),
        }
    }

    /// Configures whether awaiting restores the ambient schedule context.
    ///
    /// `configure(false)` is the default await behavior spelled out.
    #[must_use]
    pub fn configure(self, restore_context: bool) -> Configured<T> {
        Configured::new(self, restore_context)
    }

    /// The backing handle, when one is present.
    pub(crate) fn backing_deferred(&self) -> Option<&Deferred<T>> {
        match &self.backing {
            Backing::Value(_) => None,
            Backing::Deferred(handle) => Some(handle),
        }
    }
}

impl<T: Clone> Presto<T> {
    /// Returns the result.
    ///
    /// With no handle present this returns the inline value immediately —
    /// there is no blocking and no failure path. With a handle present it
    /// forces synchronous completion: blocks until the handle settles,
    /// re-raises a fault with its original payload, and panics on
    /// cancellation. Callers that already confirmed completion never block.
    #[must_use]
    pub fn result(&self) -> T {
        match &self.backing {
            Backing::Value(value) => value.clone(),
            Backing::Deferred(handle) => handle.result(),
        }
    }

    /// Non-panicking companion to [`result`](Self::result).
    ///
    /// # Errors
    ///
    /// The operation's [`Failure`] when it faulted or was canceled.
    pub fn try_result(&self) -> Result<T, Failure> {
        match &self.backing {
            Backing::Value(value) => Ok(value.clone()),
            Backing::Deferred(handle) => handle.try_result(),
        }
    }

    /// Materializes a conventional handle for this value.
    ///
    /// Returns the wrapped handle if one exists, otherwise manufactures a new
    /// already-completed handle. The manufactured handle is not cached back
    /// into this instance: caching would silently switch equality and hashing
    /// from value-based to identity-based. Two calls on a value-backed
    /// instance therefore return two distinct handles.
    #[must_use]
    pub fn to_deferred(&self) -> Deferred<T> {
        match &self.backing {
            Backing::Value(value) => Deferred::completed(value.clone()),
            Backing::Deferred(handle) => handle.clone(),
        }
    }

    /// An awaiter for this value that never restores the ambient context.
    #[must_use]
    pub fn wait(&self) -> Waiter<T> {
        Waiter::new(self.clone())
    }
}

impl<T: Clone> Clone for Presto<T> {
    fn clone(&self) -> Self {
        match &self.backing {
            Backing::Value(value) => Self::from_value(value.clone()),
            Backing::Deferred(handle) => Self::from_deferred(handle.clone()),
        }
    }
}

impl<T: Default> Default for Presto<T> {
    /// A default instance represents an already-successfully-completed
    /// operation holding `T::default()`.
    fn default() -> Self {
        Self::from_value(T::default())
    }
}

impl<T> From<T> for Presto<T> {
    fn from(value: T) -> Self {
        Self::from_value(value)
    }
}

impl<T> From<Deferred<T>> for Presto<T> {
    fn from(handle: Deferred<T>) -> Self {
        Self::from_deferred(handle)
    }
}

impl<T: PartialEq> PartialEq for Presto<T> {
    /// With a handle on either side, equality is handle identity; with no
    /// handles, inline values compare by `T`'s equality. A value-backed
    /// instance never equals a handle-backed one, even when the outcomes
    /// match — materializing a handle changes identity semantics, see
    /// [`Presto::to_deferred`].
    fn eq(&self, other: &Self) -> bool {
        match (&self.backing, &other.backing) {
            (Backing::Value(a), Backing::Value(b)) => a == b,
            (Backing::Deferred(a), Backing::Deferred(b)) => a.same_handle(b),
            _ => false,
        }
    }
}

impl<T: Eq> Eq for Presto<T> {}

impl<T: Hash> Hash for Presto<T> {
    /// Follows equality: value-backed instances hash the value, handle-backed
    /// instances hash the handle identity.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.backing {
            Backing::Value(value) => value.hash(state),
            Backing::Deferred(handle) => handle.hash(state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Presto<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backing {
            Backing::Value(value) => f.debug_tuple("Presto::Value").field(value).finish(),
            Backing::Deferred(handle) => f.debug_tuple("Presto::Deferred").field(handle).finish(),
        }
    }
}

impl<T: Clone + fmt::Display> fmt::Display for Presto<T> {
    /// Shows the result when completed successfully, and nothing otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_completed_successfully() {
            write!(f, "{}", self.result())
        } else {
            Ok(())
        }
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Presto<T> {
    type Output = T;
    type IntoFuture = Waiter<T>;

    fn into_future(self) -> Self::IntoFuture {
        Waiter::new(self)
    }
}
