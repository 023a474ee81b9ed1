//! Presto: a dual-mode future for operations that usually finish synchronously.
//!
//! # Overview
//!
//! Some operations complete synchronously almost every time and suspend only
//! occasionally — a cache that rarely misses, a socket that usually has
//! buffered bytes. Returning a conventional heap-allocated future from such
//! an operation makes every call pay for the rare case. [`Presto`] is a value
//! type holding either an inline result or a shared [`Deferred`] handle, so
//! the common case carries its result with no handle allocation at all.
//!
//! # Core Guarantees
//!
//! - **No allocation on the synchronous path**: a result available on the
//!   operation's first step is stored inline; the shared handle, waker, and
//!   continuation machinery are never touched.
//! - **No ambient context capture by default**: awaiting a `Presto` never
//!   marshals the continuation back onto the ambient schedule context;
//!   [`Presto::configure`] is the explicit opt-in.
//! - **Repeatable await**: the value wraps a plain handle reference (no
//!   pooling or reuse), so awaiting twice and reading the result after an
//!   await are always well-defined.
//! - **Lazy failure propagation**: faults and cancellations surface when the
//!   result is observed, carrying the original panic payload verbatim.
//!
//! # Module Structure
//!
//! - [`future`]: the dual-mode value type and its awaiters
//! - [`driver`]: the two-phase driver and completion builder
//! - [`deferred`]: the shared-state handle for the suspended path
//! - [`context`]: the ambient schedule context
//! - [`error`](mod@error): failure taxonomy
//! - [`tracing_compat`]: optional tracing integration
//!
//! # Example
//!
//! ```
//! use presto::{CompletionBuilder, Presto};
//!
//! // The common case: the operation finishes on its first step and the
//! // result is carried inline, with no shared handle allocated.
//! let value: Presto<u32> = CompletionBuilder::drive(async { 6 * 7 });
//! assert!(value.is_completed_successfully());
//! assert_eq!(value.result(), 42);
//! ```
//!
//! An operation that does suspend exposes a handle-backed value instead; the
//! driver re-polls it on each wake and settles the handle when it finishes:
//!
//! ```
//! use presto::{CompletionBuilder, Deferred, Presto};
//!
//! let gate: Deferred<u32> = Deferred::new();
//! let value = CompletionBuilder::drive({
//!     let gate = gate.clone();
//!     async move { Presto::from_deferred(gate).await + 1 }
//! });
//! assert!(!value.is_completed());
//!
//! gate.complete(41).expect("first settle");
//! assert_eq!(value.result(), 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod deferred;
pub mod driver;
pub mod error;
pub mod future;
pub mod tracing_compat;

#[cfg(test)]
mod test_utils;

pub use deferred::Deferred;
pub use driver::{CompletionBuilder, Step, poll_once};
pub use error::{CancelKind, CancelReason, Failure, Fault, SettleError};
pub use future::{Configured, ConfiguredWaiter, Presto, Waiter};
