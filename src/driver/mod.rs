//! Two-phase driver and completion builder.
//!
//! The protocol is a single synchronous probe followed by hand-off:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        TWO-PHASE DRIVE                             │
//! │                                                                    │
//! │   poll_once(op)                                                    │
//! │     │                                                              │
//! │     ├── Ready(v) ──► Step::Done(v)        (no handle allocated)    │
//! │     │                                                              │
//! │     └── Pending ───► Step::Suspended(h)                            │
//! │                        │                                           │
//! │                        └── relay re-polls op on every wake until   │
//! │                            it finishes, then settles h             │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`CompletionBuilder`] layers the per-invocation state machine on top:
//! start the operation, record its outcome, expose the dual-mode future —
//! storing the result inline on the hot (synchronous) path and materializing
//! the deferred handle only when the operation actually suspends or a caller
//! forces it.

use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use parking_lot::Mutex;

use crate::deferred::Deferred;
use crate::error::{CancelReason, Fault};
use crate::future::Presto;
use crate::tracing_compat::{debug, trace};

/// Outcome of driving an operation through its first step.
#[derive(Debug)]
pub enum Step<T> {
    /// The operation finished without suspending; no handle was allocated.
    Done(T),
    /// The operation suspended; the handle resolves when it finishes.
    Suspended(Deferred<T>),
}

impl<T> From<Step<T>> for Presto<T> {
    fn from(step: Step<T>) -> Self {
        match step {
            Step::Done(value) => Self::from_value(value),
            Step::Suspended(handle) => Self::from_deferred(handle),
        }
    }
}

/// Polls `op` once on the calling thread.
///
/// `Ready` comes back as [`Step::Done`] without touching the deferred
/// machinery — the hot path. On `Pending` the operation moves into a
/// waker-driven relay: each wake re-polls it (possibly on another thread)
/// until it finishes and settles the returned handle. A panic — on the first
/// step or any later one — lands in the handle as a fault; a first-step panic
/// therefore yields [`Step::Suspended`] with an already-faulted handle.
///
/// The `Unpin` bound keeps the first poll free of allocation; pass
/// `Box::pin(op)` for a plain `async` block, or use
/// [`CompletionBuilder::start`], which boxes internally.
pub fn poll_once<F>(mut op: F) -> Step<F::Output>
where
    F: Future + Unpin + Send + 'static,
    F::Output: Send + 'static,
{
    // The probe waker is a no-op: a wake during the first step only matters
    // if the step ends Pending, and the relay unconditionally re-polls then.
    let mut probe = Context::from_waker(Waker::noop());
    match catch_unwind(AssertUnwindSafe(|| Pin::new(&mut op).poll(&mut probe))) {
        Ok(Poll::Ready(value)) => Step::Done(value),
        Ok(Poll::Pending) => {
            trace!("operation suspended; materializing deferred handle");
            Step::Suspended(Relay::launch(op))
        }
        Err(payload) => {
            debug!("operation panicked on its first step");
            Step::Suspended(Deferred::faulted(Fault::from_panic(payload)))
        }
    }
}

enum RelayState<F> {
    /// Waiting for a wake; the operation is parked here.
    Parked(F),
    /// A thread is polling; `woken` records wakes that arrived meanwhile.
    Running { woken: bool },
    /// The operation settled the handle; nothing left to poll.
    Finished,
}

/// Drives a suspended operation to completion, one wake at a time.
///
/// The relay is its own waker: a wake claims the parked operation and polls
/// it on the waking thread. Wakes that arrive while a poll is in flight are
/// coalesced into one follow-up poll, so the operation is never polled
/// concurrently and no wake is lost.
struct Relay<F: Future> {
    state: Mutex<RelayState<F>>,
    handle: Deferred<F::Output>,
}

impl<F> Relay<F>
where
    F: Future + Unpin + Send + 'static,
    F::Output: Send + 'static,
{
    fn launch(op: F) -> Deferred<F::Output> {
        let relay = Arc::new(Self {
            state: Mutex::new(RelayState::Parked(op)),
            handle: Deferred::new(),
        });
        let handle = relay.handle.clone();
        // Re-poll immediately: the first step ran against the no-op probe
        // waker, so any registration it made must be redone with a live one.
        relay.run();
        handle
    }

    fn run(self: &Arc<Self>) {
        let mut op = {
            let mut state = self.state.lock();
            match mem::replace(&mut *state, RelayState::Running { woken: false }) {
                RelayState::Parked(op) => op,
                RelayState::Running { .. } => {
                    // Another thread is mid-poll; make sure it goes around again.
                    *state = RelayState::Running { woken: true };
                    return;
                }
                RelayState::Finished => {
                    *state = RelayState::Finished;
                    return;
                }
            }
        };
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        loop {
            match catch_unwind(AssertUnwindSafe(|| Pin::new(&mut op).poll(&mut cx))) {
                Ok(Poll::Ready(value)) => {
                    *self.state.lock() = RelayState::Finished;
                    if self.handle.complete(value).is_err() {
                        debug!("relay outcome discarded; handle was settled externally");
                    }
                    return;
                }
                Ok(Poll::Pending) => {
                    let mut state = self.state.lock();
                    if matches!(&*state, RelayState::Running { woken: true }) {
                        *state = RelayState::Running { woken: false };
                        drop(state);
                        continue;
                    }
                    *state = RelayState::Parked(op);
                    return;
                }
                Err(payload) => {
                    *self.state.lock() = RelayState::Finished;
                    if self.handle.fail(Fault::from_panic(payload)).is_err() {
                        debug!("relay fault discarded; handle was settled externally");
                    }
                    return;
                }
            }
        }
    }
}

impl<F> Wake for Relay<F>
where
    F: Future + Unpin + Send + 'static,
    F::Output: Send + 'static,
{
    fn wake(self: Arc<Self>) {
        self.run();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.run();
    }
}

enum BuilderState<T> {
    /// Nothing driven and no outcome recorded yet.
    Created,
    /// Completed without suspending; the result is exposed inline.
    SyncDone(T),
    /// A handle exists (suspension, recorded failure, or forced
    /// materialization) and is authoritative from here on.
    Suspended(Deferred<T>),
}

/// Drives one asynchronous operation and exposes its dual-mode future.
///
/// A builder is created fresh per operation invocation, consulted for its
/// future, then discarded. It is single-writer: exactly one logical thread
/// of control drives it, though the relay continuation it leaves behind may
/// run on a different thread than the one that started the operation.
///
/// State transitions per invocation:
///
/// - [`start`](Self::start) completing synchronously → result stored inline;
///   the deferred machinery is never touched. This is the hot path the whole
///   type exists for.
/// - [`start`](Self::start) suspending → handle materialized; later
///   completion (the relay, or a manual [`set_result`](Self::set_result))
///   resolves that same previously-exposed handle.
/// - [`future`](Self::future) before either → forces the handle into
///   existence: a degraded-but-correct mode for manual use outside a driver.
pub struct CompletionBuilder<T> {
    state: BuilderState<T>,
}

impl<T: Send + 'static> CompletionBuilder<T> {
    /// Creates a builder with no recorded outcome.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: BuilderState::Created,
        }
    }

    /// Drives the first step of `op` synchronously.
    ///
    /// The operation is boxed once up front; a synchronous completion stores
    /// the result inline and never allocates the shared handle, waker, or
    /// continuation machinery. Suspension hands the boxed operation to the
    /// wake-driven relay behind the handle this builder exposes.
    ///
    /// # Panics
    ///
    /// If the builder already drove an operation or recorded an outcome.
    pub fn start<F>(&mut self, op: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        assert!(
            matches!(self.state, BuilderState::Created),
            "builder already holds an operation outcome"
        );
        self.state = match poll_once(Box::pin(op)) {
            Step::Done(value) => BuilderState::SyncDone(value),
            Step::Suspended(handle) => BuilderState::Suspended(handle),
        };
    }

    /// Records a successful result.
    ///
    /// Before any suspension this stores the result inline; after suspension
    /// it resolves the previously exposed handle.
    ///
    /// # Panics
    ///
    /// If an outcome was already recorded.
    pub fn set_result(&mut self, value: T) {
        match &mut self.state {
            BuilderState::Created => self.state = BuilderState::SyncDone(value),
            BuilderState::Suspended(handle) => {
                handle.complete(value).expect("result already recorded");
            }
            BuilderState::SyncDone(_) => panic!("result already recorded"),
        }
    }

    /// Records a fault.
    ///
    /// Faults always land in the deferred handle: one is materialized first
    /// if the operation never suspended (the manual, non-driver mode).
    ///
    /// # Panics
    ///
    /// If an outcome was already recorded.
    pub fn set_error(&mut self, fault: Fault) {
        self.materialized()
            .fail(fault)
            .expect("outcome already recorded");
    }

    /// Records a cancellation. Same handle rule as [`set_error`](Self::set_error).
    ///
    /// # Panics
    ///
    /// If an outcome was already recorded.
    pub fn set_canceled(&mut self, reason: CancelReason) {
        self.materialized()
            .cancel(reason)
            .expect("outcome already recorded");
    }

    fn materialized(&mut self) -> &Deferred<T> {
        if matches!(self.state, BuilderState::Created) {
            trace!("materializing deferred handle outside the driven path");
            self.state = BuilderState::Suspended(Deferred::new());
        }
        match &self.state {
            BuilderState::Suspended(handle) => handle,
            BuilderState::SyncDone(_) => panic!("result already recorded"),
            BuilderState::Created => unreachable!("materialized above"),
        }
    }
}

impl<T: Clone + Send + 'static> CompletionBuilder<T> {
    /// The future for this builder's operation.
    ///
    /// Before the operation completed or suspended, this forces the handle
    /// into existence so there is something to resolve later; afterwards it
    /// reflects whichever backing the operation earned. Repeated calls are
    /// consistent: inline results compare equal by value, handle results
    /// share one identity.
    pub fn future(&mut self) -> Presto<T> {
        if matches!(self.state, BuilderState::Created) {
            let _ = self.materialized();
        }
        match &self.state {
            BuilderState::SyncDone(value) => Presto::from_value(value.clone()),
            BuilderState::Suspended(handle) => Presto::from_deferred(handle.clone()),
            BuilderState::Created => unreachable!("materialized above"),
        }
    }

    /// Drives `op` and returns its future in one call.
    pub fn drive<F>(op: F) -> Presto<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut builder = Self::new();
        builder.start(op);
        builder.future()
    }
}

impl<T: Send + 'static> Default for CompletionBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CompletionBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            BuilderState::Created => "created",
            BuilderState::SyncDone(_) => "sync-done",
            BuilderState::Suspended(_) => "suspended",
        };
        f.debug_struct("CompletionBuilder")
            .field("state", &state)
            .finish()
    }
}
