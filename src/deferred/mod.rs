//! Shared-state deferred handle.
//!
//! [`Deferred`] is the conventional heap-allocated future the dual-mode value
//! wraps when a result is not available synchronously: a one-shot settle cell
//! with continuation registration and a blocking synchronous wait.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      DEFERRED LIFECYCLE                          │
//! │                                                                  │
//! │   Pending ──── complete(v) ───► Settled(Ok(v))                   │
//! │      │                                                           │
//! │      ├──────── fail(fault) ───► Settled(Err(Faulted))            │
//! │      │                                                           │
//! │      └──────── cancel(r) ─────► Settled(Err(Canceled))           │
//! │                                                                  │
//! │   Settling a second time is a usage error (AlreadySettled).      │
//! │   On settle, every registered continuation is dispatched once:   │
//! │   posted to its captured context, or run inline on the settling  │
//! │   thread.                                                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handles are cheap to clone; clones share identity, which is what the
//! dual-mode value's equality compares when a handle is present. Extraction
//! is idempotent: a settled handle reports the same outcome to every caller,
//! which is what makes the wrapping value safe to await repeatedly.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::context::{self, Continuation, ScheduleContext};
use crate::error::{CancelReason, Failure, Fault, SettleError};
use crate::tracing_compat::trace;

/// One registered continuation, with the context captured at registration.
struct Registered {
    run: Continuation,
    context: Option<Arc<dyn ScheduleContext>>,
}

/// The common case is a single registered continuation (one awaiter).
type Waitlist = SmallVec<[Registered; 1]>;

enum State<T> {
    /// Not settled; continuations parked here run on settle.
    Pending(Waitlist),
    /// Terminal. Never leaves this state.
    Settled(Result<T, Failure>),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

/// A heap-allocated, shareable handle to an eventually-available result.
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Deferred<T> {
    /// Creates a pending handle.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(State::Pending(Waitlist::new()))
    }

    /// Creates a handle already completed with `value`.
    #[must_use]
    pub fn completed(value: T) -> Self {
        Self::with_state(State::Settled(Ok(value)))
    }

    /// Creates a handle already faulted.
    #[must_use]
    pub fn faulted(fault: Fault) -> Self {
        Self::with_state(State::Settled(Err(Failure::Faulted(fault))))
    }

    /// Creates a handle already canceled.
    #[must_use]
    pub fn canceled(reason: CancelReason) -> Self {
        Self::with_state(State::Settled(Err(Failure::Canceled(reason))))
    }

    fn with_state(state: State<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                settled: Condvar::new(),
            }),
        }
    }

    /// Completes the handle with `value`.
    ///
    /// # Errors
    ///
    /// [`SettleError::AlreadySettled`] if an outcome was already recorded.
    pub fn complete(&self, value: T) -> Result<(), SettleError> {
        self.settle(Ok(value))
    }

    /// Fails the handle with a captured fault.
    ///
    /// # Errors
    ///
    /// [`SettleError::AlreadySettled`] if an outcome was already recorded.
    pub fn fail(&self, fault: Fault) -> Result<(), SettleError> {
        self.settle(Err(Failure::Faulted(fault)))
    }

    /// Cancels the handle.
    ///
    /// # Errors
    ///
    /// [`SettleError::AlreadySettled`] if an outcome was already recorded.
    pub fn cancel(&self, reason: CancelReason) -> Result<(), SettleError> {
        self.settle(Err(Failure::Canceled(reason)))
    }

    fn settle(&self, outcome: Result<T, Failure>) -> Result<(), SettleError> {
        let waiters = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Settled(_) => return Err(SettleError::AlreadySettled),
                State::Pending(registered) => {
                    let waiters = mem::take(registered);
                    *state = State::Settled(outcome);
                    waiters
                }
            }
        };
        self.shared.settled.notify_all();
        trace!(continuations = waiters.len(), "deferred handle settled");
        for entry in waiters {
            dispatch(entry);
        }
        Ok(())
    }

    /// Registers `continuation` to run once the handle settles.
    ///
    /// With `restore_context` set, the context current on this thread is
    /// captured now and the continuation is posted onto it at settle time;
    /// otherwise (or when no context is installed) the continuation runs
    /// inline on whichever thread settles the handle. Registering on an
    /// already-settled handle dispatches immediately under the same rules.
    pub fn on_settled(&self, restore_context: bool, continuation: impl FnOnce() + Send + 'static) {
        let entry = Registered {
            run: Box::new(continuation),
            context: if restore_context { context::current() } else { None },
        };
        let immediate = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending(registered) => {
                    registered.push(entry);
                    None
                }
                State::Settled(_) => Some(entry),
            }
        };
        if let Some(entry) = immediate {
            dispatch(entry);
        }
    }

    /// True once an outcome (success, fault, or cancellation) is recorded.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.shared.state.lock(), State::Settled(_))
    }

    /// True if settled with a success value.
    #[must_use]
    pub fn is_completed_successfully(&self) -> bool {
        matches!(&*self.shared.state.lock(), State::Settled(Ok(_)))
    }

    /// True if settled with a fault.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        matches!(
            &*self.shared.state.lock(),
            State::Settled(Err(Failure::Faulted(_)))
        )
    }

    /// True if settled with a cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(
            &*self.shared.state.lock(),
            State::Settled(Err(Failure::Canceled(_)))
        )
    }

    /// Blocks the calling thread until the handle settles.
    ///
    /// This parks the thread (never spins). Intended for callers that already
    /// confirmed completion or explicitly want a synchronous join.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();
        while matches!(&*state, State::Pending(_)) {
            self.shared.settled.wait(&mut state);
        }
    }

    /// Returns true when `other` is the same underlying handle.
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: Clone> Deferred<T> {
    /// Waits for the outcome and returns it without panicking.
    ///
    /// Blocks if the handle is still pending. Extraction is idempotent:
    /// every call observes the same outcome.
    pub fn try_result(&self) -> Result<T, Failure> {
        let mut state = self.shared.state.lock();
        loop {
            match &*state {
                State::Settled(outcome) => return outcome.clone(),
                State::Pending(_) => self.shared.settled.wait(&mut state),
            }
        }
    }

    /// Waits for the outcome and returns the value.
    ///
    /// Re-raises a fault with its original payload and panics on
    /// cancellation.
    #[must_use]
    pub fn result(&self) -> T {
        match self.try_result() {
            Ok(value) => value,
            Err(failure) => failure.raise(),
        }
    }
}

impl<T> Default for Deferred<T> {
    /// A default handle is pending, mirroring [`Deferred::new`].
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartialEq for Deferred<T> {
    /// Handles compare by identity, never by outcome.
    fn eq(&self, other: &Self) -> bool {
        self.same_handle(other)
    }
}

impl<T> Eq for Deferred<T> {}

impl<T> Hash for Deferred<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.shared), state);
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.state.lock() {
            State::Pending(_) => "pending",
            State::Settled(Ok(_)) => "completed",
            State::Settled(Err(Failure::Faulted(_))) => "faulted",
            State::Settled(Err(Failure::Canceled(_))) => "canceled",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

fn dispatch(entry: Registered) {
    match entry.context {
        Some(context) => {
            trace!("posting continuation to captured context");
            context.post(entry.run);
        }
        None => (entry.run)(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CancelKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn complete_then_extract() {
        let handle = Deferred::new();
        assert!(!handle.is_settled());

        handle.complete(42).expect("first settle succeeds");
        assert!(handle.is_settled());
        assert!(handle.is_completed_successfully());
        assert_eq!(handle.try_result().expect("completed"), 42);
        assert_eq!(handle.result(), 42);
    }

    #[test]
    fn second_settle_is_rejected() {
        let handle = Deferred::new();
        handle.complete(1).expect("first settle succeeds");

        assert_eq!(handle.complete(2), Err(SettleError::AlreadySettled));
        assert_eq!(
            handle.cancel(CancelReason::timeout()),
            Err(SettleError::AlreadySettled)
        );
        assert_eq!(handle.result(), 1, "outcome is unchanged by rejected settles");
    }

    #[test]
    fn fail_reports_faulted() {
        let handle: Deferred<u32> = Deferred::new();
        handle.fail(Fault::new("disk on fire")).expect("settles");

        assert!(handle.is_settled());
        assert!(handle.is_faulted());
        assert!(!handle.is_canceled());
        assert!(!handle.is_completed_successfully());

        let failure = handle.try_result().expect_err("faulted");
        assert!(failure.is_fault());
    }

    #[test]
    fn cancel_reports_canceled() {
        let handle: Deferred<u32> = Deferred::new();
        handle
            .cancel(CancelReason::user("caller gave up"))
            .expect("settles");

        assert!(handle.is_canceled());
        let failure = handle.try_result().expect_err("canceled");
        match failure {
            Failure::Canceled(reason) => assert_eq!(reason.kind, CancelKind::User),
            Failure::Faulted(_) => panic!("expected cancellation"),
        }
    }

    #[test]
    fn continuation_runs_inline_on_settle() {
        let handle = Deferred::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let observed = Arc::clone(&ran);
        handle.on_settled(false, move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0, "nothing runs before settle");

        handle.complete(()).expect("settles");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn continuation_on_settled_handle_runs_immediately() {
        let handle = Deferred::completed(7);
        let ran = Arc::new(AtomicUsize::new(0));

        let observed = Arc::clone(&ran);
        handle.on_settled(false, move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn captured_context_receives_the_continuation() {
        struct Counting {
            posts: AtomicUsize,
        }

        impl crate::context::ScheduleContext for Counting {
            fn post(&self, continuation: Continuation) {
                self.posts.fetch_add(1, Ordering::SeqCst);
                continuation();
            }
        }

        let context = Arc::new(Counting {
            posts: AtomicUsize::new(0),
        });
        let handle = Deferred::new();
        let ran = Arc::new(AtomicUsize::new(0));

        {
            let _guard = context::enter(context.clone());
            let observed = Arc::clone(&ran);
            handle.on_settled(true, move || {
                observed.fetch_add(1, Ordering::SeqCst);
            });
        }

        // The settling thread has no context installed; dispatch still lands
        // on the one captured at registration.
        let settler = handle.clone();
        std::thread::spawn(move || settler.complete(9).expect("settles"))
            .join()
            .expect("settler thread");

        assert_eq!(context.posts.load(Ordering::SeqCst), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(handle.result(), 9);
    }

    #[test]
    fn registration_without_flag_ignores_installed_context() {
        struct Forbidding;

        impl crate::context::ScheduleContext for Forbidding {
            fn post(&self, _continuation: Continuation) {
                panic!("context should not have been captured");
            }
        }

        let _guard = context::enter(Arc::new(Forbidding));
        let handle = Deferred::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let observed = Arc::clone(&ran);
        handle.on_settled(false, move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        handle.complete(()).expect("settles");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_blocks_until_settled_from_another_thread() {
        let handle = Deferred::new();

        let settler = handle.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            settler.complete(String::from("late")).expect("settles");
        });

        handle.wait();
        assert!(handle.is_settled());
        assert_eq!(handle.result(), "late");
        thread.join().expect("settler thread");
    }

    #[test]
    fn clones_share_identity() {
        let handle = Deferred::completed(5);
        let alias = handle.clone();
        let separate = Deferred::completed(5);

        assert!(handle.same_handle(&alias));
        assert_eq!(handle, alias);
        assert!(!handle.same_handle(&separate));
        assert_ne!(handle, separate, "equal outcomes do not equate handles");
    }

    #[test]
    fn extraction_is_idempotent() {
        let handle = Deferred::completed(11);
        assert_eq!(handle.result(), 11);
        assert_eq!(handle.result(), 11);
        assert_eq!(handle.try_result().expect("completed"), 11);
    }
}
