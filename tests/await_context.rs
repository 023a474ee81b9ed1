//! Ambient-context behavior of the await paths.
//!
//! The default awaiter must never touch an installed context; only
//! `configure(true)` marshals the resuming continuation back onto it, and
//! then exactly once per await.

mod common;

use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context as PollContext, Poll};
use std::thread;
use std::time::Duration;

use futures::executor::block_on;
use futures::task::noop_waker;

use presto::{Deferred, Presto, context};

use common::CountingContext;

/// A handle that settles with `value` from another thread after a short delay.
fn settle_later<T: Send + 'static>(value: T, delay: Duration) -> Deferred<T> {
    let handle = Deferred::new();
    let settler = handle.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        settler.complete(value).expect("settles once");
    });
    handle
}

#[test]
fn default_await_of_completed_value_never_touches_the_context() {
    common::init_test_logging();

    let stub = CountingContext::forbidding();
    let _guard = context::enter(stub);

    let result = block_on(async { Presto::from_value(5).await });
    assert_eq!(result, 5);
}

#[test]
fn default_await_of_suspending_value_never_touches_the_context() {
    common::init_test_logging();

    let stub = CountingContext::forbidding();
    let _guard = context::enter(stub);

    let handle = settle_later(7, Duration::from_millis(20));
    let result = block_on(async { Presto::from_deferred(handle).await });
    assert_eq!(result, 7);
}

/// Polls the awaiter once to park its continuation, settles the handle, and
/// polls again — the suspension is guaranteed to precede the completion.
fn await_across_suspension(
    handle: &Deferred<u32>,
    mut waiter: impl std::future::Future<Output = u32> + Unpin,
) -> u32 {
    let waker = noop_waker();
    let mut cx = PollContext::from_waker(&waker);

    assert!(
        Pin::new(&mut waiter).poll(&mut cx).is_pending(),
        "the awaiter must suspend before the handle settles"
    );
    handle.complete(9).expect("settles once");
    match Pin::new(&mut waiter).poll(&mut cx) {
        Poll::Ready(value) => value,
        Poll::Pending => panic!("settled handle must resume the awaiter"),
    }
}

#[test]
fn configured_true_restores_the_context_exactly_once() {
    common::init_test_logging();

    let stub = CountingContext::counting();
    let _guard = context::enter(stub.clone());

    let handle: Deferred<u32> = Deferred::new();
    let waiter = Presto::from_deferred(handle.clone())
        .configure(true)
        .into_future();

    assert_eq!(await_across_suspension(&handle, waiter), 9);
    assert_eq!(stub.post_count(), 1);
}

#[test]
fn configured_false_matches_the_default() {
    common::init_test_logging();

    let stub = CountingContext::counting();
    let _guard = context::enter(stub.clone());

    let handle: Deferred<u32> = Deferred::new();
    let waiter = Presto::from_deferred(handle.clone())
        .configure(false)
        .into_future();

    assert_eq!(await_across_suspension(&handle, waiter), 9);
    assert_eq!(stub.post_count(), 0);
}

#[test]
fn configured_true_on_completed_value_never_suspends() {
    let stub = CountingContext::counting();
    let _guard = context::enter(stub.clone());

    let result = block_on(async { Presto::from_value(3).configure(true).await });
    assert_eq!(result, 3);
    assert_eq!(
        stub.post_count(),
        0,
        "a completed value resumes without registering a continuation"
    );
}

#[test]
fn awaiting_twice_yields_the_same_result() {
    let handle = settle_later(String::from("again"), Duration::from_millis(20));
    let value = Presto::from_deferred(handle);

    let first = block_on(value.wait());
    let second = block_on(value.wait());
    assert_eq!(first, "again");
    assert_eq!(second, "again");
    assert_eq!(value.result(), "again", "result stays readable after awaits");
}

#[test]
fn waiter_proxies_completion_and_result() {
    let value = Presto::from_value(31);
    let waiter = value.wait();
    assert!(waiter.is_completed());
    assert_eq!(waiter.result(), 31);

    let pending: Presto<u32> = Presto::from_deferred(Deferred::new());
    assert!(!pending.wait().is_completed());
}

#[test]
fn waiter_on_completed_runs_immediately_for_completed_values() {
    let ran = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&ran);

    Presto::from_value(1).wait().on_completed(move || {
        observed.store(true, Ordering::SeqCst);
    });
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn waiter_on_completed_ignores_an_installed_context() {
    let stub = CountingContext::forbidding();
    let _guard = context::enter(stub);

    let handle: Deferred<u32> = Deferred::new();
    let value = Presto::from_deferred(handle.clone());

    let ran = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&ran);
    value.wait().on_completed(move || {
        observed.store(true, Ordering::SeqCst);
    });

    handle.complete(2).expect("settles once");
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn configured_waiter_posts_through_the_captured_flag() {
    let stub = CountingContext::counting();
    let _guard = context::enter(stub.clone());

    let handle: Deferred<u32> = Deferred::new();
    let configured = Presto::from_deferred(handle.clone()).configure(true);
    assert!(configured.restores_context());

    let ran = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&ran);
    configured.waiter().on_completed(move || {
        observed.store(true, Ordering::SeqCst);
    });

    handle.complete(4).expect("settles once");
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(stub.post_count(), 1);
}
