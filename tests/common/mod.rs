//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use presto::context::{Continuation, ScheduleContext};

static INIT_LOGGING: Once = Once::new();

/// Initializes test logging. Safe to call multiple times; only the first
/// call does anything.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Ambient-context stub that counts restorations, and can forbid capture
/// outright for paths that must never touch the context.
pub struct CountingContext {
    allow_capture: bool,
    posts: AtomicUsize,
}

impl CountingContext {
    /// A stub that records each post.
    pub fn counting() -> Arc<Self> {
        Arc::new(Self {
            allow_capture: true,
            posts: AtomicUsize::new(0),
        })
    }

    /// A stub that fails the test if anything is ever posted to it.
    pub fn forbidding() -> Arc<Self> {
        Arc::new(Self {
            allow_capture: false,
            posts: AtomicUsize::new(0),
        })
    }

    /// How many continuations were marshaled onto this context.
    pub fn post_count(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }
}

impl ScheduleContext for CountingContext {
    fn post(&self, continuation: Continuation) {
        assert!(
            self.allow_capture,
            "ambient context should not have been captured"
        );
        self.posts.fetch_add(1, Ordering::SeqCst);
        continuation();
    }
}
