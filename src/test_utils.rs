//! Shared helpers for unit tests.

use std::sync::Once;

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
