//! Error types for dual-mode future operations.
//!
//! The taxonomy has three tiers:
//!
//! - **Usage errors** (settling a handle twice, misusing a builder) raise
//!   immediately at the call site.
//! - **Operation faults** (panics inside a driven operation) are carried by
//!   the deferred handle and re-raised only when the result is observed,
//!   matching deferred-evaluation semantics.
//! - **Cancellation** is a handle state, not a fault: queryable without
//!   extracting the result.
//!
//! Nothing here retries; retry policy belongs to the operation being driven.

use std::any::Any;
use std::fmt;
use std::panic::resume_unwind;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// The kind of cancellation applied to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// Cancellation due to a timeout or missed deadline.
    Timeout,
    /// Cancellation because the owning component is shutting down.
    Shutdown,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason an operation was canceled, including kind and optional context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message (static, so the cancel path allocates nothing).
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a cancellation reason with the given kind and no message.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Creates a timeout cancellation reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// Creates a shutdown cancellation reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(message) => write!(f, "{} ({message})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A captured fault from a driven operation.
///
/// The original panic payload is retained so the first observer re-raises it
/// verbatim and stack attribution stays with the operation that faulted, not
/// with the awaiter. Panic payloads are not clonable, so once the payload has
/// been claimed, later observers raise with the recorded description instead.
#[derive(Clone)]
pub struct Fault {
    payload: Arc<Mutex<Option<Box<dyn Any + Send>>>>,
    description: Arc<str>,
}

impl Fault {
    /// Captures a panic payload.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let description = describe_panic(payload.as_ref());
        Self {
            payload: Arc::new(Mutex::new(Some(payload))),
            description: description.into(),
        }
    }

    /// Builds a fault from a plain message, for operations that report
    /// failure without panicking.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            payload: Arc::new(Mutex::new(None)),
            description: description.into().into(),
        }
    }

    /// A short description of the fault.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Re-raises the fault.
    ///
    /// The first call unwinds with the original panic payload; later calls
    /// (the payload can only be surrendered once) panic with the recorded
    /// description.
    pub fn resume(&self) -> ! {
        if let Some(payload) = self.payload.lock().take() {
            resume_unwind(payload);
        }
        panic!("operation faulted: {}", self.description);
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}

/// Why observing a result failed.
///
/// Faults and cancellations propagate lazily: they surface only when the
/// result is actually observed.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// The operation faulted; the payload is carried verbatim.
    #[error("operation faulted: {0}")]
    Faulted(Fault),
    /// The operation was canceled.
    #[error("operation canceled: {0}")]
    Canceled(CancelReason),
}

impl Failure {
    /// Returns true if this failure is a fault.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }

    /// Returns true if this failure is a cancellation.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Re-raises the failure: faults unwind with their original payload,
    /// cancellations panic with the recorded reason.
    pub fn raise(self) -> ! {
        match self {
            Self::Faulted(fault) => fault.resume(),
            Self::Canceled(reason) => panic!("operation canceled: {reason}"),
        }
    }
}

/// Usage error returned when settling a deferred handle that already holds
/// an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SettleError {
    /// The handle already holds an outcome.
    #[error("deferred handle is already settled")]
    AlreadySettled,
}
