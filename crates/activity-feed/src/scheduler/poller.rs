//! Poll callback and error reporting seams.
//!
//! The scheduler never fetches anything itself. It calls a [`Poller`] and
//! hands whatever goes wrong to an [`ErrorSink`].

use std::future::Future;

use async_trait::async_trait;
use tracing::warn;

/// The caller-supplied fetch step.
///
/// Must be safe to call repeatedly; the scheduler guarantees calls never
/// overlap.
#[async_trait]
pub trait Poller: Send + Sync + 'static {
    /// Fetch fresh activity and fold it into the caller's state.
    async fn poll(&self) -> Result<(), PollError>;
}

/// Adapter turning an async closure into a [`Poller`].
pub struct FnPoller<F> {
    f: F,
}

impl<F> FnPoller<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Poller for FnPoller<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PollError>> + Send + 'static,
{
    async fn poll(&self) -> Result<(), PollError> {
        (self.f)().await
    }
}

/// Error type for poll operations.
#[derive(Debug, Clone)]
pub struct PollError {
    /// Error message.
    pub message: String,
    /// Whether this error is transient (network hiccup, rate limit).
    pub transient: bool,
}

impl PollError {
    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// Build an error from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::permanent(format!("poll panicked: {detail}"))
    }
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PollError {}

impl From<crate::Error> for PollError {
    fn from(err: crate::Error) -> Self {
        PollError::transient(err.to_string())
    }
}

/// Receives errors produced by the poll callback.
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, scheduler_id: &str, error: &PollError);
}

/// Default sink: logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, scheduler_id: &str, error: &PollError) {
        warn!(scheduler = scheduler_id, transient = error.transient, "Poll failed: {}", error);
    }
}
