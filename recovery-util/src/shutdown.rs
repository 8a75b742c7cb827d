//! A cooperative cancellation signal for the worker pool (spec.md §4.6,
//! §5 "Cancellation & timeouts").
//!
//! The orchestrator polls dispatched work with a very large timeout so
//! that an external interrupt can call [`ShutdownSender::shutdown`] and
//! have every worker observe it on its next poll, without individual
//! in-flight storage operations being cancelled mid-flight.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// The sending half of a shutdown signal. Held by the orchestrator
/// (`main`/`WorkerPool`); dropping it without calling [`shutdown`] leaves
/// workers uncancelled.
///
/// [`shutdown`]: ShutdownSender::shutdown
#[derive(Clone)]
pub struct ShutdownSender(Arc<CancellationToken>);

/// The receiving half, cloned into every worker so it can check or await
/// cancellation between storage suspension points.
#[derive(Clone)]
pub struct ShutdownReceiver(Arc<CancellationToken>);

/// Create a linked sender/receiver pair.
pub fn pair() -> (ShutdownSender, ShutdownReceiver) {
    let token = Arc::new(CancellationToken::new());
    (ShutdownSender(token.clone()), ShutdownReceiver(token))
}

impl ShutdownSender {
    /// Signal every receiver derived from this pair. Idempotent.
    pub fn shutdown(&self) {
        self.0.cancel();
    }
}

impl ShutdownReceiver {
    /// True once [`ShutdownSender::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolve once [`ShutdownSender::shutdown`] has been called. Safe to
    /// race against other work with `tokio::select!`.
    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}
