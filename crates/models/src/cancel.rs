//! Cooperative cancellation.
//!
//! An [`AbortController`] owns the flag; any number of [`AbortSignal`]s
//! observe it. Signals are cheap to clone and poll, and expose an async
//! [`cancelled()`](AbortSignal::cancelled) future for use in `select!`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Creates signals and triggers cancellation.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    aborted: Arc<AtomicBool>,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal observing this controller.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            aborted: Arc::clone(&self.aborted),
        }
    }

    /// Trip the flag. Every derived signal reports aborted from now on.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }
}

/// The observing side of an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Resolves when abort is signalled. Polls the flag at 10ms intervals,
    /// which is fine-grained enough for cancelling LLM calls and tool runs.
    pub async fn cancelled(&self) {
        while !self.is_aborted() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}
