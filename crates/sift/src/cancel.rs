//! Cooperative cancellation for script execution.
//!
//! The VM polls the engine's token at the top of its dispatch loop; when the
//! token has tripped, the current instruction finishes and execution fails
//! with `Timeout`. Cancellation is the only suspension point in the core:
//! there is no I/O and no blocking inside the dispatch loop.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// A cloneable cancellation handle shared between host and VM.
///
/// A token trips either explicitly via [`CancelToken::cancel`] or implicitly
/// once its deadline (if any) passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never trips on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that trips once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Trips the token; every clone observes the cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
