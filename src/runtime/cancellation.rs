// src/runtime/cancellation.rs
//! Cooperative cancellation for workers
//!
//! Each worker owns a token. In-process searches poll it at every
//! candidate boundary; searches running in child processes are stopped by
//! killing the process instead, since the child holds its own copy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_starts_live() {
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();

        let handle = thread::spawn(move || {
            while !observer.is_cancelled() {
                thread::yield_now();
            }
        });

        token.cancel();
        token.cancel();
        handle.join().unwrap();
        assert!(token.is_cancelled());
    }
}
