//! Cancellation tokens for rescans
//!
//! A rescan checks its token between blocks, so cancellation always leaves the
//! wallet at a block boundary with that height committed to storage.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Polled by a rescan before each block
pub trait CancellationToken: Send + Sync + std::fmt::Debug {
    fn is_cancelled(&self) -> bool;

    fn cancel(&self);
}

/// Flag shared between a running rescan and whoever may stop it.
///
/// The rescan borrows the token while the wallet lock is held, so the stop
/// request comes through a [`StopHandle`] owned by another task or by an event
/// listener reacting to [`RescanProgress`](crate::events::WalletEvent::RescanProgress).
#[derive(Debug, Clone, Default)]
pub struct SharedCancellationToken {
    stopped: Arc<AtomicBool>,
}

impl SharedCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> StopHandle {
        StopHandle {
            stopped: Arc::clone(&self.stopped),
        }
    }
}

impl CancellationToken for SharedCancellationToken {
    fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Stops the rescan polling the token it was taken from
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Token that is never cancelled
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelToken;

impl CancellationToken for NeverCancelToken {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_stops_every_clone() {
        let token = SharedCancellationToken::new();
        let clone = token.clone();
        let handle = token.handle();
        assert!(!clone.is_cancelled());

        handle.stop();
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_never_cancel() {
        let token = NeverCancelToken;
        token.cancel();
        assert!(!token.is_cancelled());
    }
}
