// (c) 2025 peerlink developers

//! Awaitable binary flag
//!
//! Tasks park on [`AwaitFlag::wait`] when their input deque is empty;
//! producers [`signal`](AwaitFlag::signal) after pushing. Any number of
//! signals before a waiter arrives collapse into one pending wake. The flag
//! is re-armable via [`reset`](AwaitFlag::reset).

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// An awaitable binary flag. See the [module docs](self).
#[derive(Debug, Default)]
pub struct AwaitFlag {
    set: AtomicBool,
    notify: Notify,
}

impl AwaitFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes any current waiters. Never blocks, never
    /// fails; callable from any thread.
    pub fn signal(&self) {
        self.set.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Clears the flag. Waiters arriving afterwards will suspend.
    pub fn reset(&self) {
        self.set.store(false, Ordering::Release);
    }

    /// Whether the flag is currently set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Suspends until the flag is observed set. A wake that finds the flag
    /// cleared again (reset raced in) re-suspends. Cancellation-safe: the
    /// flag state is untouched by dropping the future.
    pub async fn wait(&self) {
        loop {
            // Register interest before the final check so a signal landing
            // between the check and the await is not lost.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.set.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}
