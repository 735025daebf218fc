// (c) 2025 peerlink developers

//! Inbound package queue
//!
//! Multi-producer/multi-consumer queue between the connection's
//! receive-message task and the client's dispatch thread. `push` never
//! blocks on a consumer; consumers either poll ([`try_pop`](InboundQueue::try_pop))
//! or park with a timeout ([`pop_timeout`](InboundQueue::pop_timeout)).
//!
//! The queue is unbounded; sustained bursts beyond the warn threshold are
//! logged so runaway producers show up in the trace rather than as silent
//! memory growth.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

/// Queue depth at which [`InboundQueue::push`] starts complaining.
pub const WARN_THRESHOLD: usize = 10_000;

/// MPMC queue. See the [module docs](self).
#[derive(Debug)]
pub struct InboundQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for InboundQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }
}

impl<T> InboundQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues one item and wakes one parked consumer.
    pub fn push(&self, item: T) {
        let depth = {
            let mut items = self.items.lock();
            items.push_back(item);
            items.len()
        };
        if depth == WARN_THRESHOLD {
            warn!("inbound queue depth reached {depth}; consumers are falling behind");
        }
        let _ = self.available.notify_one();
    }

    /// Dequeues one item if any is immediately available.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Dequeues one item, parking up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        if items.is_empty() {
            let _ = self.available.wait_for(&mut items, timeout);
        }
        items.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
