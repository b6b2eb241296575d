//! Timers fired on the dispatch loop.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Handle to a scheduled timer, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Loop-local callback.
pub type TimerCallback = Box<dyn FnOnce()>;

/// Deadline-ordered timer queue.
///
/// Owned by the dispatch loop; callbacks are never `Send` and only ever run
/// on the loop thread. Cancelled entries stay in the heap until they reach
/// the front and are then discarded.
#[derive(Default)]
pub struct TimerQueue {
    deadlines: BinaryHeap<Reverse<(Instant, TimerId)>>,
    callbacks: HashMap<TimerId, TimerCallback>,
    next_id: u64,
}

impl TimerQueue {
    /// Create an empty timer queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a callback after a delay.
    pub fn schedule(&mut self, delay: Duration, callback: TimerCallback) -> TimerId {
        self.schedule_at(Instant::now() + delay, callback)
    }

    /// Schedule a callback at a deadline.
    pub fn schedule_at(&mut self, deadline: Instant, callback: TimerCallback) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.deadlines.push(Reverse((deadline, id)));
        self.callbacks.insert(id, callback);
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if self.callbacks.contains_key(&id) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Remove and return the earliest callback due at `now`.
    ///
    /// One at a time, so the caller can release its borrow of the queue
    /// before running the callback; a callback that cancels a timer due in
    /// the same turn keeps it from firing.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerCallback> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                return None;
            }
            self.deadlines.pop();
            if let Some(callback) = self.callbacks.remove(&id) {
                return Some(callback);
            }
        }
        None
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.callbacks.clear();
    }
}
