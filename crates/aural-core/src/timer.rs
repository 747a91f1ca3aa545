//! Explicit-state timer queue for the control thread.
//!
//! Timers are plain data: scheduling returns a [`TimerId`], the event loop
//! asks for the earliest deadline to bound its wait, and [`TimerQueue::fire_due`]
//! hands back the events whose deadlines passed. Policy state machines keep
//! the returned id so re-scheduling can cancel the predecessor, which is what
//! makes "at most one timer per (device, purpose)" provable.

use std::time::Instant;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<T> {
    id: TimerId,
    deadline: Instant,
    event: T,
}

/// Queue of one-shot timers carrying typed events.
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        TimerQueue {
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` to fire at `deadline`.
    pub fn schedule(&mut self, deadline: Instant, event: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            deadline,
            event,
        });
        id
    }

    /// Cancel a pending timer, returning its event if it had not fired.
    ///
    /// Cancelling an already-fired or unknown timer is silently a no-op.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.swap_remove(pos).event)
    }

    /// Whether the timer is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// The earliest pending deadline, to bound the event-loop wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Remove and return all events due at `now`, in deadline order.
    pub fn fire_due(&mut self, now: Instant) -> Vec<T> {
        let mut due: Vec<Entry<T>> = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].deadline <= now {
                due.push(self.entries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|e| e.deadline);
        due.into_iter().map(|e| e.event).collect()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        q.schedule(now + Duration::from_millis(500), "late");
        q.schedule(now + Duration::from_millis(100), "early");
        let fired = q.fire_due(now + Duration::from_secs(1));
        assert_eq!(fired, vec!["early", "late"]);
        assert!(q.is_empty());
    }

    #[test]
    fn only_due_timers_fire() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        q.schedule(now + Duration::from_millis(100), 1);
        q.schedule(now + Duration::from_millis(300), 2);
        assert_eq!(q.fire_due(now + Duration::from_millis(200)), vec![1]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn cancel_removes_timer() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.schedule(now, "x");
        assert!(q.is_pending(id));
        assert_eq!(q.cancel(id), Some("x"));
        assert!(!q.is_pending(id));
        assert!(q.fire_due(now + Duration::from_secs(1)).is_empty());
        // Double cancel is silent.
        assert_eq!(q.cancel(id), None);
    }

    #[test]
    fn next_deadline_is_minimum() {
        let now = Instant::now();
        let mut q: TimerQueue<()> = TimerQueue::new();
        assert!(q.next_deadline().is_none());
        q.schedule(now + Duration::from_millis(300), ());
        q.schedule(now + Duration::from_millis(100), ());
        assert_eq!(q.next_deadline(), Some(now + Duration::from_millis(100)));
    }
}
