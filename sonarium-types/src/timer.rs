//! Cancellable scheduled tasks tied to their owner's lifetime.
//!
//! Owners keep a `Timers` value, schedule tasks against a clock of their
//! choice (host `Duration` or audio-clock seconds) and pump `take_due(now)`
//! from their own tick. Nothing fires on its own: once the owner calls
//! `clear()` or is dropped, no pending task can ever run.

use std::time::Duration;

/// Handle to a scheduled task, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Pending<T, At> {
    id: TaskId,
    at: At,
    task: T,
}

/// An ordered set of pending tasks keyed by due time.
#[derive(Debug)]
pub struct Timers<T, At = Duration> {
    pending: Vec<Pending<T, At>>,
    next_id: u64,
}

impl<T, At> Default for Timers<T, At> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T, At: Copy + PartialOrd> Timers<T, At> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to become due at `at`.
    pub fn schedule(&mut self, at: At, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        // Insert after every task due at or before `at` so equal deadlines keep FIFO order.
        let idx = self.pending.partition_point(|p| p.at <= at);
        self.pending.insert(idx, Pending { id, at, task });
        id
    }

    /// Cancel a task. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.pending.iter().position(|p| p.id == id) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Remove and return all tasks due at or before `now`, in deadline order.
    pub fn take_due(&mut self, now: At) -> Vec<T> {
        let split = self.pending.partition_point(|p| p.at <= now);
        self.pending.drain(..split).map(|p| p.task).collect()
    }

    pub fn next_deadline(&self) -> Option<At> {
        self.pending.first().map(|p| p.at)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_tasks_come_out_in_deadline_order() {
        let mut timers: Timers<&str> = Timers::new();
        timers.schedule(Duration::from_millis(30), "c");
        timers.schedule(Duration::from_millis(10), "a");
        timers.schedule(Duration::from_millis(20), "b");

        assert!(timers.take_due(Duration::from_millis(5)).is_empty());
        assert_eq!(timers.take_due(Duration::from_millis(20)), vec!["a", "b"]);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn equal_deadlines_keep_insertion_order() {
        let mut timers: Timers<u32, f64> = Timers::new();
        timers.schedule(1.0, 1);
        timers.schedule(1.0, 2);
        timers.schedule(1.0, 3);
        assert_eq!(timers.take_due(1.0), vec![1, 2, 3]);
    }

    #[test]
    fn cancelled_task_never_fires() {
        let mut timers: Timers<&str> = Timers::new();
        let id = timers.schedule(Duration::from_secs(1), "reconnect");
        assert_eq!(timers.len(), 1);
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(timers.take_due(Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut timers: Timers<u8> = Timers::new();
        timers.schedule(Duration::from_secs(1), 1);
        timers.schedule(Duration::from_secs(2), 2);
        timers.clear();
        assert!(timers.is_empty());
        assert!(timers.take_due(Duration::from_secs(5)).is_empty());
    }
}
