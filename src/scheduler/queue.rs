//! Pending Priority Queue
//!
//! Holds tasks waiting for dispatch. In practice only retried failures and
//! submissions made while no worker slot is alive end up here, because fresh
//! submissions are dispatched immediately.
//!
//! ## Ordering
//! - Highest `TaskPriority` weight first.
//! - Among equal priorities, FIFO by insertion order (a sequence number
//!   breaks ties so the order is deterministic).

use super::types::Task;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct PendingEntry {
    weight: u8,
    seq: u64,
    task: Task,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.seq == other.seq
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher weight wins, then the lower
        // (older) sequence number.
        self.weight
            .cmp(&other.weight)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Max-priority-first queue of tasks awaiting dispatch.
#[derive(Default)]
pub struct PendingQueue {
    heap: BinaryHeap<PendingEntry>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(PendingEntry {
            weight: task.priority.weight(),
            seq,
            task,
        });
    }

    /// Removes and returns the highest-priority, oldest task.
    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::TaskPriority;

    fn task(name: &str, priority: TaskPriority) -> Task {
        Task::new(name, "NOTIFICATION", "data", Some(priority))
    }

    #[test]
    fn test_highest_priority_pops_first() {
        let mut queue = PendingQueue::new();
        queue.push(task("low", TaskPriority::Low));
        queue.push(task("urgent", TaskPriority::Urgent));
        queue.push(task("normal", TaskPriority::Normal));
        queue.push(task("high", TaskPriority::High));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop()).map(|t| t.name).collect();

        assert_eq!(order, vec!["urgent", "high", "normal", "low"]);
    }

    #[test]
    fn test_equal_priorities_are_fifo() {
        let mut queue = PendingQueue::new();
        for name in ["first", "second", "third"] {
            queue.push(task(name, TaskPriority::High));
        }
        queue.push(task("urgent", TaskPriority::Urgent));

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.pop().unwrap().name, "urgent");
        assert_eq!(queue.pop().unwrap().name, "first");
        assert_eq!(queue.pop().unwrap().name, "second");
        assert_eq!(queue.pop().unwrap().name, "third");
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }
}
