//! Wait queue for tasks blocked on one kernel object
//!
//! Ordered by priority (0 first), FIFO among equal priorities. The queue
//! remembers the priority each entry was sorted with; the engine calls
//! [`WaitQueue::reposition`] whenever a queued task's effective priority
//! changes so the order never goes stale.

use alloc::vec::Vec;

use crate::types::{OsPrio, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WaitNode {
    task: TaskId,
    prio: OsPrio,
}

/// Priority-ordered list of waiting tasks
#[derive(Debug, Clone, Default)]
pub struct WaitQueue {
    nodes: Vec<WaitNode>,
}

impl WaitQueue {
    /// Create a new empty wait queue
    pub const fn new() -> Self {
        WaitQueue { nodes: Vec::new() }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Task that would be woken next
    #[inline]
    pub fn head(&self) -> Option<TaskId> {
        self.nodes.first().map(|n| n.task)
    }

    /// Priority of the task that would be woken next
    #[inline]
    pub fn highest_prio(&self) -> Option<OsPrio> {
        self.nodes.first().map(|n| n.prio)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.nodes.iter().any(|n| n.task == task)
    }

    /// Waiting tasks in wake-up order
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.nodes.iter().map(|n| n.task)
    }

    /// Insert in priority order, behind every task of equal priority
    ///
    /// # Panics
    /// If `task` is already queued here. A task waits on at most one
    /// object, so this is a kernel invariant violation.
    pub fn enqueue(&mut self, task: TaskId, prio: OsPrio) {
        if self.contains(task) {
            panic!("{:?} is already queued", task);
        }

        let idx = self.nodes.partition_point(|n| n.prio <= prio);
        self.nodes.insert(idx, WaitNode { task, prio });
    }

    /// Remove the highest priority, earliest queued task
    pub fn dequeue_highest(&mut self) -> Option<TaskId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.nodes.remove(0).task)
        }
    }

    /// Remove a specific task; returns whether it was queued
    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.nodes.iter().position(|n| n.task == task) {
            Some(idx) => {
                self.nodes.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Re-sort a queued task after its priority changed. It lands behind
    /// the tasks already waiting at `new_prio`.
    pub fn reposition(&mut self, task: TaskId, new_prio: OsPrio) {
        if self.remove(task) {
            self.enqueue(task, new_prio);
        } else {
            debug_assert!(false, "{:?} is not queued", task);
        }
    }

    /// Remove every waiter, in wake-up order
    pub fn flush(&mut self) -> Vec<TaskId> {
        self.nodes.drain(..).map(|n| n.task).collect()
    }
}
