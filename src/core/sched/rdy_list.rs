//! Ready list - the tasks ready to run at one priority level
//!
//! Tasks are added to the tail (FIFO for round-robin) and scheduled from
//! the head.

use alloc::collections::VecDeque;

use crate::types::TaskId;

/// Ready list for a single priority level
#[derive(Debug, Clone, Default)]
pub struct ReadyList {
    tasks: VecDeque<TaskId>,
}

impl ReadyList {
    pub const fn new() -> Self {
        ReadyList {
            tasks: VecDeque::new(),
        }
    }

    /// First task to be scheduled
    #[inline]
    pub fn head(&self) -> Option<TaskId> {
        self.tasks.front().copied()
    }

    #[inline]
    pub fn tail(&self) -> Option<TaskId> {
        self.tasks.back().copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Insert at the tail of the list (FIFO order)
    pub fn insert_tail(&mut self, task: TaskId) {
        debug_assert!(!self.tasks.contains(&task));
        self.tasks.push_back(task);
    }

    /// Remove a task; returns whether it was listed
    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.tasks.iter().position(|&t| t == task) {
            Some(idx) => {
                self.tasks.remove(idx);
                true
            }
            None => false,
        }
    }
}
