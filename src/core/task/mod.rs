//! Task model interface
//!
//! The synchronization core never owns tasks. It reaches the scheduler only
//! through [`TaskModel`]: reading and writing priorities, and moving tasks
//! between the ready set and the blocked state.

mod tcb;

pub use tcb::OsTcb;

use crate::types::{OsPrio, TaskId, WaitObject};

/// The scheduler-side collaborator of the synchronization core.
///
/// All methods are called from inside a critical section and must not
/// block.
pub trait TaskModel {
    /// The task on whose behalf the current operation runs, `None` when no
    /// task is running (start-up, idle, or the running task just blocked)
    fn current_task(&self) -> Option<TaskId>;

    /// Whether `task` names a task known to the model
    fn is_valid(&self, task: TaskId) -> bool;

    /// Priority assigned to the task, ignoring any boost
    fn base_priority(&self, task: TaskId) -> OsPrio;

    /// Replace the assigned priority; the core re-evaluates the effective
    /// priority right after
    fn set_base_priority(&mut self, task: TaskId, prio: OsPrio);

    /// Priority the task currently runs (or waits) at
    fn effective_priority(&self, task: TaskId) -> OsPrio;

    /// Bookkeeping only; does not reschedule by itself
    fn set_effective_priority(&mut self, task: TaskId, prio: OsPrio);

    /// Remove `task` from the ready set. Called again on an already blocked
    /// task when it moves to a different object.
    fn block(&mut self, task: TaskId, on: WaitObject);

    /// Return `task` to the ready set
    fn unblock(&mut self, task: TaskId);
}
