//! Priority inheritance graph
//!
//! The graph is never stored as such. Its edges are the per-task `held`
//! lists, the mutex a task pends on, and each mutex's owner; the routines
//! here walk them on demand. No cycle survives an operation: acquisitions
//! that would close one are refused before anything changes.

use crate::config::CFG_PRIO_MAX;
use crate::core::kernel::{Kernel, Pend};
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::sync::mutex::Protocol;
use crate::task::TaskModel;
use crate::types::{OsPrio, TaskId};

impl<S: TaskModel> Kernel<S> {
    /// Whether `task` blocking on a mutex owned by `owner` would close a
    /// wait-for cycle
    ///
    /// Follows owner, the mutex that owner pends on, that mutex's owner and
    /// so on; the chain is a path because the graph is acyclic.
    pub(crate) fn would_deadlock(&self, task: TaskId, owner: TaskId) -> bool {
        let mut cur = owner;
        let mut hops = 0;

        loop {
            if cur == task {
                return true;
            }

            let next = self
                .pending_mutex(cur)
                .and_then(|m| self.mutexes.get(&m))
                .and_then(|m| m.owner);
            match next {
                Some(next) => cur = next,
                None => return false,
            }

            hops += 1;
            debug_assert!(hops <= self.mutexes.len(), "wait-for cycle");
        }
    }

    /// Effective priority `task` is entitled to: its base priority, raised
    /// to the ceiling of every ceiling mutex it holds and to the head
    /// waiter of every inherit mutex it holds
    pub(crate) fn evaluate_priority(&self, task: TaskId) -> OsPrio {
        let mut prio = self.sched.base_priority(task);

        let Some(thread) = self.threads.get(&task) else {
            return prio;
        };
        for m in thread.held.iter().filter_map(|id| self.mutexes.get(id)) {
            let bound = match m.protocol {
                Protocol::None => None,
                Protocol::Inherit => m.wait_queue.highest_prio(),
                Protocol::Ceiling(ceiling) => Some(ceiling),
            };
            if let Some(bound) = bound {
                prio = prio.min(bound);
            }
        }

        prio
    }

    /// Re-evaluate the effective priority of `task` and propagate a change
    /// along the chain of owners it (transitively) waits for
    ///
    /// Each changed task is re-sorted in the queue it waits on; the walk
    /// then continues with that mutex's owner and stops at the first task
    /// whose priority is unchanged, or that does not wait for a mutex.
    pub(crate) fn update_priority(&mut self, task: TaskId) {
        let mut cur = task;

        loop {
            let new = self.evaluate_priority(cur);
            let old = self.sched.effective_priority(cur);
            if new == old {
                return;
            }

            self.sched.set_effective_priority(cur, new);
            if new < old {
                crate::debug!("{} boosted {} -> {}", cur, old, new);
            } else {
                crate::debug!("{} lowered {} -> {}", cur, old, new);
            }

            match self.threads.get(&cur).and_then(|t| t.pend) {
                Some(Pend::Mutex { mutex, .. }) => {
                    let Some(m) = self.mutexes.get_mut(&mutex) else {
                        return;
                    };
                    m.wait_queue.reposition(cur, new);
                    match m.owner {
                        Some(owner) => cur = owner,
                        None => return,
                    }
                }
                Some(Pend::Cond { cond, .. }) => {
                    if let Some(c) = self.conds.get_mut(&cond) {
                        c.wait_queue.reposition(cur, new);
                    }
                    return;
                }
                None => return,
            }
        }
    }

    /// Change the base priority of a task
    ///
    /// The effective priority is re-evaluated at once; a waiting task is
    /// re-sorted in its queue and the change propagates to the owners it
    /// waits for.
    ///
    /// # Returns
    /// * `Ok(OsPrio)` - The previous base priority
    /// * `Err(OsError::PrioInvalid)` - Priority out of range
    /// * `Err(OsError::TaskInvalid)` - Unknown task
    /// * `Err(OsError::MutexCeilingViolated)` - The task holds a ceiling
    ///   mutex whose ceiling is less urgent than `prio`
    pub fn task_set_priority(&mut self, task: TaskId, prio: OsPrio) -> OsResult<OsPrio> {
        if prio as usize >= CFG_PRIO_MAX {
            return Err(OsError::PrioInvalid);
        }

        critical_section(|_cs| {
            if !self.sched.is_valid(task) {
                return Err(OsError::TaskInvalid);
            }

            let violates_ceiling = self.threads.get(&task).is_some_and(|t| {
                t.held.iter().filter_map(|id| self.mutexes.get(id)).any(|m| {
                    matches!(m.protocol, Protocol::Ceiling(ceiling) if prio < ceiling)
                })
            });
            if violates_ceiling {
                crate::warn!("{} base prio {} above a held ceiling", task, prio);
                return Err(OsError::MutexCeilingViolated);
            }

            let old = self.sched.base_priority(task);
            self.sched.set_base_priority(task, prio);
            self.update_priority(task);
            Ok(old)
        })
    }
}
