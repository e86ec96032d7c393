//! Reference scheduler
//!
//! A priority-based ready-queue model implementing [`TaskModel`]. It keeps
//! the bookkeeping a preemptive scheduler needs (ready lists per priority,
//! a priority bitmap, TCBs) but leaves the choice of the running task to
//! the embedding: a port calls [`Scheduler::dispatch`] at its scheduling
//! points, a host harness may pick any ready task with
//! [`Scheduler::switch_to`].

mod rdy_list;

pub use rdy_list::ReadyList;

use alloc::vec::Vec;

use crate::config::{CFG_PRIO_MAX, CFG_TASK_MAX};
use crate::critical::CriticalSection;
use crate::error::{OsError, OsResult};
use crate::prio::PrioTable;
use crate::task::{OsTcb, TaskModel};
use crate::types::{OsPrio, OsTaskState, TaskId, WaitObject};

/// Ready-queue scheduler state
#[derive(Debug, Clone)]
pub struct Scheduler {
    tcbs: Vec<OsTcb>,
    prio_tbl: PrioTable,
    rdy_list: Vec<ReadyList>,
    cur: Option<TaskId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            tcbs: Vec::new(),
            prio_tbl: PrioTable::new(),
            rdy_list: (0..CFG_PRIO_MAX).map(|_| ReadyList::new()).collect(),
            cur: None,
        }
    }

    /// Create a ready task
    ///
    /// # Returns
    /// * `Ok(TaskId)` - Task created and made ready
    /// * `Err(OsError::PrioInvalid)` - Priority out of range
    /// * `Err(OsError::TaskNoMoreTcb)` - `CFG_TASK_MAX` tasks exist
    pub fn task_create(&mut self, name: &'static str, prio: OsPrio) -> OsResult<TaskId> {
        if prio as usize >= CFG_PRIO_MAX {
            return Err(OsError::PrioInvalid);
        }
        if self.tcbs.len() >= CFG_TASK_MAX {
            return Err(OsError::TaskNoMoreTcb);
        }

        self.tcbs.push(OsTcb::new(name, prio));
        let task = TaskId(self.tcbs.len() as u16);
        self.rdy_insert(task);

        crate::trace!("task {} created at prio {}", task, prio);
        Ok(task)
    }

    /// Get a task's control block
    pub fn tcb(&self, task: TaskId) -> Option<&OsTcb> {
        (task.0 as usize)
            .checked_sub(1)
            .and_then(|idx| self.tcbs.get(idx))
    }

    fn tcb_mut(&mut self, task: TaskId) -> &mut OsTcb {
        let idx = task.0 as usize - 1;
        &mut self.tcbs[idx]
    }

    /// Make `task` the running task
    ///
    /// # Returns
    /// * `Err(OsError::TaskInvalid)` - Unknown task
    /// * `Err(OsError::TaskNotRdy)` - Task is pending
    pub fn switch_to(&mut self, task: TaskId) -> OsResult<()> {
        let tcb = self.tcb(task).ok_or(OsError::TaskInvalid)?;
        if !tcb.is_ready() {
            return Err(OsError::TaskNotRdy);
        }
        self.cur = Some(task);
        Ok(())
    }

    /// Task selected by the last [`switch_to`](Self::switch_to) or
    /// [`dispatch`](Self::dispatch), even if it has since blocked
    #[inline]
    pub fn running(&self) -> Option<TaskId> {
        self.cur
    }

    /// Head of the most urgent non-empty ready list
    pub fn highest_ready(&self) -> Option<TaskId> {
        let prio = self.prio_tbl.highest()?;
        self.rdy_list[prio as usize].head()
    }

    /// Scheduling point: run the highest priority ready task
    pub fn dispatch(&mut self) -> Option<TaskId> {
        self.cur = self.highest_ready();
        self.cur
    }

    #[inline]
    pub fn prio_table(&self) -> &PrioTable {
        &self.prio_tbl
    }

    #[inline]
    pub fn rdy_list(&self, prio: OsPrio) -> &ReadyList {
        &self.rdy_list[prio as usize]
    }

    /// Iterate over all tasks
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &OsTcb)> + '_ {
        self.tcbs
            .iter()
            .enumerate()
            .map(|(idx, tcb)| (TaskId(idx as u16 + 1), tcb))
    }

    /// Make a task ready
    fn rdy_insert(&mut self, task: TaskId) {
        let prio = self.tcb_mut(task).prio;
        self.rdy_list[prio as usize].insert_tail(task);
        self.prio_tbl.insert(prio);
    }

    /// Remove a task from ready list
    fn rdy_remove(&mut self, task: TaskId) {
        let prio = self.tcb_mut(task).prio;
        let list = &mut self.rdy_list[prio as usize];
        list.remove(task);
        if list.is_empty() {
            self.prio_tbl.remove(prio);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskModel for Scheduler {
    fn current_task(&self) -> Option<TaskId> {
        self.cur
            .filter(|&task| self.tcb(task).is_some_and(OsTcb::is_ready))
    }

    fn is_valid(&self, task: TaskId) -> bool {
        self.tcb(task).is_some()
    }

    fn base_priority(&self, task: TaskId) -> OsPrio {
        self.tcbs[task.0 as usize - 1].base_prio
    }

    fn set_base_priority(&mut self, task: TaskId, prio: OsPrio) {
        self.tcb_mut(task).base_prio = prio;
    }

    fn effective_priority(&self, task: TaskId) -> OsPrio {
        self.tcbs[task.0 as usize - 1].prio
    }

    fn set_effective_priority(&mut self, task: TaskId, prio: OsPrio) {
        debug_assert!(CriticalSection::is_active());
        let tcb = self.tcb_mut(task);
        if tcb.prio == prio {
            return;
        }

        if tcb.is_ready() {
            // Move task to different priority
            self.rdy_remove(task);
            self.tcb_mut(task).prio = prio;
            self.rdy_insert(task);
        } else {
            tcb.prio = prio;
        }
    }

    fn block(&mut self, task: TaskId, on: WaitObject) {
        debug_assert!(CriticalSection::is_active());
        if self.tcb_mut(task).is_ready() {
            self.rdy_remove(task);
        }
        let tcb = self.tcb_mut(task);
        tcb.task_state = OsTaskState::Pend;
        tcb.pend_on = Some(on);
    }

    fn unblock(&mut self, task: TaskId) {
        debug_assert!(CriticalSection::is_active());
        let tcb = self.tcb_mut(task);
        if tcb.is_ready() {
            return;
        }
        tcb.task_state = OsTaskState::Ready;
        tcb.pend_on = None;
        self.rdy_insert(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critical::critical_section;
    use crate::types::MutexId;

    #[test]
    fn test_dispatch_picks_most_urgent() {
        let mut sched = Scheduler::new();
        let low = sched.task_create("low", 20).unwrap();
        let high = sched.task_create("high", 5).unwrap();

        assert_eq!(sched.dispatch(), Some(high));
        assert_eq!(sched.current_task(), Some(high));

        critical_section(|_cs| sched.block(high, WaitObject::Mutex(MutexId(1))));
        assert_eq!(sched.current_task(), None);
        assert_eq!(sched.dispatch(), Some(low));
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut sched = Scheduler::new();
        let a = sched.task_create("a", 10).unwrap();
        let b = sched.task_create("b", 10).unwrap();

        assert_eq!(sched.highest_ready(), Some(a));
        critical_section(|_cs| {
            sched.block(a, WaitObject::Mutex(MutexId(1)));
            sched.unblock(a);
        });
        assert_eq!(sched.highest_ready(), Some(b));
        assert_eq!(sched.rdy_list(10).tail(), Some(a));
    }

    #[test]
    fn test_priority_change_moves_ready_task() {
        let mut sched = Scheduler::new();
        let t = sched.task_create("t", 30).unwrap();

        critical_section(|_cs| sched.set_effective_priority(t, 3));
        assert!(sched.prio_table().is_set(3));
        assert!(!sched.prio_table().is_set(30));
        assert!(sched.tcb(t).unwrap().is_boosted());
        assert_eq!(sched.base_priority(t), 30);
    }

    #[test]
    fn test_switch_to_rejects_pending_task() {
        let mut sched = Scheduler::new();
        let t = sched.task_create("t", 1).unwrap();
        critical_section(|_cs| sched.block(t, WaitObject::Mutex(MutexId(7))));

        assert_eq!(sched.switch_to(t), Err(OsError::TaskNotRdy));
        assert_eq!(sched.switch_to(TaskId(9)), Err(OsError::TaskInvalid));
        assert_eq!(
            sched.tcb(t).unwrap().pend_on,
            Some(WaitObject::Mutex(MutexId(7)))
        );
    }

    #[test]
    fn test_invalid_priority() {
        let mut sched = Scheduler::new();
        assert_eq!(
            sched.task_create("bad", CFG_PRIO_MAX as u8),
            Err(OsError::PrioInvalid)
        );
    }
}
