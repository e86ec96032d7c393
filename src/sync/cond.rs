//! Condition variable engine
//!
//! A condition variable has no owner and no protocol, only a wait queue and
//! the mutex its current waiters use. Waiting releases the mutex and
//! enqueues the caller in one critical section, so no signal can slip in
//! between. A woken waiter does not run until it owns the mutex again: it
//! is moved straight onto the mutex's wait queue when the mutex is taken
//! ("wait morphing"), inheriting as any other mutex waiter.

use alloc::vec::Vec;

use crate::config::CFG_COND_MAX;
use crate::core::kernel::{Kernel, Pend};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::sync::mutex::Seize;
use crate::sync::WaitQueue;
use crate::task::TaskModel;
use crate::time::{Clock, Timeout, Timespec};
use crate::types::{opt, CondId, LockStatus, MutexId, OsNestingCtr, OsOpt, TaskId, WaitObject};

/// Condition variable control block
#[derive(Debug)]
pub struct CondCb {
    pub(crate) name: &'static str,
    /// Clock absolute deadlines of timed waits refer to
    pub(crate) clock: Clock,
    /// Mutex shared by the current waiters
    pub(crate) mutex: Option<MutexId>,
    pub(crate) wait_queue: WaitQueue,
}

impl CondCb {
    fn new(name: &'static str, clock: Clock) -> Self {
        CondCb {
            name,
            clock,
            mutex: None,
            wait_queue: WaitQueue::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn clock(&self) -> Clock {
        self.clock
    }
}

impl<S: TaskModel> Kernel<S> {
    /// Create a condition variable
    ///
    /// # Returns
    /// * `Err(OsError::CreateIsr)` - Called from ISR
    /// * `Err(OsError::ObjNoMore)` - `CFG_COND_MAX` condition variables exist
    pub fn cond_create(&mut self, name: &'static str) -> OsResult<CondId> {
        self.cond_create_with_clock(name, Clock::default())
    }

    /// Create a condition variable whose timed waits use `clock`
    pub fn cond_create_with_clock(&mut self, name: &'static str, clock: Clock) -> OsResult<CondId> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            if self.conds.len() >= CFG_COND_MAX {
                return Err(OsError::ObjNoMore);
            }

            let id = self.alloc_cond_id()?;
            self.conds.insert(id, CondCb::new(name, clock));
            Ok(id)
        })
    }

    /// Release `mutex` and wait for the condition
    ///
    /// `mutex` is released at every nest level (handing it to the next
    /// waiter) and the caller is queued on `cond` in the same critical
    /// section. Once signaled, broadcast, timed out or deleted, the caller
    /// reacquires `mutex` at the nest level it held before its outcome is
    /// delivered through [`Kernel::wait_result`].
    ///
    /// # Returns
    /// * `Ok(LockStatus::Blocked)` - Caller is suspended
    /// * `Err(OsError::Timeout)` - `timeout` already expired; the mutex was
    ///   released and taken again without waiting
    /// * `Err(OsError::MutexNotOwner)` - Caller does not own `mutex`
    /// * `Err(OsError::CondMutexMismatch)` - Waiters on `cond` use another mutex
    pub fn cond_wait(&mut self, cond: CondId, mutex: MutexId, timeout: Timeout) -> OsResult<LockStatus> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        critical_section(|_cs| {
            let cur = self.current()?;
            let c = self.conds.get(&cond).ok_or(OsError::ObjType)?;
            let m = self.mutexes.get_mut(&mutex).ok_or(OsError::ObjType)?;

            if m.owner != Some(cur) {
                return Err(OsError::MutexNotOwner);
            }
            if c.mutex.is_some_and(|bound| bound != mutex) {
                return Err(OsError::CondMutexMismatch);
            }

            let nesting = m.nesting_ctr;
            self.release(mutex, cur);

            if timeout == Timeout::Expired {
                return match self.seize(mutex, cur)? {
                    Seize::Acquired => {
                        self.restore_nesting(mutex, nesting);
                        Err(OsError::Timeout)
                    }
                    Seize::Contended(owner) => {
                        if self.would_deadlock(cur, owner) {
                            return Err(OsError::MutexDeadlock);
                        }
                        self.enqueue_waiter(mutex, cur, owner, Err(OsError::Timeout), nesting, Timeout::Forever);
                        Ok(LockStatus::Blocked)
                    }
                };
            }

            let prio = self.sched.effective_priority(cur);
            let Some(c) = self.conds.get_mut(&cond) else {
                return Err(OsError::ObjType);
            };
            c.mutex = Some(mutex);
            c.wait_queue.enqueue(cur, prio);

            self.thread(cur).pend = Some(Pend::Cond { cond, mutex, nesting });
            self.arm_timeout(cur, timeout);
            self.sched.block(cur, WaitObject::Cond(cond));
            crate::trace!("{} waits on {}", cur, cond);
            Ok(LockStatus::Blocked)
        })
    }

    /// Wake the most urgent waiter
    pub fn cond_signal(&mut self, cond: CondId) -> OsResult<()> {
        critical_section(|_cs| {
            let c = self.conds.get_mut(&cond).ok_or(OsError::ObjType)?;
            let waiter = c.wait_queue.dequeue_highest();
            if c.wait_queue.is_empty() {
                c.mutex = None;
            }

            if let Some(task) = waiter {
                self.cond_wake(task, Ok(()));
            }
            Ok(())
        })
    }

    /// Wake every waiter, most urgent first
    pub fn cond_broadcast(&mut self, cond: CondId) -> OsResult<()> {
        critical_section(|_cs| {
            let c = self.conds.get_mut(&cond).ok_or(OsError::ObjType)?;
            let waiters = c.wait_queue.flush();
            c.mutex = None;

            for task in waiters {
                self.cond_wake(task, Ok(()));
            }
            Ok(())
        })
    }

    /// Delete a condition variable
    ///
    /// # Arguments
    /// * `del_opt` - `opt::DEL_NO_PEND` refuses a condition with waiters;
    ///   `opt::DEL_ALWAYS` wakes them with [`OsError::ObjDel`] (after they
    ///   reacquire their mutex)
    ///
    /// # Returns
    /// * `Err(OsError::ObjBusy)` - `DEL_NO_PEND` and there are waiters
    /// * `Err(OsError::OptInvalid)` - Unknown option
    pub fn cond_delete(&mut self, cond: CondId, del_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }

        critical_section(|_cs| {
            let c = self.conds.get(&cond).ok_or(OsError::ObjType)?;
            match del_opt {
                opt::DEL_NO_PEND => {
                    if !c.wait_queue.is_empty() {
                        return Err(OsError::ObjBusy);
                    }
                }
                opt::DEL_ALWAYS => {}
                _ => return Err(OsError::OptInvalid),
            }

            let Some(mut c) = self.conds.remove(&cond) else {
                return Err(OsError::ObjType);
            };
            for task in c.wait_queue.flush() {
                self.cond_wake(task, Err(OsError::ObjDel));
            }
            Ok(())
        })
    }

    /// Wait until signaled or until the absolute `deadline` on the
    /// condition's clock passes
    ///
    /// # Returns
    /// * `Err(OsError::TimeInvalid)` - Malformed deadline; the mutex is kept
    /// * otherwise as [`Kernel::cond_wait`]
    pub fn cond_wait_until(&mut self, cond: CondId, mutex: MutexId, deadline: &Timespec) -> OsResult<LockStatus> {
        let clock = self.cond_cb(cond)?.clock;
        let timeout = self.timeout_until(clock, deadline)?;
        self.cond_wait(cond, mutex, timeout)
    }

    // ============ Queries ============

    /// Waiting tasks in wake-up order
    pub fn cond_waiters(&self, cond: CondId) -> OsResult<Vec<TaskId>> {
        Ok(self.cond_cb(cond)?.wait_queue.iter().collect())
    }

    /// Mutex the current waiters use, `None` without waiters
    pub fn cond_mutex(&self, cond: CondId) -> OsResult<Option<MutexId>> {
        Ok(self.cond_cb(cond)?.mutex)
    }

    pub fn cond_cb(&self, cond: CondId) -> OsResult<&CondCb> {
        self.conds.get(&cond).ok_or(OsError::ObjType)
    }

    // ============ Engine internals ============

    /// Take `task` off the queue of `cond`
    pub(crate) fn cond_dequeue(&mut self, cond: CondId, task: TaskId) {
        if let Some(c) = self.conds.get_mut(&cond) {
            c.wait_queue.remove(task);
            if c.wait_queue.is_empty() {
                c.mutex = None;
            }
        }
    }

    /// Send a waiter already removed from its condition to reacquire its
    /// mutex
    fn cond_wake(&mut self, task: TaskId, outcome: OsResult<()>) {
        let (mutex, nesting) = match self.thread(task).pend.take() {
            Some(Pend::Cond { mutex, nesting, .. }) => (mutex, nesting),
            other => {
                debug_assert!(false, "{:?} woken from a cond while pending on {:?}", task, other);
                return;
            }
        };
        self.tick_wheel.remove(task);
        self.reacquire(task, mutex, nesting, outcome);
    }

    /// Wait-morphing step: `task` (blocked, not queued) takes `mutex` back
    /// at nest level `nesting`
    ///
    /// A free mutex is granted at once and `outcome` delivered. A taken one
    /// queues the task with `outcome` pending, unless that would close a
    /// wait-for cycle; then the task is released with
    /// [`OsError::MutexDeadlock`]. A deleted mutex yields [`OsError::ObjDel`].
    pub(crate) fn reacquire(
        &mut self,
        task: TaskId,
        mutex: MutexId,
        nesting: OsNestingCtr,
        outcome: OsResult<()>,
    ) {
        if let Some(t) = self.threads.get_mut(&task) {
            t.pend = None;
        }

        match self.seize(mutex, task) {
            Ok(Seize::Acquired) => {
                self.restore_nesting(mutex, nesting);
                self.wake(task, outcome);
            }
            Ok(Seize::Contended(owner)) => {
                if self.would_deadlock(task, owner) {
                    crate::warn!("{} reacquiring {} would deadlock", task, mutex);
                    self.wake(task, Err(OsError::MutexDeadlock));
                } else {
                    self.enqueue_waiter(mutex, task, owner, outcome, nesting, Timeout::Forever);
                }
            }
            Err(OsError::ObjType) => self.wake(task, Err(OsError::ObjDel)),
            Err(e) => self.wake(task, Err(e)),
        }
    }
}
