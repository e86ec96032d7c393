//! Mutex engine
//!
//! Mutexes provide mutual exclusion with one of three locking protocols.
//! Under priority inheritance the owner runs at the priority of its most
//! urgent waiter; under priority ceiling it runs at the mutex's ceiling for
//! as long as it holds the mutex. Boosts propagate along chains of nested
//! ownership and are undone layer by layer.

use alloc::vec::Vec;

use crate::config::{CFG_MUTEX_MAX, CFG_MUTEX_NESTING_MAX, CFG_PRIO_MAX};
use crate::core::kernel::{Kernel, Pend};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::sync::WaitQueue;
use crate::task::TaskModel;
use crate::time::Timeout;
use crate::types::{opt, LockStatus, MutexId, OsNestingCtr, OsOpt, OsPrio, TaskId, WaitObject};

/// Locking protocol of a mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    /// No priority adjustment
    None,
    /// The owner inherits the priority of its most urgent waiter
    Inherit,
    /// The owner runs at the ceiling while it holds the mutex; callers more
    /// urgent than the ceiling are refused
    Ceiling(OsPrio),
}

/// Whether the owner may lock the mutex again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NestPolicy {
    /// A second lock by the owner fails with [`OsError::MutexOwner`]
    Disallowed,
    /// Locks by the owner count up; as many unlocks release the mutex
    Allowed,
}

/// Mutex control block
#[derive(Debug)]
pub struct MutexCb {
    /// Name for debugging
    pub(crate) name: &'static str,
    pub(crate) protocol: Protocol,
    pub(crate) nesting: NestPolicy,
    /// Task that owns the mutex
    pub(crate) owner: Option<TaskId>,
    /// Nesting counter
    pub(crate) nesting_ctr: OsNestingCtr,
    /// Tasks waiting for ownership
    pub(crate) wait_queue: WaitQueue,
}

impl MutexCb {
    fn new(name: &'static str, protocol: Protocol, nesting: NestPolicy) -> Self {
        MutexCb {
            name,
            protocol,
            nesting,
            owner: None,
            nesting_ctr: 0,
            wait_queue: WaitQueue::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }
}

/// Outcome of an attempt to take a mutex without blocking
pub(crate) enum Seize {
    Acquired,
    /// Owned by this other task
    Contended(TaskId),
}

impl<S: TaskModel> Kernel<S> {
    /// Create a mutex
    ///
    /// # Returns
    /// * `Ok(MutexId)` - Mutex created, unlocked
    /// * `Err(OsError::CreateIsr)` - Called from ISR
    /// * `Err(OsError::PrioInvalid)` - Ceiling out of range
    /// * `Err(OsError::ObjNoMore)` - `CFG_MUTEX_MAX` mutexes exist
    pub fn mutex_create(
        &mut self,
        name: &'static str,
        protocol: Protocol,
        nesting: NestPolicy,
    ) -> OsResult<MutexId> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        if let Protocol::Ceiling(ceiling) = protocol {
            if ceiling as usize >= CFG_PRIO_MAX {
                return Err(OsError::PrioInvalid);
            }
        }

        critical_section(|_cs| {
            if self.mutexes.len() >= CFG_MUTEX_MAX {
                return Err(OsError::ObjNoMore);
            }

            let id = self.alloc_mutex_id()?;
            self.mutexes.insert(id, MutexCb::new(name, protocol, nesting));
            crate::trace!("{} created", id);
            Ok(id)
        })
    }

    /// Acquire the mutex without blocking
    ///
    /// # Returns
    /// * `Ok(())` - Mutex acquired (or nesting count raised)
    /// * `Err(OsError::PendWouldBlock)` - Owned by another task
    /// * `Err(OsError::MutexOwner)` - Caller owns it and nesting is not allowed
    /// * `Err(OsError::MutexOvf)` - Nesting counter at its limit
    /// * `Err(OsError::MutexCeilingViolated)` - Caller is more urgent than the ceiling
    pub fn mutex_try_lock(&mut self, id: MutexId) -> OsResult<()> {
        critical_section(|_cs| {
            let cur = self.current()?;
            match self.seize(id, cur)? {
                Seize::Acquired => Ok(()),
                Seize::Contended(_) => Err(OsError::PendWouldBlock),
            }
        })
    }

    /// Acquire the mutex, blocking while another task owns it
    ///
    /// If the mutex is owned by a less urgent task under priority
    /// inheritance, the owner (and every owner it waits for in turn) is
    /// boosted to the caller's priority.
    ///
    /// # Arguments
    /// * `timeout` - How long to wait; `Timeout::Expired` never blocks
    ///
    /// # Returns
    /// * `Ok(LockStatus::Acquired)` - Caller owns the mutex
    /// * `Ok(LockStatus::Blocked)` - Caller is suspended; see [`Kernel::wait_result`]
    /// * `Err(OsError::Timeout)` - Owned by another task and `timeout` already expired
    /// * `Err(OsError::MutexDeadlock)` - Blocking would close a wait-for cycle
    /// * `Err(OsError::MutexOwner)` - Caller owns it and nesting is not allowed
    /// * `Err(OsError::MutexCeilingViolated)` - Caller is more urgent than the ceiling
    pub fn mutex_lock(&mut self, id: MutexId, timeout: Timeout) -> OsResult<LockStatus> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        critical_section(|_cs| {
            let cur = self.current()?;

            let owner = match self.seize(id, cur)? {
                Seize::Acquired => return Ok(LockStatus::Acquired),
                Seize::Contended(owner) => owner,
            };

            if timeout == Timeout::Expired {
                return Err(OsError::Timeout);
            }

            if self.would_deadlock(cur, owner) {
                crate::warn!("{} on {} would deadlock", cur, id);
                return Err(OsError::MutexDeadlock);
            }

            self.enqueue_waiter(id, cur, owner, Ok(()), 1, timeout);
            Ok(LockStatus::Blocked)
        })
    }

    /// Release the mutex
    ///
    /// A nested owner only drops one level. The final unlock restores the
    /// caller's priority to what its remaining mutexes entitle it to and
    /// hands the mutex to the most urgent waiter.
    ///
    /// # Returns
    /// * `Err(OsError::PostIsr)` - Called from ISR
    /// * `Err(OsError::MutexNotOwner)` - Caller does not own the mutex
    pub fn mutex_unlock(&mut self, id: MutexId) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PostIsr);
        }

        critical_section(|_cs| {
            let cur = self.current()?;
            let m = self.mutexes.get_mut(&id).ok_or(OsError::ObjType)?;

            if m.owner != Some(cur) {
                return Err(OsError::MutexNotOwner);
            }

            if m.nesting_ctr > 1 {
                m.nesting_ctr -= 1;
                return Ok(());
            }

            self.release(id, cur);
            Ok(())
        })
    }

    /// Wake every waiter with [`OsError::PendAbort`]
    ///
    /// The owner keeps the mutex and loses any boost the waiters gave it.
    pub fn mutex_flush(&mut self, id: MutexId) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::FlushIsr);
        }

        critical_section(|_cs| {
            let m = self.mutexes.get_mut(&id).ok_or(OsError::ObjType)?;
            let waiters = m.wait_queue.flush();
            let owner = m.owner;

            for task in waiters {
                self.wake(task, Err(OsError::PendAbort));
            }
            if let Some(owner) = owner {
                self.update_priority(owner);
            }
            Ok(())
        })
    }

    /// Delete a mutex
    ///
    /// # Arguments
    /// * `del_opt` - `opt::DEL_NO_PEND` refuses a locked or waited-on
    ///   mutex; `opt::DEL_ALWAYS` wakes the waiters with
    ///   [`OsError::ObjDel`] and takes the mutex from its owner
    ///
    /// # Returns
    /// * `Err(OsError::ObjBusy)` - `DEL_NO_PEND` and the mutex is locked or waited on
    /// * `Err(OsError::OptInvalid)` - Unknown option
    pub fn mutex_delete(&mut self, id: MutexId, del_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }

        critical_section(|_cs| {
            let m = self.mutexes.get(&id).ok_or(OsError::ObjType)?;
            match del_opt {
                opt::DEL_NO_PEND => {
                    if m.is_owned() || !m.wait_queue.is_empty() {
                        return Err(OsError::ObjBusy);
                    }
                }
                opt::DEL_ALWAYS => {}
                _ => return Err(OsError::OptInvalid),
            }

            let Some(mut m) = self.mutexes.remove(&id) else {
                return Err(OsError::ObjType);
            };
            for task in m.wait_queue.flush() {
                self.wake(task, Err(OsError::ObjDel));
            }
            if let Some(owner) = m.owner {
                self.thread(owner).held.retain(|&h| h != id);
                self.update_priority(owner);
                self.retire_thread(owner);
            }

            crate::trace!("{} deleted", id);
            Ok(())
        })
    }

    /// Change the priority ceiling
    ///
    /// Allowed while the mutex is unlocked or owned by the caller; an
    /// owning caller is moved to the new ceiling right away.
    ///
    /// # Returns
    /// * `Ok(OsPrio)` - The previous ceiling
    /// * `Err(OsError::PrioInvalid)` - Ceiling out of range
    /// * `Err(OsError::OptInvalid)` - Not a ceiling mutex
    /// * `Err(OsError::MutexNotOwner)` - Owned by another task
    pub fn mutex_set_ceiling(&mut self, id: MutexId, ceiling: OsPrio) -> OsResult<OsPrio> {
        if ceiling as usize >= CFG_PRIO_MAX {
            return Err(OsError::PrioInvalid);
        }

        critical_section(|_cs| {
            let cur = self.sched.current_task();
            let m = self.mutexes.get_mut(&id).ok_or(OsError::ObjType)?;

            let Protocol::Ceiling(old) = m.protocol else {
                return Err(OsError::OptInvalid);
            };
            if m.owner.is_some() && m.owner != cur {
                return Err(OsError::MutexNotOwner);
            }

            m.protocol = Protocol::Ceiling(ceiling);
            if let Some(owner) = m.owner {
                self.update_priority(owner);
            }
            Ok(old)
        })
    }

    // ============ Queries ============

    pub fn mutex_owner(&self, id: MutexId) -> OsResult<Option<TaskId>> {
        Ok(self.mutex_cb(id)?.owner)
    }

    pub fn mutex_nesting(&self, id: MutexId) -> OsResult<OsNestingCtr> {
        Ok(self.mutex_cb(id)?.nesting_ctr)
    }

    pub fn mutex_protocol(&self, id: MutexId) -> OsResult<Protocol> {
        Ok(self.mutex_cb(id)?.protocol)
    }

    /// Priority ceiling, `None` unless the protocol is `Ceiling`
    pub fn mutex_ceiling(&self, id: MutexId) -> OsResult<Option<OsPrio>> {
        Ok(match self.mutex_cb(id)?.protocol {
            Protocol::Ceiling(ceiling) => Some(ceiling),
            _ => None,
        })
    }

    /// Waiting tasks in wake-up order
    pub fn mutex_waiters(&self, id: MutexId) -> OsResult<Vec<TaskId>> {
        Ok(self.mutex_cb(id)?.wait_queue.iter().collect())
    }

    pub fn mutex_cb(&self, id: MutexId) -> OsResult<&MutexCb> {
        self.mutexes.get(&id).ok_or(OsError::ObjType)
    }

    // ============ Engine internals ============

    /// Take the mutex for `task` if that needs no waiting
    ///
    /// Checks the ceiling first, so a violating caller is refused whether
    /// or not the mutex is owned.
    pub(crate) fn seize(&mut self, id: MutexId, task: TaskId) -> OsResult<Seize> {
        let prio = self.sched.effective_priority(task);
        let m = self.mutexes.get_mut(&id).ok_or(OsError::ObjType)?;

        if let Protocol::Ceiling(ceiling) = m.protocol {
            if prio < ceiling {
                crate::warn!("{} at prio {} above ceiling of {}", task, prio, id);
                return Err(OsError::MutexCeilingViolated);
            }
        }

        match m.owner {
            None => {
                self.grant(id, task);
                Ok(Seize::Acquired)
            }
            Some(owner) if owner == task => match m.nesting {
                NestPolicy::Disallowed => Err(OsError::MutexOwner),
                NestPolicy::Allowed => {
                    if m.nesting_ctr >= CFG_MUTEX_NESTING_MAX {
                        return Err(OsError::MutexOvf);
                    }
                    m.nesting_ctr += 1;
                    Ok(Seize::Acquired)
                }
            },
            Some(owner) => Ok(Seize::Contended(owner)),
        }
    }

    /// Make `task` the owner of the unlocked mutex `id`
    ///
    /// `task` must not be queued anywhere.
    fn grant(&mut self, id: MutexId, task: TaskId) {
        let Some(m) = self.mutexes.get_mut(&id) else {
            return;
        };
        debug_assert!(m.owner.is_none());
        m.owner = Some(task);
        m.nesting_ctr = 1;

        self.thread(task).held.push(id);
        self.update_priority(task);
        crate::trace!("{} granted to {}", id, task);
    }

    /// Queue `task` on the mutex `id` owned by `owner` and suspend it
    ///
    /// `then` is what the task gets once ownership is granted, with the
    /// nesting counter at `nesting`.
    pub(crate) fn enqueue_waiter(
        &mut self,
        id: MutexId,
        task: TaskId,
        owner: TaskId,
        then: OsResult<()>,
        nesting: OsNestingCtr,
        timeout: Timeout,
    ) {
        let prio = self.sched.effective_priority(task);
        let Some(m) = self.mutexes.get_mut(&id) else {
            return;
        };
        m.wait_queue.enqueue(task, prio);

        self.thread(task).pend = Some(Pend::Mutex { mutex: id, then, nesting });
        self.arm_timeout(task, timeout);
        self.sched.block(task, WaitObject::Mutex(id));
        crate::trace!("{} blocked on {} owned by {}", task, id, owner);

        self.update_priority(owner);
    }

    /// Fully release `id` held by `owner`, then hand it to the next waiter
    pub(crate) fn release(&mut self, id: MutexId, owner: TaskId) {
        if let Some(m) = self.mutexes.get_mut(&id) {
            m.owner = None;
            m.nesting_ctr = 0;
        }

        self.thread(owner).held.retain(|&h| h != id);
        self.update_priority(owner);
        self.retire_thread(owner);

        self.hand_over(id);
    }

    /// Give the unlocked mutex `id` to its most urgent waiter, if any
    fn hand_over(&mut self, id: MutexId) {
        let Some(next) = self
            .mutexes
            .get_mut(&id)
            .and_then(|m| m.wait_queue.dequeue_highest())
        else {
            return;
        };

        let (then, nesting) = match self.thread(next).pend.take() {
            Some(Pend::Mutex { then, nesting, .. }) => (then, nesting),
            _ => (Ok(()), 1),
        };
        self.tick_wheel.remove(next);
        self.grant(id, next);
        self.restore_nesting(id, nesting);
        self.wake(next, then);
    }

    /// Put back the nest level a waiter held before a condition wait
    pub(crate) fn restore_nesting(&mut self, id: MutexId, nesting: OsNestingCtr) {
        if let Some(m) = self.mutexes.get_mut(&id) {
            debug_assert!(m.nesting_ctr == 1);
            m.nesting_ctr = nesting;
        }
    }

    /// A pend timeout of `task` fired
    pub(crate) fn pend_timeout(&mut self, task: TaskId) {
        match self.threads.get(&task).and_then(|t| t.pend) {
            Some(Pend::Mutex { mutex, .. }) => {
                let owner = self.mutexes.get_mut(&mutex).and_then(|m| {
                    m.wait_queue.remove(task);
                    m.owner
                });
                self.wake(task, Err(OsError::Timeout));
                if let Some(owner) = owner {
                    self.update_priority(owner);
                }
                crate::trace!("{} timed out on {}", task, mutex);
            }
            Some(Pend::Cond { cond, mutex, nesting }) => {
                self.cond_dequeue(cond, task);
                self.reacquire(task, mutex, nesting, Err(OsError::Timeout));
                crate::trace!("{} timed out on {}", task, cond);
            }
            None => debug_assert!(false, "{:?} timed out without pending", task),
        }
    }
}
