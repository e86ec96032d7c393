//! Kernel state
//!
//! A [`Kernel`] owns the mutex and condition variable tables, the per-task
//! synchronization records (held mutexes, what a task pends on, the
//! outcome of its last blocking call), the pend-timeout tick wheel and the
//! clocks. The engines in [`crate::sync`] extend it with the mutex and
//! condition variable operations.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::sched::Scheduler;
use crate::sync::cond::CondCb;
use crate::sync::mutex::MutexCb;
use crate::task::TaskModel;
use crate::time::{self, Clock, TickWheel, Timeout, Timespec};
use crate::types::{CondId, MutexId, OsNestingCtr, OsTick, TaskId};

/// Systemic errors the kernel cannot recover from by itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fatal {
    /// A blocking call would have closed a wait-for cycle
    ThreadQueueDeadlock,
}

/// Fatal error hook
///
/// Runs in place of halting the system. When it returns, the call that
/// raised the error reports failure to its caller.
pub type FatalHandler = fn(Fatal);

/// What a blocked task waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pend {
    /// Ownership of a mutex; `then` is delivered once it is granted, with
    /// the nesting counter set to `nesting`
    Mutex {
        mutex: MutexId,
        then: OsResult<()>,
        nesting: OsNestingCtr,
    },
    /// A condition; `mutex` is reacquired after the wake-up at the nest
    /// level it was held at
    Cond {
        cond: CondId,
        mutex: MutexId,
        nesting: OsNestingCtr,
    },
}

/// Synchronization state of one task
#[derive(Debug, Default)]
pub(crate) struct ThreadSync {
    /// Mutexes currently owned, in acquisition order
    pub held: Vec<MutexId>,
    pub pend: Option<Pend>,
    /// Outcome of the last blocking call, until collected
    pub result: Option<OsResult<()>>,
}

impl ThreadSync {
    fn is_idle(&self) -> bool {
        self.held.is_empty() && self.pend.is_none() && self.result.is_none()
    }
}

/// Resource accounting of a kernel at one instant
///
/// Two snapshots taken around a balanced sequence of operations compare
/// equal; anything else means a leaked queue entry, timer, ownership or
/// priority boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSnapshot {
    pub mutexes: usize,
    pub conds: usize,
    /// Tasks queued on any mutex or condition variable
    pub waiters: usize,
    /// Armed pend timeouts
    pub timers: usize,
    /// Mutex ownerships summed over all tasks
    pub held: usize,
    /// Live per-task synchronization records
    pub sync_records: usize,
    /// Tasks whose effective priority differs from their base priority
    pub boosted: usize,
}

/// Mutex and condition variable core bound to a task model
pub struct Kernel<S: TaskModel = Scheduler> {
    pub(crate) sched: S,
    pub(crate) mutexes: BTreeMap<MutexId, MutexCb>,
    pub(crate) conds: BTreeMap<CondId, CondCb>,
    pub(crate) threads: BTreeMap<TaskId, ThreadSync>,
    /// Every task the engines ever touched, for boost accounting
    known_tasks: BTreeSet<TaskId>,
    pub(crate) tick_wheel: TickWheel,
    pub(crate) tick_counter: OsTick,
    ticks_total: u64,
    /// Realtime clock reading at tick 0, in nanoseconds
    realtime_base: i128,
    next_mutex_id: u16,
    next_cond_id: u16,
    fatal_hook: Option<FatalHandler>,
}

impl Kernel<Scheduler> {
    /// Kernel driving the reference scheduler
    pub fn with_scheduler() -> Self {
        Self::new(Scheduler::new())
    }
}

impl Default for Kernel<Scheduler> {
    fn default() -> Self {
        Self::with_scheduler()
    }
}

impl<S: TaskModel> Kernel<S> {
    pub fn new(sched: S) -> Self {
        Kernel {
            sched,
            mutexes: BTreeMap::new(),
            conds: BTreeMap::new(),
            threads: BTreeMap::new(),
            known_tasks: BTreeSet::new(),
            tick_wheel: TickWheel::new(),
            tick_counter: 0,
            ticks_total: 0,
            realtime_base: 0,
            next_mutex_id: 1,
            next_cond_id: 1,
            fatal_hook: None,
        }
    }

    #[inline]
    pub fn sched(&self) -> &S {
        &self.sched
    }

    /// Mutable access to the task model, for creating and dispatching
    /// tasks. Priorities and blocked state of tasks must only be changed
    /// through the kernel.
    #[inline]
    pub fn sched_mut(&mut self) -> &mut S {
        &mut self.sched
    }

    // ============ Tasks ============

    /// Task the current operation runs for
    pub(crate) fn current(&self) -> OsResult<TaskId> {
        self.sched.current_task().ok_or(OsError::TaskInvalid)
    }

    /// Synchronization record of `task`, created on first use
    pub(crate) fn thread(&mut self, task: TaskId) -> &mut ThreadSync {
        self.known_tasks.insert(task);
        self.threads.entry(task).or_default()
    }

    /// Drop the record of `task` once nothing refers to it
    pub(crate) fn retire_thread(&mut self, task: TaskId) {
        if self.threads.get(&task).is_some_and(ThreadSync::is_idle) {
            self.threads.remove(&task);
        }
    }

    /// Mutex `task` is queued on, if any
    pub(crate) fn pending_mutex(&self, task: TaskId) -> Option<MutexId> {
        match self.threads.get(&task)?.pend? {
            Pend::Mutex { mutex, .. } => Some(mutex),
            Pend::Cond { .. } => None,
        }
    }

    /// Mutexes owned by `task`, in acquisition order
    pub fn held_mutexes(&self, task: TaskId) -> Vec<MutexId> {
        self.threads
            .get(&task)
            .map(|t| t.held.clone())
            .unwrap_or_default()
    }

    /// Collect the outcome of the last blocking call of `task`
    ///
    /// A port calls this when the blocked task resumes; `None` means the
    /// task is still waiting (or never blocked).
    ///
    /// # Returns
    /// * `Ok(())` - The mutex is owned (for a condition wait: signaled and
    ///   the mutex reacquired)
    /// * `Err(OsError::Timeout)` - The wait timed out
    /// * `Err(OsError::PendAbort)` - The mutex was flushed
    /// * `Err(OsError::ObjDel)` - The object was deleted
    /// * `Err(OsError::MutexDeadlock)` - Reacquiring the mutex after a
    ///   condition wait would have deadlocked
    pub fn wait_result(&mut self, task: TaskId) -> Option<OsResult<()>> {
        critical_section(|_cs| {
            let result = self.threads.get_mut(&task)?.result.take();
            self.retire_thread(task);
            result
        })
    }

    /// Deliver `result` to a blocked task and make it ready
    pub(crate) fn wake(&mut self, task: TaskId, result: OsResult<()>) {
        self.tick_wheel.remove(task);
        let thread = self.thread(task);
        thread.pend = None;
        thread.result = Some(result);
        self.sched.unblock(task);
        crate::trace!("{} woken", task);
    }

    // ============ Time ============

    /// Get current tick count
    #[inline]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter
    }

    /// Tick handler: advance time by one tick and expire due pend timeouts
    pub fn tick(&mut self) {
        critical_section(|_cs| {
            self.tick_counter = self.tick_counter.wrapping_add(1);
            self.ticks_total += 1;

            for task in self.tick_wheel.advance(self.tick_counter) {
                self.pend_timeout(task);
            }
        });
    }

    /// Run `n` tick handlers
    pub fn tick_n(&mut self, n: OsTick) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Current reading of `clock`
    pub fn clock_now(&self, clock: Clock) -> Timespec {
        let elapsed = time::ticks_to_nanos(self.ticks_total);
        match clock {
            Clock::Monotonic => Timespec::from_nanos(elapsed),
            Clock::Realtime => Timespec::from_nanos(self.realtime_base + elapsed),
        }
    }

    /// Set the realtime clock; monotonic deadlines are unaffected
    pub fn set_realtime(&mut self, now: Timespec) -> OsResult<()> {
        if !now.is_valid() {
            return Err(OsError::TimeInvalid);
        }
        critical_section(|_cs| {
            self.realtime_base = now.as_nanos() - time::ticks_to_nanos(self.ticks_total);
        });
        Ok(())
    }

    /// Convert an absolute deadline on `clock` into a relative timeout
    pub fn timeout_until(&self, clock: Clock, deadline: &Timespec) -> OsResult<Timeout> {
        time::timeout_between(&self.clock_now(clock), deadline)
    }

    pub(crate) fn arm_timeout(&mut self, task: TaskId, timeout: Timeout) {
        if let Timeout::Ticks(ticks) = timeout {
            self.tick_wheel.insert(task, self.tick_counter, ticks);
        }
    }

    // ============ Object ids ============

    pub(crate) fn alloc_mutex_id(&mut self) -> OsResult<MutexId> {
        let id = self.next_mutex_id;
        self.next_mutex_id = id.checked_add(1).ok_or(OsError::ObjNoMore)?;
        Ok(MutexId(id))
    }

    pub(crate) fn alloc_cond_id(&mut self) -> OsResult<CondId> {
        let id = self.next_cond_id;
        self.next_cond_id = id.checked_add(1).ok_or(OsError::ObjNoMore)?;
        Ok(CondId(id))
    }

    // ============ Fatal errors ============

    /// Install (or remove) the fatal error hook
    pub fn set_fatal_handler(&mut self, handler: Option<FatalHandler>) {
        self.fatal_hook = handler;
    }

    /// Report a fatal error
    ///
    /// # Panics
    /// When no hook is installed: the system halts.
    pub fn fatal(&self, fatal: Fatal) {
        crate::error!("fatal error {}", fatal);
        match self.fatal_hook {
            Some(hook) => hook(fatal),
            None => panic!("fatal error: {:?}", fatal),
        }
    }

    // ============ Accounting ============

    /// Take a resource accounting snapshot
    pub fn snapshot(&self) -> ResourceSnapshot {
        critical_section(|_cs| ResourceSnapshot {
            mutexes: self.mutexes.len(),
            conds: self.conds.len(),
            waiters: self.mutexes.values().map(|m| m.wait_queue.len()).sum::<usize>()
                + self.conds.values().map(|c| c.wait_queue.len()).sum::<usize>(),
            timers: self.tick_wheel.len(),
            held: self.threads.values().map(|t| t.held.len()).sum(),
            sync_records: self.threads.len(),
            boosted: self
                .known_tasks
                .iter()
                .filter(|&&t| {
                    self.sched.is_valid(t)
                        && self.sched.effective_priority(t) != self.sched.base_priority(t)
                })
                .count(),
        })
    }
}
