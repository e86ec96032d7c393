//! POSIX mutex and condition variable personality
//!
//! Status codes are errno values (newlib numbering); 0 is success.
//! POSIX priorities count upwards (larger is more urgent) and are mapped
//! onto kernel priorities with `kernel = CFG_PRIO_MAX - 1 - posix`.

use crate::config::CFG_PRIO_MAX;
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::sync::mutex::{NestPolicy, Protocol};
use crate::task::TaskModel;
use crate::time::{Clock, Timeout, Timespec};
use crate::types::{opt, CondId, LockStatus, MutexId, OsPrio};

/// errno values
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const EINTR: i32 = 4;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const EDEADLK: i32 = 45;
    pub const ETIMEDOUT: i32 = 116;
    pub const ENOTSUP: i32 = 134;
}

use errno::*;

// ============ Mutex attributes ============

pub const PTHREAD_MUTEX_NORMAL: i32 = 0;
pub const PTHREAD_MUTEX_RECURSIVE: i32 = 1;
pub const PTHREAD_MUTEX_ERRORCHECK: i32 = 2;
pub const PTHREAD_MUTEX_DEFAULT: i32 = 3;

pub const PTHREAD_PRIO_NONE: i32 = 0;
pub const PTHREAD_PRIO_INHERIT: i32 = 1;
pub const PTHREAD_PRIO_PROTECT: i32 = 2;

pub const CLOCK_REALTIME: i32 = 1;
pub const CLOCK_MONOTONIC: i32 = 4;

/// Most urgent POSIX priority
pub const SCHED_PRIO_MAX: i32 = CFG_PRIO_MAX as i32 - 1;
/// Least urgent POSIX priority
pub const SCHED_PRIO_MIN: i32 = 1;

/// Kernel priority of a POSIX priority
pub fn core_priority(posix: i32) -> Option<OsPrio> {
    if (SCHED_PRIO_MIN..=SCHED_PRIO_MAX).contains(&posix) {
        Some((CFG_PRIO_MAX as i32 - 1 - posix) as OsPrio)
    } else {
        None
    }
}

/// POSIX priority of a kernel priority
pub fn posix_priority(prio: OsPrio) -> i32 {
    CFG_PRIO_MAX as i32 - 1 - prio as i32
}

/// `pthread_mutexattr_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexAttr {
    pub kind: i32,
    pub protocol: i32,
    /// POSIX priority; only used with `PTHREAD_PRIO_PROTECT`
    pub prioceiling: i32,
}

impl Default for MutexAttr {
    fn default() -> Self {
        MutexAttr {
            kind: PTHREAD_MUTEX_DEFAULT,
            protocol: PTHREAD_PRIO_NONE,
            prioceiling: SCHED_PRIO_MAX,
        }
    }
}

/// `pthread_condattr_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondAttr {
    pub clock: i32,
}

impl Default for CondAttr {
    fn default() -> Self {
        CondAttr {
            clock: CLOCK_REALTIME,
        }
    }
}

/// Map a kernel error onto an errno value
pub fn errno_of(err: OsError) -> i32 {
    match err {
        OsError::CreateIsr
        | OsError::DelIsr
        | OsError::FlushIsr
        | OsError::PostIsr
        | OsError::PendIsr => EPERM,
        OsError::CondMutexMismatch => EINVAL,
        OsError::MutexNotOwner => EPERM,
        OsError::MutexOwner | OsError::MutexDeadlock => EDEADLK,
        OsError::MutexOvf => EAGAIN,
        OsError::MutexCeilingViolated => EINVAL,
        OsError::ObjDel | OsError::ObjType => EINVAL,
        OsError::ObjBusy | OsError::PendWouldBlock => EBUSY,
        OsError::ObjNoMore => EAGAIN,
        OsError::OptInvalid => EINVAL,
        OsError::PendAbort => EINTR,
        OsError::PrioInvalid => EINVAL,
        OsError::TaskInvalid | OsError::TaskNotRdy => EPERM,
        OsError::TaskNoMoreTcb => ENOMEM,
        OsError::TimeInvalid => EINVAL,
        OsError::Timeout => ETIMEDOUT,
    }
}

fn status(result: OsResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => errno_of(e),
    }
}

/// Code a blocked lock or wait returns once the task runs again
pub fn completion(result: OsResult<()>) -> i32 {
    status(result)
}

fn clock_of(clock_id: i32) -> Option<Clock> {
    match clock_id {
        CLOCK_REALTIME => Some(Clock::Realtime),
        CLOCK_MONOTONIC => Some(Clock::Monotonic),
        _ => None,
    }
}

// ============ Mutexes ============

/// `pthread_mutex_init`
///
/// # Returns
/// * `Err(EINVAL)` - Unknown type or protocol, or ceiling out of range
/// * `Err(EAGAIN)` - No mutex left
pub fn pthread_mutex_init<S: TaskModel>(kernel: &mut Kernel<S>, attr: &MutexAttr) -> Result<MutexId, i32> {
    let nesting = match attr.kind {
        PTHREAD_MUTEX_NORMAL | PTHREAD_MUTEX_ERRORCHECK | PTHREAD_MUTEX_DEFAULT => NestPolicy::Disallowed,
        PTHREAD_MUTEX_RECURSIVE => NestPolicy::Allowed,
        _ => return Err(EINVAL),
    };
    let protocol = match attr.protocol {
        PTHREAD_PRIO_NONE => Protocol::None,
        PTHREAD_PRIO_INHERIT => Protocol::Inherit,
        PTHREAD_PRIO_PROTECT => Protocol::Ceiling(core_priority(attr.prioceiling).ok_or(EINVAL)?),
        _ => return Err(ENOTSUP),
    };

    kernel.mutex_create("pthread_mutex", protocol, nesting).map_err(errno_of)
}

/// `pthread_mutex_lock`
///
/// # Returns
/// * `Err(EDEADLK)` - Caller owns a non-recursive mutex, or the wait would deadlock
/// * `Err(EINVAL)` - Caller is more urgent than the priority ceiling
pub fn pthread_mutex_lock<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> Result<LockStatus, i32> {
    kernel.mutex_lock(m, Timeout::Forever).map_err(errno_of)
}

/// `pthread_mutex_trylock`
///
/// # Returns
/// * `EBUSY` - Owned by another task
/// * `EDEADLK` - Caller owns a non-recursive mutex
pub fn pthread_mutex_trylock<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> i32 {
    status(kernel.mutex_try_lock(m))
}

/// `pthread_mutex_timedlock` with an absolute `CLOCK_REALTIME` deadline
///
/// The deadline is only examined when the mutex cannot be locked at once.
///
/// # Returns
/// * `Err(ETIMEDOUT)` - The deadline already passed
/// * `Err(EINVAL)` - Malformed deadline
pub fn pthread_mutex_timedlock<S: TaskModel>(
    kernel: &mut Kernel<S>,
    m: MutexId,
    abstime: &Timespec,
) -> Result<LockStatus, i32> {
    match kernel.mutex_try_lock(m) {
        Ok(()) => return Ok(LockStatus::Acquired),
        Err(OsError::PendWouldBlock) => {}
        Err(e) => return Err(errno_of(e)),
    }

    let timeout = kernel.timeout_until(Clock::Realtime, abstime).map_err(errno_of)?;
    kernel.mutex_lock(m, timeout).map_err(errno_of)
}

/// `pthread_mutex_unlock`
///
/// # Returns
/// * `EPERM` - Caller does not own the mutex
pub fn pthread_mutex_unlock<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> i32 {
    status(kernel.mutex_unlock(m))
}

/// `pthread_mutex_destroy`
///
/// # Returns
/// * `EBUSY` - Locked or waited on
pub fn pthread_mutex_destroy<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> i32 {
    status(kernel.mutex_delete(m, opt::DEL_NO_PEND))
}

/// `pthread_mutex_getprioceiling`
pub fn pthread_mutex_getprioceiling<S: TaskModel>(kernel: &Kernel<S>, m: MutexId) -> Result<i32, i32> {
    match kernel.mutex_ceiling(m).map_err(errno_of)? {
        Some(ceiling) => Ok(posix_priority(ceiling)),
        None => Err(EINVAL),
    }
}

/// `pthread_mutex_setprioceiling`; returns the old ceiling
///
/// # Returns
/// * `Err(EINVAL)` - Not a `PTHREAD_PRIO_PROTECT` mutex, or bad priority
/// * `Err(EPERM)` - Locked by another task
pub fn pthread_mutex_setprioceiling<S: TaskModel>(
    kernel: &mut Kernel<S>,
    m: MutexId,
    prioceiling: i32,
) -> Result<i32, i32> {
    let ceiling = core_priority(prioceiling).ok_or(EINVAL)?;
    kernel
        .mutex_set_ceiling(m, ceiling)
        .map(posix_priority)
        .map_err(errno_of)
}

// ============ Condition variables ============

/// `pthread_cond_init`
///
/// # Returns
/// * `Err(EINVAL)` - Unsupported clock
/// * `Err(EAGAIN)` - No condition variable left
pub fn pthread_cond_init<S: TaskModel>(kernel: &mut Kernel<S>, attr: &CondAttr) -> Result<CondId, i32> {
    let clock = clock_of(attr.clock).ok_or(EINVAL)?;
    kernel
        .cond_create_with_clock("pthread_cond", clock)
        .map_err(errno_of)
}

/// `pthread_cond_wait`
///
/// # Returns
/// * `Ok(LockStatus::Blocked)` - Caller is suspended; see [`completion`]
/// * `Err(EPERM)` - Caller does not own `m`
/// * `Err(EINVAL)` - Other waiters use a different mutex
pub fn pthread_cond_wait<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId, m: MutexId) -> Result<LockStatus, i32> {
    kernel.cond_wait(c, m, Timeout::Forever).map_err(errno_of)
}

/// `pthread_cond_timedwait`; `abstime` refers to the condition's clock
///
/// # Returns
/// * `Err(ETIMEDOUT)` - The deadline already passed; `m` is owned again
/// * `Err(EINVAL)` - Malformed deadline; `m` is still owned
pub fn pthread_cond_timedwait<S: TaskModel>(
    kernel: &mut Kernel<S>,
    c: CondId,
    m: MutexId,
    abstime: &Timespec,
) -> Result<LockStatus, i32> {
    kernel.cond_wait_until(c, m, abstime).map_err(errno_of)
}

/// `pthread_cond_clockwait`; `abstime` refers to `clock_id`
pub fn pthread_cond_clockwait<S: TaskModel>(
    kernel: &mut Kernel<S>,
    c: CondId,
    m: MutexId,
    clock_id: i32,
    abstime: &Timespec,
) -> Result<LockStatus, i32> {
    let clock = clock_of(clock_id).ok_or(EINVAL)?;
    let timeout = kernel.timeout_until(clock, abstime).map_err(errno_of)?;
    kernel.cond_wait(c, m, timeout).map_err(errno_of)
}

/// `pthread_cond_signal`
pub fn pthread_cond_signal<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId) -> i32 {
    status(kernel.cond_signal(c))
}

/// `pthread_cond_broadcast`
pub fn pthread_cond_broadcast<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId) -> i32 {
    status(kernel.cond_broadcast(c))
}

/// `pthread_cond_destroy`
///
/// # Returns
/// * `EBUSY` - Tasks are waiting
pub fn pthread_cond_destroy<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId) -> i32 {
    status(kernel.cond_delete(c, opt::DEL_NO_PEND))
}
