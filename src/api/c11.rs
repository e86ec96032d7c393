//! C11 `<threads.h>` personality
//!
//! Every C11 mutex uses priority inheritance. Deadlines are absolute
//! `TIME_UTC` (realtime) times.

use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::sync::mutex::{NestPolicy, Protocol};
use crate::task::TaskModel;
use crate::time::{Clock, Timeout, Timespec};
use crate::types::{opt, CondId, LockStatus, MutexId};

/// `thrd_*` status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum ThrdStatus {
    Busy = 1,
    Error = 2,
    Nomem = 3,
    Success = 4,
    Timedout = 5,
}

pub const MTX_PLAIN: i32 = 0x1;
pub const MTX_RECURSIVE: i32 = 0x2;
pub const MTX_TIMED: i32 = 0x4;

/// Map a kernel error onto a C11 status
pub fn status_of(err: OsError) -> ThrdStatus {
    match err {
        OsError::Timeout => ThrdStatus::Timedout,
        OsError::PendWouldBlock | OsError::ObjBusy => ThrdStatus::Busy,
        OsError::ObjNoMore | OsError::TaskNoMoreTcb => ThrdStatus::Nomem,
        OsError::CreateIsr
        | OsError::DelIsr
        | OsError::FlushIsr
        | OsError::PostIsr
        | OsError::PendIsr
        | OsError::CondMutexMismatch
        | OsError::MutexNotOwner
        | OsError::MutexOwner
        | OsError::MutexOvf
        | OsError::MutexDeadlock
        | OsError::MutexCeilingViolated
        | OsError::ObjDel
        | OsError::ObjType
        | OsError::OptInvalid
        | OsError::PendAbort
        | OsError::PrioInvalid
        | OsError::TaskInvalid
        | OsError::TaskNotRdy
        | OsError::TimeInvalid => ThrdStatus::Error,
    }
}

fn status(result: OsResult<()>) -> ThrdStatus {
    match result {
        Ok(()) => ThrdStatus::Success,
        Err(e) => status_of(e),
    }
}

/// Status a blocked lock or wait returns once the task runs again
pub fn completion(result: OsResult<()>) -> ThrdStatus {
    status(result)
}

// ============ Mutexes ============

/// `mtx_init`
///
/// # Arguments
/// * `kind` - `MTX_PLAIN` or `MTX_TIMED`, optionally `| MTX_RECURSIVE`
pub fn mtx_init<S: TaskModel>(kernel: &mut Kernel<S>, kind: i32) -> Result<MutexId, ThrdStatus> {
    let nesting = match kind {
        MTX_PLAIN | MTX_TIMED => NestPolicy::Disallowed,
        k if k == MTX_PLAIN | MTX_RECURSIVE || k == MTX_TIMED | MTX_RECURSIVE => NestPolicy::Allowed,
        _ => return Err(ThrdStatus::Error),
    };

    kernel
        .mutex_create("mtx", Protocol::Inherit, nesting)
        .map_err(status_of)
}

/// `mtx_lock`
///
/// # Returns
/// * `Err(ThrdStatus::Error)` - Caller owns a non-recursive mutex, or the
///   wait would deadlock
pub fn mtx_lock<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> Result<LockStatus, ThrdStatus> {
    kernel.mutex_lock(m, Timeout::Forever).map_err(status_of)
}

/// `mtx_trylock`
///
/// # Returns
/// * `ThrdStatus::Busy` - Owned by another task, or by the caller and not
///   recursive
pub fn mtx_trylock<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> ThrdStatus {
    match kernel.mutex_try_lock(m) {
        Err(OsError::MutexOwner) => ThrdStatus::Busy,
        result => status(result),
    }
}

/// `mtx_timedlock` with an absolute `TIME_UTC` deadline
pub fn mtx_timedlock<S: TaskModel>(
    kernel: &mut Kernel<S>,
    m: MutexId,
    ts: &Timespec,
) -> Result<LockStatus, ThrdStatus> {
    match kernel.mutex_try_lock(m) {
        Ok(()) => return Ok(LockStatus::Acquired),
        Err(OsError::PendWouldBlock) => {}
        Err(e) => return Err(status_of(e)),
    }

    let timeout = kernel.timeout_until(Clock::Realtime, ts).map_err(status_of)?;
    kernel.mutex_lock(m, timeout).map_err(status_of)
}

/// `mtx_unlock`
pub fn mtx_unlock<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> ThrdStatus {
    status(kernel.mutex_unlock(m))
}

/// `mtx_destroy`
///
/// # Returns
/// * `ThrdStatus::Busy` - Locked or waited on; the mutex stays valid
pub fn mtx_destroy<S: TaskModel>(kernel: &mut Kernel<S>, m: MutexId) -> ThrdStatus {
    status(kernel.mutex_delete(m, opt::DEL_NO_PEND))
}

// ============ Condition variables ============

/// `cnd_init`
pub fn cnd_init<S: TaskModel>(kernel: &mut Kernel<S>) -> Result<CondId, ThrdStatus> {
    kernel
        .cond_create_with_clock("cnd", Clock::Realtime)
        .map_err(status_of)
}

/// `cnd_signal`
pub fn cnd_signal<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId) -> ThrdStatus {
    status(kernel.cond_signal(c))
}

/// `cnd_broadcast`
pub fn cnd_broadcast<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId) -> ThrdStatus {
    status(kernel.cond_broadcast(c))
}

/// `cnd_wait`
pub fn cnd_wait<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId, m: MutexId) -> Result<LockStatus, ThrdStatus> {
    kernel.cond_wait(c, m, Timeout::Forever).map_err(status_of)
}

/// `cnd_timedwait` with an absolute `TIME_UTC` deadline
pub fn cnd_timedwait<S: TaskModel>(
    kernel: &mut Kernel<S>,
    c: CondId,
    m: MutexId,
    ts: &Timespec,
) -> Result<LockStatus, ThrdStatus> {
    kernel.cond_wait_until(c, m, ts).map_err(status_of)
}

/// `cnd_destroy`
pub fn cnd_destroy<S: TaskModel>(kernel: &mut Kernel<S>, c: CondId) -> ThrdStatus {
    status(kernel.cond_delete(c, opt::DEL_NO_PEND))
}
