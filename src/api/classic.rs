//! Classic semaphore-as-mutex personality
//!
//! Binary semaphores with the `PRIORITY` discipline and, optionally,
//! priority inheritance or a priority ceiling. The owner may always obtain
//! its semaphore again; releases count down. A deadlock is a fatal system
//! error here: it is reported through the kernel's fatal hook.

use crate::config::CFG_PRIO_MAX;
use crate::error::{OsError, OsResult};
use crate::kernel::{Fatal, Kernel};
use crate::sync::mutex::{NestPolicy, Protocol};
use crate::task::TaskModel;
use crate::time::Timeout;
use crate::types::{opt, LockStatus, MutexId, OsPrio, OsTick};

/// Directive status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum StatusCode {
    Successful = 0,
    InvalidName = 3,
    InvalidId = 4,
    TooMany = 5,
    Timeout = 6,
    ObjectWasDeleted = 7,
    InvalidNumber = 10,
    NotDefined = 11,
    ResourceInUse = 12,
    Unsatisfied = 13,
    IncorrectState = 14,
    CalledFromIsr = 18,
    InvalidPriority = 19,
    NotOwnerOfResource = 23,
}

impl StatusCode {
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

bitflags::bitflags! {
    /// Semaphore attribute set
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u32 {
        /// Waiters are served by priority instead of FIFO
        const PRIORITY = 0x0000_0004;
        /// Binary semaphore with ownership (a mutex)
        const BINARY_SEMAPHORE = 0x0000_0010;
        const INHERIT_PRIORITY = 0x0000_0040;
        const PRIORITY_CEILING = 0x0000_0080;
    }
}

bitflags::bitflags! {
    /// Obtain options
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Options: u32 {
        /// Fail with `Unsatisfied` instead of blocking
        const NO_WAIT = 0x0000_0001;
    }
}

impl Options {
    /// Block until the semaphore is available (the default)
    pub const WAIT: Self = Self::empty();
}

/// Timeout value meaning "no timeout"
pub const NO_TIMEOUT: OsTick = 0;

/// Map a kernel error onto a directive status
pub fn status_of(err: OsError) -> StatusCode {
    match err {
        OsError::CreateIsr
        | OsError::DelIsr
        | OsError::FlushIsr
        | OsError::PostIsr
        | OsError::PendIsr => StatusCode::CalledFromIsr,
        OsError::CondMutexMismatch => StatusCode::IncorrectState,
        OsError::MutexNotOwner => StatusCode::NotOwnerOfResource,
        OsError::MutexOwner | OsError::MutexOvf => StatusCode::Unsatisfied,
        OsError::MutexDeadlock => StatusCode::IncorrectState,
        OsError::MutexCeilingViolated => StatusCode::InvalidPriority,
        OsError::ObjDel => StatusCode::ObjectWasDeleted,
        OsError::ObjType => StatusCode::InvalidId,
        OsError::ObjBusy => StatusCode::ResourceInUse,
        OsError::ObjNoMore => StatusCode::TooMany,
        OsError::OptInvalid => StatusCode::NotDefined,
        OsError::PendAbort | OsError::PendWouldBlock => StatusCode::Unsatisfied,
        OsError::PrioInvalid => StatusCode::InvalidPriority,
        OsError::TaskInvalid => StatusCode::InvalidId,
        OsError::TaskNoMoreTcb => StatusCode::TooMany,
        OsError::TaskNotRdy => StatusCode::IncorrectState,
        OsError::TimeInvalid => StatusCode::InvalidNumber,
        OsError::Timeout => StatusCode::Timeout,
    }
}

fn status(result: OsResult<()>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::Successful,
        Err(e) => status_of(e),
    }
}

/// Status a blocked obtain returns once the task runs again
pub fn completion(result: OsResult<()>) -> StatusCode {
    status(result)
}

fn protocol_of(attr: Attributes, ceiling: OsPrio) -> Result<Protocol, StatusCode> {
    if !attr.contains(Attributes::BINARY_SEMAPHORE | Attributes::PRIORITY) {
        return Err(StatusCode::NotDefined);
    }

    let inherit = attr.contains(Attributes::INHERIT_PRIORITY);
    let ceil = attr.contains(Attributes::PRIORITY_CEILING);
    match (inherit, ceil) {
        (true, true) => Err(StatusCode::NotDefined),
        (false, false) => Ok(Protocol::None),
        (true, false) => Ok(Protocol::Inherit),
        (false, true) => {
            if ceiling as usize >= CFG_PRIO_MAX {
                Err(StatusCode::InvalidPriority)
            } else {
                Ok(Protocol::Ceiling(ceiling))
            }
        }
    }
}

/// Create a binary semaphore
///
/// # Arguments
/// * `count` - 1 creates it available, 0 creates it obtained by the caller
/// * `ceiling` - Ceiling priority; only used with `PRIORITY_CEILING`
///
/// # Returns
/// * `Err(StatusCode::NotDefined)` - Unsupported attribute combination; FIFO
///   (no `PRIORITY`) semaphores are not supported
/// * `Err(StatusCode::InvalidNumber)` - `count` above 1
/// * `Err(StatusCode::InvalidPriority)` - Bad ceiling, or created obtained by
///   a caller more urgent than the ceiling
/// * `Err(StatusCode::TooMany)` - No semaphore left
pub fn semaphore_create<S: TaskModel>(
    kernel: &mut Kernel<S>,
    name: &'static str,
    count: u32,
    attr: Attributes,
    ceiling: OsPrio,
) -> Result<MutexId, StatusCode> {
    if name.is_empty() {
        return Err(StatusCode::InvalidName);
    }
    if count > 1 {
        return Err(StatusCode::InvalidNumber);
    }

    let protocol = protocol_of(attr, ceiling)?;
    let id = kernel
        .mutex_create(name, protocol, NestPolicy::Allowed)
        .map_err(status_of)?;

    if count == 0 {
        if let Err(e) = kernel.mutex_try_lock(id) {
            let deleted = kernel.mutex_delete(id, opt::DEL_ALWAYS);
            debug_assert!(deleted.is_ok());
            return Err(status_of(e));
        }
    }

    Ok(id)
}

/// Obtain a semaphore
///
/// # Arguments
/// * `options` - `Options::WAIT` or `Options::NO_WAIT`
/// * `timeout` - Ticks to wait; `NO_TIMEOUT` waits forever
///
/// # Returns
/// * `Ok(LockStatus::Blocked)` - Caller is suspended; see [`completion`]
/// * `Err(StatusCode::Unsatisfied)` - `NO_WAIT` and the semaphore is taken
/// * `Err(StatusCode::IncorrectState)` - The wait would deadlock; the fatal
///   hook has run
pub fn semaphore_obtain<S: TaskModel>(
    kernel: &mut Kernel<S>,
    id: MutexId,
    options: Options,
    timeout: OsTick,
) -> Result<LockStatus, StatusCode> {
    let result = if options.contains(Options::NO_WAIT) {
        kernel.mutex_try_lock(id).map(|()| LockStatus::Acquired)
    } else {
        kernel.mutex_lock(id, Timeout::from_ticks(timeout))
    };

    result.map_err(|e| {
        if e == OsError::MutexDeadlock {
            kernel.fatal(Fatal::ThreadQueueDeadlock);
        }
        status_of(e)
    })
}

/// Release a semaphore
pub fn semaphore_release<S: TaskModel>(kernel: &mut Kernel<S>, id: MutexId) -> StatusCode {
    status(kernel.mutex_unlock(id))
}

/// Wake every waiter with `Unsatisfied`
pub fn semaphore_flush<S: TaskModel>(kernel: &mut Kernel<S>, id: MutexId) -> StatusCode {
    status(kernel.mutex_flush(id))
}

/// Delete a semaphore, waking any waiters with `ObjectWasDeleted`
pub fn semaphore_delete<S: TaskModel>(kernel: &mut Kernel<S>, id: MutexId) -> StatusCode {
    status(kernel.mutex_delete(id, opt::DEL_ALWAYS))
}

/// Read, and optionally change, the ceiling of a priority ceiling semaphore
///
/// # Arguments
/// * `new_ceiling` - `None` only reads the current ceiling
///
/// # Returns
/// * `Ok(OsPrio)` - The previous ceiling
/// * `Err(StatusCode::NotDefined)` - Not a priority ceiling semaphore
pub fn semaphore_set_priority<S: TaskModel>(
    kernel: &mut Kernel<S>,
    id: MutexId,
    new_ceiling: Option<OsPrio>,
) -> Result<OsPrio, StatusCode> {
    match new_ceiling {
        None => kernel
            .mutex_ceiling(id)
            .map_err(status_of)?
            .ok_or(StatusCode::NotDefined),
        Some(ceiling) => kernel.mutex_set_ceiling(id, ceiling).map_err(status_of),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_values() {
        assert_eq!(StatusCode::Successful.code(), 0);
        assert_eq!(StatusCode::Timeout.code(), 6);
        assert_eq!(StatusCode::Unsatisfied.code(), 13);
        assert_eq!(StatusCode::NotOwnerOfResource.code(), 23);
    }

    #[test]
    fn test_attribute_validation() {
        let mutex = Attributes::BINARY_SEMAPHORE | Attributes::PRIORITY;
        assert_eq!(protocol_of(mutex, 0), Ok(Protocol::None));
        assert_eq!(
            protocol_of(mutex | Attributes::INHERIT_PRIORITY, 0),
            Ok(Protocol::Inherit)
        );
        assert_eq!(
            protocol_of(mutex | Attributes::PRIORITY_CEILING, 7),
            Ok(Protocol::Ceiling(7))
        );
        assert_eq!(
            protocol_of(mutex | Attributes::INHERIT_PRIORITY | Attributes::PRIORITY_CEILING, 7),
            Err(StatusCode::NotDefined)
        );
        assert_eq!(
            protocol_of(Attributes::BINARY_SEMAPHORE | Attributes::INHERIT_PRIORITY, 0),
            Err(StatusCode::NotDefined)
        );
        assert_eq!(protocol_of(Attributes::PRIORITY, 0), Err(StatusCode::NotDefined));
        assert_eq!(protocol_of(Attributes::BINARY_SEMAPHORE, 0), Err(StatusCode::NotDefined));
        assert_eq!(
            protocol_of(Attributes::BINARY_SEMAPHORE | Attributes::PRIORITY_CEILING, 7),
            Err(StatusCode::NotDefined)
        );
        assert_eq!(
            protocol_of(mutex | Attributes::PRIORITY_CEILING, CFG_PRIO_MAX as u8),
            Err(StatusCode::InvalidPriority)
        );
    }

    #[test]
    fn test_wait_is_default() {
        assert_eq!(Options::WAIT, Options::empty());
        assert!(!Options::WAIT.contains(Options::NO_WAIT));
    }
}
