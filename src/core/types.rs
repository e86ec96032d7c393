//! Core type definitions
//!
//! These types provide strong typing for kernel objects and priorities.

use core::fmt;

/// Task priority (0 = highest priority)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Mutex nesting counter
pub type OsNestingCtr = u32;

/// Option flags for API calls
pub type OsOpt = u16;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub u16);

        impl $name {
            #[inline]
            pub const fn get(self) -> u16 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identity of a task in the task model
    TaskId, "task"
);
define_id!(
    /// Identity of a mutex within one kernel
    MutexId, "mutex"
);
define_id!(
    /// Identity of a condition variable within one kernel
    CondId, "cond"
);

/// Task state as seen by the task model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsTaskState {
    /// Task is ready to run
    Ready = 0,
    /// Task is pending on a kernel object
    Pend = 2,
}

/// What a blocked task is pending on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitObject {
    Mutex(MutexId),
    Cond(CondId),
}

/// Immediate outcome of an operation that may suspend the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockStatus {
    /// The caller owns the mutex on return
    Acquired,
    /// The caller was suspended; its outcome is delivered through
    /// [`Kernel::wait_result`](crate::Kernel::wait_result) once resumed
    Blocked,
}

// ============ Option flags ============

/// Option flags
pub mod opt {
    use super::OsOpt;

    pub const NONE: OsOpt = 0x0000;

    // Delete options
    pub const DEL_NO_PEND: OsOpt = 0x0000;
    pub const DEL_ALWAYS: OsOpt = 0x0001;
}
