//! Error types
//!
//! Uses Rust's Result pattern instead of C-style error pointers. Each API
//! personality translates these into its own status codes.

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ ISR errors ============
    /// Cannot create object from ISR
    CreateIsr = 12001,
    /// Cannot delete object from ISR
    DelIsr = 13001,
    /// Cannot flush from ISR
    FlushIsr = 15104,
    /// Cannot release from ISR
    PostIsr = 15105,

    // ============ Cond errors ============
    /// Condition variable already bound to a different mutex
    CondMutexMismatch = 16001,

    // ============ Mutex errors ============
    /// Caller is not the mutex owner
    MutexNotOwner = 22401,
    /// Task already owns the mutex and nesting is not allowed
    MutexOwner = 22402,
    /// Mutex nesting overflow
    MutexOvf = 22404,
    /// Acquisition would close a wait-for cycle
    MutexDeadlock = 22405,
    /// Caller is more urgent than the mutex priority ceiling
    MutexCeilingViolated = 22406,

    // ============ Object errors ============
    /// Object was deleted
    ObjDel = 24002,
    /// Id does not name a live object of this type
    ObjType = 24004,
    /// Object is locked or has waiters
    ObjBusy = 24005,
    /// No more objects of this type can be created
    ObjNoMore = 24006,

    // ============ Option errors ============
    /// Invalid option specified
    OptInvalid = 24101,

    // ============ Pend errors ============
    /// Pend was aborted (flushed)
    PendAbort = 25001,
    /// Cannot pend from ISR
    PendIsr = 25006,
    /// Pend would block (non-blocking mode)
    PendWouldBlock = 25008,

    // ============ Priority errors ============
    /// Invalid priority
    PrioInvalid = 25203,

    // ============ Task errors ============
    /// Invalid task
    TaskInvalid = 29007,
    /// No more TCBs available
    TaskNoMoreTcb = 29008,
    /// Task is not ready to run
    TaskNotRdy = 29021,

    // ============ Time errors ============
    /// Malformed time value
    TimeInvalid = 29311,

    // ============ Timeout ============
    /// Operation timed out
    Timeout = 29401,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric code, stable across releases
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether the error ends a wait without acquiring the resource
    /// because of the object's lifecycle rather than contention.
    #[inline]
    pub fn is_lifecycle(self) -> bool {
        matches!(self, OsError::ObjDel | OsError::PendAbort)
    }
}
