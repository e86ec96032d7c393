//! API personalities
//!
//! Each personality is a thin translation layer over the [`Kernel`]
//! engine: it validates its own arguments, picks the protocol and nesting
//! policy its objects use, and maps [`OsError`] onto its own status codes
//! with one exhaustive `match`.
//!
//! A call that suspends the caller returns `Ok(LockStatus::Blocked)`. Once
//! the task runs again, the personality's `completion` function turns
//! [`Kernel::wait_result`] into the code the blocking call returns.
//!
//! [`Kernel`]: crate::Kernel
//! [`Kernel::wait_result`]: crate::Kernel::wait_result
//! [`OsError`]: crate::OsError

pub mod c11;
pub mod classic;
pub mod posix;
