//! Priority-aware mutex and condition variable core for RTOS kernels
//!
//! A kernel synchronization core providing:
//! - Mutexes with plain, priority-inheritance and priority-ceiling protocols
//! - Nested (chained) priority inheritance with deadlock detection
//! - Condition variables with monotonic and realtime deadlines
//! - Classic, POSIX and C11 call surfaces over one engine

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;

#[cfg(feature = "api")]
pub mod api;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::kernel;
pub use crate::core::kernel::{Fatal, Kernel, ResourceSnapshot};
pub use crate::core::prio;
pub use crate::core::sched;
pub use crate::core::sched::Scheduler;
pub use crate::core::task;
pub use crate::core::task::TaskModel;
pub use crate::core::time;
pub use crate::core::time::{Clock, Timeout, Timespec};
pub use crate::core::types;
pub use crate::core::types::*;

pub use sync::mutex::{NestPolicy, Protocol};
