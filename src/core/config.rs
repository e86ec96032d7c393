//! Compile-time configuration
//!
//! These constants control the behavior and resource limits of the core.

/// Maximum number of priority levels
pub const CFG_PRIO_MAX: usize = 64;

/// Idle task priority
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Number of entries in tick wheel
pub const CFG_TICK_WHEEL_SIZE: usize = 16;

/// Maximum number of tasks known to the reference scheduler
pub const CFG_TASK_MAX: usize = 32;

/// Maximum number of live mutexes per kernel
pub const CFG_MUTEX_MAX: usize = 64;

/// Maximum number of live condition variables per kernel
pub const CFG_COND_MAX: usize = 32;

/// Deepest recursive acquisition of a nesting mutex
pub const CFG_MUTEX_NESTING_MAX: u32 = u16::MAX as u32;
