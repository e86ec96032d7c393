//! Task Control Block (TCB) definition
//!
//! The TCB holds what the reference scheduler tracks per task.

use crate::types::{OsPrio, OsTaskState, WaitObject};

/// Task Control Block
#[derive(Debug, Clone)]
pub struct OsTcb {
    /// Task name
    pub name: &'static str,

    // ============ Priority ============
    /// Current (effective) priority
    pub prio: OsPrio,
    /// Base priority
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state
    pub task_state: OsTaskState,
    /// Object this task is pending on
    pub pend_on: Option<WaitObject>,
}

impl OsTcb {
    pub const fn new(name: &'static str, prio: OsPrio) -> Self {
        OsTcb {
            name,
            prio,
            base_prio: prio,
            task_state: OsTaskState::Ready,
            pend_on: None,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.task_state == OsTaskState::Ready
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.task_state == OsTaskState::Pend
    }

    /// Whether the task runs above its base priority
    #[inline]
    pub fn is_boosted(&self) -> bool {
        self.prio != self.base_prio
    }
}
