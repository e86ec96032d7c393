//! Critical section handling
//!
//! Every multi-step engine operation (deadlock check + enqueue + boost,
//! unlock + un-boost + hand-over) runs inside one critical section so no
//! other task or interrupt observes an intermediate state. The section is
//! provided by the `critical-section` crate: PRIMASK on Cortex-M, the `std`
//! implementation on a host.

use portable_atomic::{AtomicU8, Ordering};

/// Critical section nesting depth, for diagnostics
static NESTING: AtomicU8 = AtomicU8::new(0);

/// Token proving that interrupts (or the host lock) are held.
///
/// Only [`critical_section`] hands these out.
pub struct CriticalSection<'cs> {
    _cs: critical_section::CriticalSection<'cs>,
}

impl CriticalSection<'_> {
    /// Check if we're currently in a critical section
    #[inline(always)]
    pub fn is_active() -> bool {
        NESTING.load(Ordering::Acquire) > 0
    }
}

/// Execute a closure with interrupts disabled
///
/// Sections nest; interrupts are restored when the outermost one ends.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    critical_section::with(|cs| {
        NESTING.fetch_add(1, Ordering::AcqRel);
        let r = f(&CriticalSection { _cs: cs });
        NESTING.fetch_sub(1, Ordering::AcqRel);
        r
    })
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            ::core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}
