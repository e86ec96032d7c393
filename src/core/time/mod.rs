//! Time management module
//!
//! Provides the pend-timeout tick wheel, relative timeouts, and conversion
//! of absolute deadlines on the realtime and monotonic clocks into ticks.

use alloc::vec::Vec;

use crate::config::{CFG_TICK_RATE_HZ, CFG_TICK_WHEEL_SIZE};
use crate::error::{OsError, OsResult};
use crate::types::{OsTick, TaskId};

const NSEC_PER_SEC: i64 = 1_000_000_000;

/// How long a blocking call may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Wait until satisfied, flushed or deleted
    Forever,
    /// Wait at most this many ticks (never zero)
    Ticks(OsTick),
    /// The deadline already passed: do not block at all
    Expired,
}

impl Timeout {
    /// Tick count with the kernel convention `0 = wait forever`
    #[inline]
    pub const fn from_ticks(ticks: OsTick) -> Self {
        if ticks == 0 {
            Timeout::Forever
        } else {
            Timeout::Ticks(ticks)
        }
    }
}

/// Clock a deadline is expressed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Clock {
    /// Wall-clock time; may be set
    #[default]
    Realtime,
    /// Ticks since the kernel started; never set
    Monotonic,
}

/// Seconds and nanoseconds, `struct timespec` style
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Timespec { sec, nsec }
    }

    /// Whether `nsec` is within `0..1_000_000_000`
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.nsec >= 0 && self.nsec < NSEC_PER_SEC
    }

    #[inline]
    pub(crate) fn as_nanos(&self) -> i128 {
        self.sec as i128 * NSEC_PER_SEC as i128 + self.nsec as i128
    }

    pub(crate) fn from_nanos(ns: i128) -> Self {
        let sec = ns.div_euclid(NSEC_PER_SEC as i128);
        let nsec = ns.rem_euclid(NSEC_PER_SEC as i128);
        Timespec {
            sec: sec.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
            nsec: nsec as i64,
        }
    }
}

/// Nanoseconds elapsed after `ticks` ticks
#[inline]
pub(crate) fn ticks_to_nanos(ticks: u64) -> i128 {
    ticks as i128 * NSEC_PER_SEC as i128 / CFG_TICK_RATE_HZ as i128
}

/// Relative timeout from `now` until the absolute `deadline`, rounded up to
/// whole ticks
///
/// # Returns
/// * `Err(OsError::TimeInvalid)` - `deadline` has nanoseconds out of range
pub fn timeout_between(now: &Timespec, deadline: &Timespec) -> OsResult<Timeout> {
    if !deadline.is_valid() {
        return Err(OsError::TimeInvalid);
    }

    let remaining = deadline.as_nanos() - now.as_nanos();
    if remaining <= 0 {
        return Ok(Timeout::Expired);
    }

    let per_tick = NSEC_PER_SEC as i128 / CFG_TICK_RATE_HZ as i128;
    let ticks = (remaining + per_tick - 1) / per_tick;
    Ok(Timeout::Ticks(ticks.min(OsTick::MAX as i128) as OsTick))
}

/// Timing wheel of armed pend timeouts
///
/// A timeout of `n` ticks lands in slot `(now + n) % SIZE`. Each tick
/// visits one slot; entries with more than a full turn left are
/// decremented by `SIZE`, the rest expire.
#[derive(Debug)]
pub struct TickWheel {
    slots: [Vec<(TaskId, OsTick)>; CFG_TICK_WHEEL_SIZE],
}

impl TickWheel {
    pub fn new() -> Self {
        TickWheel {
            slots: core::array::from_fn(|_| Vec::new()),
        }
    }

    #[inline(always)]
    fn slot(tick: OsTick) -> usize {
        (tick as usize) % CFG_TICK_WHEEL_SIZE
    }

    /// Arm a timeout of `ticks` (non-zero) starting at tick `now`
    pub fn insert(&mut self, task: TaskId, now: OsTick, ticks: OsTick) {
        debug_assert!(ticks > 0);
        debug_assert!(!self.contains(task));
        let slot = Self::slot(now.wrapping_add(ticks));
        self.slots[slot].push((task, ticks));
    }

    /// Disarm; returns whether the task had a timeout armed
    pub fn remove(&mut self, task: TaskId) -> bool {
        for slot in self.slots.iter_mut() {
            if let Some(idx) = slot.iter().position(|&(t, _)| t == task) {
                slot.swap_remove(idx);
                return true;
            }
        }
        false
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.iter().any(|&(t, _)| t == task))
    }

    /// Number of armed timeouts
    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }

    /// Process the slot of tick `now`; returns the expired tasks in
    /// arming order
    pub fn advance(&mut self, now: OsTick) -> Vec<TaskId> {
        let slot = &mut self.slots[Self::slot(now)];
        let mut expired = Vec::new();

        slot.retain_mut(|(task, remain)| {
            if *remain <= CFG_TICK_WHEEL_SIZE as OsTick {
                expired.push(*task);
                false
            } else {
                *remain -= CFG_TICK_WHEEL_SIZE as OsTick;
                true
            }
        });

        expired
    }
}

impl Default for TickWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_until_expired(wheel: &mut TickWheel, start: OsTick, limit: OsTick) -> Option<OsTick> {
        (start + 1..=start + limit).find(|&now| !wheel.advance(now).is_empty())
    }

    #[test]
    fn test_short_timeout_expires_on_time() {
        let mut wheel = TickWheel::new();
        wheel.insert(TaskId(1), 100, 5);
        assert_eq!(run_until_expired(&mut wheel, 100, 64), Some(105));
        assert!(wheel.is_empty());
    }

    #[test]
    fn test_timeout_longer_than_one_turn() {
        for ticks in [16, 17, 20, 32, 33, 50] {
            let mut wheel = TickWheel::new();
            wheel.insert(TaskId(1), 7, ticks);
            assert_eq!(run_until_expired(&mut wheel, 7, 200), Some(7 + ticks), "ticks {ticks}");
        }
    }

    #[test]
    fn test_remove_disarms() {
        let mut wheel = TickWheel::new();
        wheel.insert(TaskId(1), 0, 3);
        wheel.insert(TaskId(2), 0, 3);
        assert_eq!(wheel.len(), 2);

        assert!(wheel.remove(TaskId(1)));
        assert!(!wheel.remove(TaskId(1)));
        assert_eq!(wheel.advance(3), [TaskId(2)]);
    }

    #[test]
    fn test_deadline_rounds_up() {
        let now = Timespec::new(10, 0);
        assert_eq!(
            timeout_between(&now, &Timespec::new(10, 1)),
            Ok(Timeout::Ticks(1))
        );
        assert_eq!(
            timeout_between(&now, &Timespec::new(11, 500_000)),
            Ok(Timeout::Ticks(1001))
        );
        assert_eq!(
            timeout_between(&now, &Timespec::new(9, 999_999_999)),
            Ok(Timeout::Expired)
        );
        assert_eq!(timeout_between(&now, &now), Ok(Timeout::Expired));
    }

    #[test]
    fn test_deadline_rejects_bad_nanoseconds() {
        let now = Timespec::default();
        assert_eq!(
            timeout_between(&now, &Timespec::new(1, NSEC_PER_SEC)),
            Err(OsError::TimeInvalid)
        );
        assert_eq!(
            timeout_between(&now, &Timespec::new(1, -1)),
            Err(OsError::TimeInvalid)
        );
    }

    #[test]
    fn test_timespec_nanos() {
        let t = Timespec::from_nanos(-1);
        assert_eq!(t, Timespec::new(-1, 999_999_999));
        assert_eq!(t.as_nanos(), -1);
        assert_eq!(ticks_to_nanos(1500), 1_500_000_000);
    }
}
