//! Priority bitmap for O(1) highest-ready lookup
//!
//! Bit 0 of word 0 stands for priority 0 (most urgent). A set bit means at
//! least one ready task sits at that level.

use crate::config::CFG_PRIO_MAX;
use crate::types::OsPrio;

const WORDS: usize = CFG_PRIO_MAX.div_ceil(32);

/// Priority bitmap table
#[derive(Debug, Clone)]
pub struct PrioTable {
    bitmap: [u32; WORDS],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable { bitmap: [0; WORDS] }
    }

    #[inline]
    fn locate(prio: OsPrio) -> (usize, u32) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);
        (prio as usize / 32, 1 << (31 - (prio as u32 % 32)))
    }

    #[inline]
    pub fn insert(&mut self, prio: OsPrio) {
        let (word, mask) = Self::locate(prio);
        self.bitmap[word] |= mask;
    }

    #[inline]
    pub fn remove(&mut self, prio: OsPrio) {
        let (word, mask) = Self::locate(prio);
        self.bitmap[word] &= !mask;
    }

    #[inline]
    pub fn is_set(&self, prio: OsPrio) -> bool {
        let (word, mask) = Self::locate(prio);
        self.bitmap[word] & mask != 0
    }

    /// Most urgent priority with a ready task, if any
    pub fn highest(&self) -> Option<OsPrio> {
        self.bitmap
            .iter()
            .enumerate()
            .find(|(_, &word)| word != 0)
            .map(|(idx, word)| (idx * 32) as OsPrio + word.leading_zeros() as OsPrio)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}
