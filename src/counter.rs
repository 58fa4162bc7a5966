//! Printable character counting.
//!
//! A byte is printable when its value lies in `32..=126`. A [`Tally`] holds
//! one count per printable byte plus the running total, and is the shape
//! shared by per-connection tallies and the process-wide histogram.

use std::ops::AddAssign;

/// Lowest printable byte (space).
pub const PRINTABLE_MIN: u8 = 32;

/// Highest printable byte (`~`).
pub const PRINTABLE_MAX: u8 = 126;

/// Number of distinct printable bytes.
pub const PRINTABLE_COUNT: usize = (PRINTABLE_MAX - PRINTABLE_MIN) as usize + 1;

/// Check whether a byte is printable.
#[inline]
pub fn is_printable(byte: u8) -> bool {
    (PRINTABLE_MIN..=PRINTABLE_MAX).contains(&byte)
}

/// Map a printable byte to its slot, or `None` for anything else.
#[inline]
pub(crate) fn slot(byte: u8) -> Option<usize> {
    is_printable(byte).then(|| (byte - PRINTABLE_MIN) as usize)
}

/// Per-character counts of printable bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    counts: [u32; PRINTABLE_COUNT],
    total: u32,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            counts: [0; PRINTABLE_COUNT],
            total: 0,
        }
    }
}

impl Tally {
    /// Create an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the printable bytes of a buffer.
    pub fn count(buf: &[u8]) -> Self {
        let mut tally = Self::new();
        tally.record(buf);
        tally
    }

    /// Add the printable bytes of `buf` to this tally.
    ///
    /// Counts wrap at `u32::MAX`, the width of the count on the wire.
    pub fn record(&mut self, buf: &[u8]) {
        for &byte in buf {
            if let Some(i) = slot(byte) {
                self.counts[i] = self.counts[i].wrapping_add(1);
                self.total = self.total.wrapping_add(1);
            }
        }
    }

    /// Total number of printable bytes seen.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Count for a single byte value. Non-printable bytes are always 0.
    pub fn get(&self, byte: u8) -> u32 {
        slot(byte).map_or(0, |i| self.counts[i])
    }

    /// Raw counts, indexed by `byte - 32`.
    pub fn counts(&self) -> &[u32; PRINTABLE_COUNT] {
        &self.counts
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl AddAssign<&Tally> for Tally {
    fn add_assign(&mut self, other: &Tally) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            *mine = mine.wrapping_add(*theirs);
        }
        self.total = self.total.wrapping_add(other.total);
    }
}
