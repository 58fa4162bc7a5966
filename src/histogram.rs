//! Process-wide histogram of printable characters.
//!
//! The acceptor loop owns the histogram and lends it to the connection
//! handler, which merges a session tally only after the connection's result
//! has been fully transmitted. It is read once, when the final report is
//! produced.

use crate::counter::{Tally, PRINTABLE_MIN};
use std::io::{self, Write};
use tracing::debug;

/// Cumulative counts of printable characters across completed connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    counts: Tally,
    connections: u64,
}

/// Summary numbers for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramStats {
    pub connections: u64,
    pub distinct_chars: usize,
    pub total_chars: u64,
}

impl Histogram {
    /// Create an all-zero histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a completed connection's tally.
    pub fn merge(&mut self, tally: &Tally) {
        self.counts += tally;
        self.connections += 1;
        debug!(
            added = tally.total(),
            connections = self.connections,
            "Merged session tally"
        );
    }

    /// Occurrences of `byte` so far. Non-printable bytes are always 0.
    pub fn get(&self, byte: u8) -> u32 {
        self.counts.get(byte)
    }

    /// Iterate over characters with a non-zero count, ascending by code.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.counts
            .counts()
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(i, &count)| (PRINTABLE_MIN + i as u8, count))
    }

    pub fn stats(&self) -> HistogramStats {
        HistogramStats {
            connections: self.connections,
            distinct_chars: self.iter().count(),
            total_chars: self.iter().map(|(_, count)| u64::from(count)).sum(),
        }
    }

    /// Write the final report: one `char '<c>' : <n> times` line per
    /// observed character, in ascending order of character code.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (byte, count) in self.iter() {
            writeln!(out, "char '{}' : {} times", byte as char, count)?;
        }
        Ok(())
    }
}
