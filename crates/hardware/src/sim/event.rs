//! Scheduled driver events.

use std::cmp::Ordering;

use crate::common::bitvector::BitVector;

/// What an event does when its tick is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write an input signal.
    SetSignal {
        /// Signal index.
        index: usize,
        /// Value to apply.
        value: BitVector,
    },
    /// Stop the run loop.
    Stop {
        /// Why the stop was requested; logged when it fires.
        reason: String,
    },
    /// Save a checkpoint and re-arm `period` ticks later.
    PeriodicCheckpoint {
        /// Ticks between checkpoints.
        period: u64,
    },
}

/// An action bound to the tick at which it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Hardware tick at which the event fires.
    pub tick: u64,
    /// Insertion sequence; orders same-tick events first-in first-out.
    pub seq: u64,
    /// Action to execute.
    pub action: Action,
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.tick, self.seq).cmp(&(other.tick, other.seq))
    }
}
