//! Input signal trace for record and replay.
//!
//! Every input-signal write executed while recording is kept as `(signal, tick, value)`. The
//! trace is persisted with each checkpoint so that replaying from any earlier checkpoint can
//! restore the inputs in effect at that tick and re-schedule the later ones.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::common::bitvector::BitVector;

/// One recorded signal write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Tick at which the value was applied.
    pub tick: u64,
    /// Signal index.
    pub index: usize,
    /// Applied value.
    pub data: BitVector,
}

#[derive(Serialize, Deserialize)]
struct TraceFile {
    signal_trace: Vec<TraceEntry>,
}

/// Per-signal history of applied values, ordered by tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalTrace {
    signals: BTreeMap<usize, BTreeMap<u64, BitVector>>,
}

impl SignalTrace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for signal `index` at `tick`, replacing any earlier record at that tick.
    pub fn record(&mut self, index: usize, tick: u64, value: BitVector) {
        let _ = self.signals.entry(index).or_default().insert(tick, value);
    }

    /// Most recent value of signal `index` applied at or before `tick`.
    pub fn value_at(&self, index: usize, tick: u64) -> Option<(u64, &BitVector)> {
        self.signals
            .get(&index)?
            .range(..=tick)
            .next_back()
            .map(|(t, v)| (*t, v))
    }

    /// Values of signal `index` applied strictly after `tick`, in tick order.
    pub fn after(&self, index: usize, tick: u64) -> impl Iterator<Item = (u64, &BitVector)> {
        self.signals
            .get(&index)
            .into_iter()
            .flat_map(move |m| m.range((Bound::Excluded(tick), Bound::Unbounded)))
            .map(|(t, v)| (*t, v))
    }

    /// Signal indices with at least one record.
    pub fn signals(&self) -> impl Iterator<Item = usize> + '_ {
        self.signals.keys().copied()
    }

    /// Discards every record after `tick`.
    pub fn truncate(&mut self, tick: u64) {
        let Some(cut) = tick.checked_add(1) else {
            return;
        };
        for history in self.signals.values_mut() {
            let _ = history.split_off(&cut);
        }
        self.signals.retain(|_, h| !h.is_empty());
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.signals.values().map(BTreeMap::len).sum()
    }

    /// Whether the trace holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the trace into entries ordered by tick, then signal.
    pub fn entries(&self) -> Vec<TraceEntry> {
        let mut out: Vec<TraceEntry> = self
            .signals
            .iter()
            .flat_map(|(&index, h)| {
                h.iter().map(move |(&tick, data)| TraceEntry {
                    tick,
                    index,
                    data: data.clone(),
                })
            })
            .collect();
        out.sort_by_key(|e| (e.tick, e.index));
        out
    }

    /// JSON form written into checkpoints.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&TraceFile {
            signal_trace: self.entries(),
        })
    }

    /// Parses the JSON form written by [`SignalTrace::to_json`].
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let file: TraceFile = serde_json::from_str(text)?;
        let mut trace = Self::new();
        for e in file.signal_trace {
            trace.record(e.index, e.tick, e.data);
        }
        Ok(trace)
    }
}
