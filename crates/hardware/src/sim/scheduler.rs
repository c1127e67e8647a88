//! Tick-ordered event queue.
//!
//! Events are popped strictly in `(tick, insertion order)` order. The queue never lets the
//! hardware run past an event: the driver always steps to the next event tick, so finding an
//! event behind the current tick means the hardware tick was moved underneath the queue.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::event::{Action, Event};
use crate::common::error::ProtocolError;

/// Min-tick-first queue of pending events.
#[derive(Debug, Default)]
pub struct EventScheduler {
    queue: BinaryHeap<Reverse<Event>>,
    seq: u64,
}

impl EventScheduler {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `action` to fire at `tick`.
    pub fn schedule(&mut self, tick: u64, action: Action) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Reverse(Event { tick, seq, action }));
    }

    /// Tick of the earliest pending event.
    pub fn next_tick(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(e)| e.tick)
    }

    /// Pops the earliest event if it is due at `current`.
    ///
    /// Returns `Ok(None)` when the earliest event lies in the future or the queue is empty.
    pub fn pop_due(&mut self, current: u64) -> Result<Option<Event>, ProtocolError> {
        match self.next_tick() {
            Some(tick) if tick < current => Err(ProtocolError::EventBehindTick {
                event_tick: tick,
                current_tick: current,
            }),
            Some(tick) if tick == current => Ok(self.queue.pop().map(|Reverse(e)| e)),
            _ => Ok(None),
        }
    }

    /// Drops every pending event.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
