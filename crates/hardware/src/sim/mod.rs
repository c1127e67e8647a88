//! Session control above the hardware abstraction.
//!
//! This module sequences the emulation session. It provides:
//! 1. **Events:** Signal writes, stops, and periodic checkpoints bound to a tick.
//! 2. **Scheduler:** A min-tick-first queue that detects events left behind the hardware tick.
//! 3. **Driver:** The PAUSE-time loop tying controller, checkpoints, trace, and models together.

/// Session driver and run loop.
pub mod driver;
/// Event and action types.
pub mod event;
/// Tick-ordered event queue.
pub mod scheduler;

pub use driver::{Driver, StopReason, TriggerCallback};
pub use event::{Action, Event};
pub use scheduler::EventScheduler;
