//! FPGA emulator control and state-management library.
//!
//! This crate drives a hardware design running on an emulation fabric. It provides:
//! 1. **Bit vectors:** Arbitrary-width bit storage for every piece of hardware state.
//! 2. **Controller:** The PAUSE/RUN/SCAN mode machine, tick counter, signals, triggers, and AXI
//!    memory allocation over an injected register and memory transport.
//! 3. **Checkpoints:** Tick-indexed snapshots of the scan chain, AXI memory, RAM models, and the
//!    input signal trace, published atomically.
//! 4. **Models:** A software AXI4 RAM model whose in-flight transactions survive save/restore.
//! 5. **Driver:** The tick-ordered event loop that records and replays sessions.

/// Checkpoint store, scan-chain codec, and signal trace.
pub mod checkpoint;
/// Bit vectors and error types.
pub mod common;
/// System description, platform transports, and driver options.
pub mod config;
/// Hardware abstraction (mode machine, registers, AXI allocation).
pub mod controller;
/// Software models attached to the design.
pub mod model;
/// Event scheduling and the session driver.
pub mod sim;
/// Driver statistics collection and reporting.
pub mod stats;
/// Register and device-memory transports.
pub mod uma;

/// Arbitrary-width bit vector; see [`common::bitvector`].
pub use crate::common::bitvector::{BitVector, BitVectorArray};
/// Crate-wide error and result types.
pub use crate::common::error::{Error, Result};
/// Parsed system description; load with `SysInfo::load`.
pub use crate::config::SysInfo;
/// Hardware controller; construct with `Controller::new`.
pub use crate::controller::Controller;
/// Session driver; construct with `Driver::new` and call `run`.
pub use crate::sim::Driver;
