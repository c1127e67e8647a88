//! Common types shared by every layer of the emulator control stack.
//!
//! This module provides the following:
//! 1. **Bit vectors:** Arbitrary-width hardware values and fixed-width element arrays.
//! 2. **Errors:** Typed failures for each concern and the crate-wide `Error`/`Result`.

/// Arbitrary-width bit vectors and element arrays.
pub mod bitvector;

/// Error types for configuration, protocol, checkpoint, and AXI failures.
pub mod error;

pub use bitvector::{BitVector, BitVectorArray};
pub use error::{
    AxiChannel, AxiError, BitVectorError, CheckpointError, ConfigError, Error, ProtocolError,
    Result,
};
