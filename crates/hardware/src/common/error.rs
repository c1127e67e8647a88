//! Error definitions for the emulator control layer.
//!
//! This module defines the failure types surfaced by every layer of the crate. It provides:
//! 1. **Bit vectors:** Range, width, and parse failures of the bit storage primitive.
//! 2. **Configuration:** Fatal startup errors (malformed description, device memory exhaustion).
//! 3. **Protocol:** Programming errors against the hardware mode machine and event ordering.
//! 4. **Checkpoints:** I/O and format failures of the snapshot store.
//! 5. **AXI transactions:** Faults reported by the software RAM model.
//!
//! All of them convert into the crate-wide [`Error`] so callers can propagate with `?`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::controller::Mode;

/// Failures of [`BitVector`](super::BitVector) and [`BitVectorArray`](super::BitVectorArray).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitVectorError {
    /// A bit range `[offset, offset + width)` exceeds the vector's capacity.
    #[error("bit range [{offset}, {offset}+{width}) out of range for width {capacity}")]
    RangeOutOfBounds {
        /// First bit of the requested range.
        offset: usize,
        /// Number of bits in the requested range.
        width: usize,
        /// Total width of the vector.
        capacity: usize,
    },

    /// A value's width does not match the width expected by the destination.
    #[error("value width mismatch: expected {expected}, found {found}")]
    WidthMismatch {
        /// Width required by the destination.
        expected: usize,
        /// Width of the supplied value.
        found: usize,
    },

    /// An array index falls outside `[start_offset, start_offset + depth)`.
    #[error("index {index} out of range [{start}, {start}+{depth})")]
    IndexOutOfRange {
        /// Requested index.
        index: i64,
        /// First valid index.
        start: i64,
        /// Number of elements.
        depth: u64,
    },

    /// Parsed text contains a character that is not a digit of its radix.
    #[error("invalid digit {0:?}")]
    InvalidDigit(char),
}

/// Fatal errors raised while building runtime objects from the system description.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The AXI regions (plus the scan-chain window) do not fit in device memory.
    #[error("insufficient device memory: {required:#x} bytes required, {available:#x} available")]
    InsufficientDeviceMemory {
        /// Bytes required by the allocation plan.
        required: u64,
        /// Bytes provided by the memory transport.
        available: u64,
    },

    /// The scan window lies above the 32-bit reach of the `DMA_BASE` register.
    #[error("scan window at {addr:#x} is beyond the 32-bit DMA base register")]
    ScanWindowOutOfReach {
        /// Fabric address of the window.
        addr: u64,
    },

    /// A trigger index does not fit in the trigger status/enable register banks.
    #[error("trigger \"{name}\" uses index {index}, beyond the {max} available trigger bits")]
    TriggerIndexOutOfRange {
        /// Flattened trigger name.
        name: String,
        /// Declared register bit index.
        index: usize,
        /// Number of trigger bits supported by the register map.
        max: usize,
    },

    /// The scan layout references a wire or RAM that the description does not declare.
    #[error("scan chain references undeclared {kind} \"{name}\"")]
    UndeclaredScanTarget {
        /// Either `"wire"` or `"ram"`.
        kind: &'static str,
        /// Flattened name of the missing object.
        name: String,
    },

    /// A scan chain entry does not fit the wire or RAM it names.
    #[error("scan chain entry for \"{name}\" does not match its declaration: {source}")]
    ScanEntryMismatch {
        /// Flattened name of the wire or RAM.
        name: String,
        /// Underlying bit-vector failure.
        source: BitVectorError,
    },

    /// An initial value in the description is malformed.
    #[error("invalid initial value for \"{name}\": {source}")]
    InvalidInitValue {
        /// Flattened name of the object.
        name: String,
        /// Underlying bit-vector failure.
        source: BitVectorError,
    },

    /// A RAM model parameter is outside the supported range.
    #[error("invalid RAM model parameter: {0}")]
    InvalidModelParameter(String),

    /// A transport could not be opened.
    #[error("failed to open transport {path}: {source}")]
    Transport {
        /// Device or file backing the transport.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// A transport was configured with an unusable geometry.
    #[error("invalid transport configuration: {0}")]
    InvalidTransport(String),

    /// A description file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// A description file could not be parsed.
    #[error("failed to parse {what}: {source}")]
    Parse {
        /// What was being parsed (e.g. `"system description"`).
        what: &'static str,
        /// Underlying JSON failure.
        source: serde_json::Error,
    },
}

/// Violations of the hardware control protocol; these are programming errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A scan was requested while the hardware is not paused.
    #[error("scan requested in {0} mode; scans are only legal in PAUSE")]
    ScanOutsidePause(Mode),

    /// A direct RUN <-> SCAN transition was requested.
    #[error("illegal mode transition {from} -> {to}")]
    IllegalTransition {
        /// Current mode.
        from: Mode,
        /// Requested mode.
        to: Mode,
    },

    /// Both the run-mode and scan-mode bits are set in the mode-control register.
    #[error("hardware reports both RUN and SCAN mode (mode_ctrl = {0:#x})")]
    UnknownMode(u32),

    /// An event is queued for a tick the hardware has already passed.
    #[error("event at tick {event_tick} is behind current tick {current_tick}")]
    EventBehindTick {
        /// Tick of the offending event.
        event_tick: u64,
        /// Current hardware tick.
        current_tick: u64,
    },

    /// A signal write carried a value of the wrong width.
    #[error("signal \"{name}\" is {expected} bits wide, value has {found}")]
    SignalWidthMismatch {
        /// Flattened signal name.
        name: String,
        /// Declared signal width.
        expected: usize,
        /// Width of the supplied value.
        found: usize,
    },

    /// An object index does not refer to a known signal, trigger, or AXI port.
    #[error("no {kind} with index {index}")]
    UnknownObject {
        /// Object kind (`"signal"`, `"trigger"`, `"axi"`).
        kind: &'static str,
        /// Offending index.
        index: usize,
    },

    /// The hardware was not in PAUSE when the driver started.
    #[error("hardware is in {0} mode at startup; reconfigure the FPGA")]
    BadInitialMode(Mode),
}

/// Failures of the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// A file-system operation on a checkpoint item failed.
    #[error("checkpoint I/O error on {path}: {source}")]
    Io {
        /// Path of the failing item.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Checkpoint metadata or trace could not be (de)serialized.
    #[error("checkpoint metadata error on {path}: {source}")]
    Json {
        /// Path of the failing item.
        path: PathBuf,
        /// Underlying JSON failure.
        source: serde_json::Error,
    },

    /// No committed checkpoint exists at the requested tick.
    #[error("no checkpoint at tick {0}")]
    NotFound(u64),

    /// The checkpoint was written for a different scan-chain layout.
    #[error("scan layout mismatch at tick {tick}: checkpoint {found:#018x}, current {expected:#018x}")]
    LayoutMismatch {
        /// Tick of the checkpoint.
        tick: u64,
        /// Fingerprint of the running system's layout.
        expected: u64,
        /// Fingerprint recorded in the checkpoint.
        found: u64,
    },

    /// A blob is shorter than its layout requires.
    #[error("truncated {item}: expected {expected} bytes, found {found}")]
    Truncated {
        /// Item name.
        item: String,
        /// Required length in bytes.
        expected: usize,
        /// Available length in bytes.
        found: usize,
    },

    /// A payload inside a checkpoint violates bit-vector bounds.
    #[error(transparent)]
    BitVector(#[from] BitVectorError),
}

impl CheckpointError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// AXI channel names used in [`AxiError::EmptyQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxiChannel {
    /// Write response channel.
    B,
    /// Read data channel.
    R,
}

impl std::fmt::Display for AxiChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::B => write!(f, "B"),
            Self::R => write!(f, "R"),
        }
    }
}

/// Faults reported by the software AXI4 RAM model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AxiError {
    /// The burst's beat size exceeds the model's data width.
    #[error("burst size {size} bytes greater than data width {data_bytes} bytes")]
    BurstSizeTooLarge {
        /// Bytes per beat requested.
        size: u64,
        /// Bytes per data beat supported.
        data_bytes: u64,
    },

    /// A WRAP burst has a length other than 2, 4, 8, or 16.
    #[error("invalid burst length {0} for WRAP burst")]
    InvalidWrapLength(u64),

    /// The burst type is neither INCR nor WRAP.
    #[error("unsupported burst type {0}")]
    UnsupportedBurst(u8),

    /// A beat touches bytes beyond the backing store.
    #[error("address {addr:#x} out of boundary (memory size {mem_size:#x})")]
    AddressOutOfRange {
        /// Beat address.
        addr: u64,
        /// Size of the backing store in bytes.
        mem_size: u64,
    },

    /// A pop was requested on an empty response queue.
    #[error("{channel} queue for id {id} is empty")]
    EmptyQueue {
        /// Channel of the queue.
        channel: AxiChannel,
        /// Transaction ID.
        id: u16,
    },

    /// A transaction ID does not fit in the configured ID width.
    #[error("transaction id {id} exceeds id width {id_width}")]
    IdOutOfRange {
        /// Offending ID.
        id: u16,
        /// Configured ID width in bits.
        id_width: u32,
    },
}

/// Rejected accesses to a mapped transport window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The access runs past the end of the mapping.
    #[error("mapped access [{offset:#x}, +{len:#x}) out of bounds (size {size:#x})")]
    OutOfBounds {
        /// First byte of the access.
        offset: usize,
        /// Length of the access.
        len: usize,
        /// Size of the mapping.
        size: usize,
    },

    /// A register access is not 4-byte aligned.
    #[error("register offset {0:#x} is not 4-byte aligned")]
    Misaligned(usize),
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Bit-vector failure.
    #[error(transparent)]
    BitVector(#[from] BitVectorError),
    /// Fatal configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Hardware protocol violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Checkpoint store failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// AXI transaction fault.
    #[error(transparent)]
    Axi(#[from] AxiError),
    /// Raw I/O failure outside the checkpoint store (e.g. memory init files).
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path of the failing file.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
