//! Configuration for the emulator control layer.
//!
//! This module defines the structures consumed at startup. It provides:
//! 1. **Defaults:** Baseline constants (poll interval, device path, sync flag).
//! 2. **System description:** `SysInfo`, the already-parsed design description enumerating
//!    wires, RAMs, clocks, signals, triggers, AXI ports, models, and the scan-chain layout.
//! 3. **Platform:** `PlatInfo`, selecting the register and memory transports.
//! 4. **Driver options:** Checkpoint location and cadence, stop tick, run mode, and
//!    initial stimulus.
//!
//! All structures deserialize from JSON; `SysInfo` and `PlatInfo` accept both a bare object and
//! the `{"sysinfo": ...}` / `{"platinfo": ...}` envelopes written by the design toolchain.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::common::error::ConfigError;

/// Default configuration constants.
mod defaults {
    use std::path::PathBuf;

    /// Busy-wait poll interval in milliseconds.
    ///
    /// Every hardware wait (pause-busy, model-busy, scan-running) sleeps this long between
    /// register reads.
    pub const POLL_INTERVAL_MS: u64 = 10;

    /// Physical memory device used by the `devmem` transport.
    pub fn devmem_path() -> PathBuf {
        PathBuf::from("/dev/mem")
    }

    pub const fn poll_interval_ms() -> u64 {
        POLL_INTERVAL_MS
    }

    pub const fn sync() -> bool {
        true
    }
}

/// Joins a hierarchical name with `.` separators.
pub fn flatten_name(name: &[String]) -> String {
    name.join(".")
}

/// A flip-flop backed wire of the emulated design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireInfo {
    /// Hierarchical name.
    pub name: Vec<String>,
    /// Width in bits.
    pub width: usize,
    /// Index of the least significant bit in the source design.
    #[serde(default)]
    pub start_offset: i64,
    /// Whether the source declared the range ascending (`[lo:hi]`).
    #[serde(default)]
    pub upto: bool,
    /// Initial value text (`0x`, `0b`, or decimal); absent means zero.
    #[serde(default)]
    pub init_data: Option<String>,
}

/// A RAM of the emulated design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamInfo {
    /// Hierarchical name.
    pub name: Vec<String>,
    /// Element width in bits.
    pub width: usize,
    /// Number of elements.
    pub depth: u64,
    /// First valid address.
    #[serde(default)]
    pub start_offset: i64,
    /// Flattened initial contents; absent means zero.
    #[serde(default)]
    pub init_data: Option<String>,
    /// Whether the RAM's contents come from the AXI memory model instead of the scan chain.
    #[serde(default)]
    pub dissolved: bool,
}

/// A clock domain of the emulated design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockInfo {
    /// Hierarchical name.
    pub name: Vec<String>,
    /// Clock index in the fabric's clock controller.
    pub index: usize,
}

/// A register-mapped signal between the host and the design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    /// Hierarchical name.
    pub name: Vec<String>,
    /// Width in bits.
    pub width: usize,
    /// Whether the signal is driven by the design (read-only from the host).
    #[serde(default)]
    pub output: bool,
    /// Byte offset of the first 32-bit register.
    pub reg_offset: u32,
}

/// A design-level trigger reported in the trigger banks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// Hierarchical name.
    pub name: Vec<String>,
    /// Bit index across the trigger status/enable banks.
    pub index: usize,
}

/// An AXI-addressable memory region backed by device memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxiInfo {
    /// Hierarchical name.
    pub name: Vec<String>,
    /// Requested size in bytes.
    pub size: u64,
    /// Byte offset of the base/mask remap registers.
    pub reg_offset: u32,
}

/// A software model attached to the design.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Hierarchical name.
    pub name: Vec<String>,
    /// Model type (e.g. `"rammodel"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// String-valued parameters.
    #[serde(default)]
    pub str_params: std::collections::BTreeMap<String, String>,
    /// Integer-valued parameters.
    #[serde(default)]
    pub int_params: std::collections::BTreeMap<String, i64>,
}

impl ModelInfo {
    /// Returns an integer parameter, if present.
    pub fn int_param(&self, key: &str) -> Option<i64> {
        self.int_params.get(key).copied()
    }
}

/// One flip-flop chunk of the scan chain, in physical scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFfInfo {
    /// Wire the chunk belongs to; empty for flip-flops without a source-level name.
    #[serde(default)]
    pub name: Vec<String>,
    /// Chunk width in bits.
    pub width: usize,
    /// Bit offset of the chunk within its wire.
    #[serde(default)]
    pub offset: usize,
}

/// One RAM of the scan chain, in physical scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRamInfo {
    /// RAM name.
    pub name: Vec<String>,
    /// Element width in bits.
    pub width: usize,
    /// Number of elements.
    pub depth: u64,
}

/// The static system description.
///
/// Produced offline by the design toolchain and treated as immutable input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SysInfo {
    /// Wires whose state lives in scan flip-flops.
    pub wire: Vec<WireInfo>,
    /// RAMs of the design.
    pub ram: Vec<RamInfo>,
    /// Clock domains.
    pub clock: Vec<ClockInfo>,
    /// Host-visible signals.
    pub signal: Vec<SignalInfo>,
    /// Triggers.
    pub trigger: Vec<TriggerInfo>,
    /// AXI memory regions.
    pub axi: Vec<AxiInfo>,
    /// Attached software models.
    pub model: Vec<ModelInfo>,
    /// Flip-flop section of the scan chain.
    pub scan_ff: Vec<ScanFfInfo>,
    /// RAM section of the scan chain.
    pub scan_ram: Vec<ScanRamInfo>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Enveloped<T> {
    Sys { sysinfo: T },
    Plat { platinfo: T },
    Bare(T),
}

impl<T> Enveloped<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Sys { sysinfo: t } | Self::Plat { platinfo: t } | Self::Bare(t) => t,
        }
    }
}

fn parse_json<T: DeserializeOwned>(text: &str, what: &'static str) -> Result<T, ConfigError> {
    serde_json::from_str::<Enveloped<T>>(text)
        .map(Enveloped::into_inner)
        .map_err(|source| ConfigError::Parse { what, source })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

impl SysInfo {
    /// Parses a system description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        parse_json(text, "system description")
    }

    /// Reads and parses a system description file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&read_file(path.as_ref())?)
    }

    /// Looks up a wire by flattened name.
    pub fn find_wire(&self, name: &str) -> Option<&WireInfo> {
        self.wire.iter().find(|w| flatten_name(&w.name) == name)
    }

    /// Looks up a RAM by flattened name.
    pub fn find_ram(&self, name: &str) -> Option<&RamInfo> {
        self.ram.iter().find(|r| flatten_name(&r.name) == name)
    }
}

/// Register or memory transport selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Physical memory mapped through `/dev/mem`.
    Devmem {
        /// Physical base address; must be page-aligned.
        base: u64,
        /// Window size in bytes.
        size: u64,
        /// Address the fabric uses for DMA into this window; defaults to `base`.
        #[serde(default)]
        dma_base: Option<u64>,
        /// Device file to map.
        #[serde(default = "defaults::devmem_path")]
        device: PathBuf,
        /// Open with `O_SYNC` for uncached access.
        #[serde(default = "defaults::sync")]
        sync: bool,
    },
    /// A shared-memory file exchanged with a co-simulation peer.
    Shm {
        /// Backing file (typically under `/dev/shm`).
        path: PathBuf,
        /// Window size in bytes.
        size: u64,
        /// Byte offset of the window inside the file.
        #[serde(default)]
        offset: u64,
        /// Address the peer uses for DMA into this window.
        #[serde(default)]
        dma_base: u64,
    },
}

impl TransportConfig {
    /// Window size in bytes.
    pub const fn size(&self) -> u64 {
        match self {
            Self::Devmem { size, .. } | Self::Shm { size, .. } => *size,
        }
    }
}

/// Platform description: where registers and device memory live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatInfo {
    /// Device memory transport.
    pub mem: TransportConfig,
    /// Control register transport.
    pub reg: TransportConfig,
}

impl PlatInfo {
    /// Parses a platform description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        parse_json(text, "platform description")
    }

    /// Reads and parses a platform description file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&read_file(path.as_ref())?)
    }
}

/// How the driver treats the checkpoint store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "tick", rename_all = "lowercase")]
pub enum RunMode {
    /// Fresh run from tick 0; the store is cleared first.
    #[default]
    Record,
    /// Continue recording from the nearest checkpoint at or before the tick; later
    /// checkpoints are discarded.
    RecordFrom(u64),
    /// Re-execute from the nearest checkpoint at or before the tick without saving.
    Replay(u64),
}

/// A scheduled write of an input signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInit {
    /// Flattened signal name.
    pub name: String,
    /// Value text (`0x`, `0b`, or decimal).
    pub value: String,
    /// Tick at which the value is applied.
    #[serde(default)]
    pub tick: u64,
}

/// A file loaded into an AXI region before the first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxiMemInit {
    /// Flattened AXI region name.
    pub name: String,
    /// Raw binary file.
    pub path: PathBuf,
}

/// Options controlling a driver session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Checkpoint store root directory.
    pub checkpoint_dir: PathBuf,
    /// Ticks between periodic checkpoints in record mode; `None` disables them.
    #[serde(default)]
    pub checkpoint_period: Option<u64>,
    /// Stop when the hardware reaches this tick.
    #[serde(default)]
    pub stop_tick: Option<u64>,
    /// Record or replay.
    #[serde(default)]
    pub mode: RunMode,
    /// Save a checkpoint when execution stops (always done in record mode).
    #[serde(default)]
    pub save_on_stop: bool,
    /// Input signal writes applied as scheduled events.
    #[serde(default)]
    pub set_signal: Vec<SignalInit>,
    /// AXI memory images applied on a fresh record run.
    #[serde(default)]
    pub init_axi_mem: Vec<AxiMemInit>,
    /// Busy-wait poll interval in milliseconds.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl DriverOptions {
    /// Options for a fresh record run into `checkpoint_dir`.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            checkpoint_period: None,
            stop_tick: None,
            mode: RunMode::Record,
            save_on_stop: false,
            set_signal: Vec::new(),
            init_axi_mem: Vec::new(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }

    /// Busy-wait poll interval.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
