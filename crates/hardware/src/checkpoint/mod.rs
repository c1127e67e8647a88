//! Tick-indexed checkpoint store.
//!
//! This module persists complete circuit and memory state and retrieves it by tick. It provides:
//! 1. **Store:** Listing, exact and nearest-preceding lookup, truncation, and clearing of
//!    snapshots under a root directory.
//! 2. **Atomic writes:** Writers stage items in a hidden directory and are published with a
//!    single rename, so readers never observe a partial snapshot.
//! 3. **Verification:** Each snapshot records the scan-layout fingerprint; opening one written
//!    for a different layout fails instead of silently corrupting state.
//! 4. **Codecs:** The scan-chain blob ([`circuit`]) and the input signal trace ([`trace`]).
//!
//! On-disk layout, per tick (directory name is the tick as 20 zero-padded digits):
//! `meta.json`, `tick` (8-byte little-endian), `scanchain`, `mem/<axi>`,
//! `model/<name>/{state.bin,data.bin}`, and `trace.json`.

/// Circuit state and scan-chain blob codec.
pub mod circuit;
/// Input signal trace for record/replay.
pub mod trace;

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use circuit::{CircuitState, RamState, ScanLayout};
pub use trace::{SignalTrace, TraceEntry};

use crate::common::error::CheckpointError;

/// Version of the on-disk snapshot format.
pub const FORMAT_VERSION: u32 = 1;

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";

/// Names of checkpoint items.
pub mod item {
    /// Snapshot metadata.
    pub const META: &str = "meta.json";
    /// 8-byte little-endian tick.
    pub const TICK: &str = "tick";
    /// Scan-chain blob.
    pub const SCANCHAIN: &str = "scanchain";
    /// Signal trace.
    pub const TRACE: &str = "trace.json";
    /// Queue state file of a software model.
    pub const MODEL_STATE: &str = "state.bin";
    /// Backing store file of a software model.
    pub const MODEL_DATA: &str = "data.bin";

    /// Image of an AXI memory region.
    pub fn mem(name: &str) -> String {
        format!("mem/{name}")
    }

    /// A file belonging to a software model.
    pub fn model(name: &str, file: &str) -> String {
        format!("model/{name}/{file}")
    }
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Format version.
    pub version: u32,
    /// Tick of the snapshot.
    pub tick: u64,
    /// Scan-layout fingerprint of the system that wrote it.
    pub layout_fingerprint: u64,
}

fn tick_dir_name(tick: u64) -> String {
    format!("{tick:020}")
}

fn parse_tick_dir(name: &str) -> Option<u64> {
    if name.len() == 20 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

/// Root directory of tick-indexed snapshots.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
    fingerprint: u64,
}

impl CheckpointStore {
    /// Opens (creating if needed) a store for a system with the given layout fingerprint.
    ///
    /// Staging directories left behind by an interrupted writer are removed.
    pub fn open_root(root: impl Into<PathBuf>, fingerprint: u64) -> Result<Self, CheckpointError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CheckpointError::io(&root, e))?;
        let store = Self { root, fingerprint };
        store.remove_hidden()?;
        Ok(store)
    }

    /// Opens an existing store for reading only.
    ///
    /// Nothing is created or cleaned up, so a concurrent writer's staging directory survives.
    pub fn open_existing(
        root: impl Into<PathBuf>,
        fingerprint: u64,
    ) -> Result<Self, CheckpointError> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|e| CheckpointError::io(&root, e))?;
        if !meta.is_dir() {
            let err = io::Error::new(io::ErrorKind::NotADirectory, "not a directory");
            return Err(CheckpointError::io(&root, err));
        }
        Ok(Self { root, fingerprint })
    }

    fn remove_hidden(&self) -> Result<(), CheckpointError> {
        for entry in fs::read_dir(&self.root).map_err(|e| CheckpointError::io(&self.root, e))? {
            let entry = entry.map_err(|e| CheckpointError::io(&self.root, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STAGING_PREFIX) || name.starts_with(RETIRED_PREFIX) {
                warn!(dir = %name, "removing stale checkpoint directory");
                fs::remove_dir_all(entry.path()).map_err(|e| CheckpointError::io(entry.path(), e))?;
            }
        }
        Ok(())
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Layout fingerprint snapshots are verified against.
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn tick_path(&self, tick: u64) -> PathBuf {
        self.root.join(tick_dir_name(tick))
    }

    /// Committed ticks in ascending order.
    pub fn ticks(&self) -> Result<Vec<u64>, CheckpointError> {
        let mut ticks = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| CheckpointError::io(&self.root, e))? {
            let entry = entry.map_err(|e| CheckpointError::io(&self.root, e))?;
            let Some(tick) = parse_tick_dir(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            if entry.path().join(item::META).is_file() {
                ticks.push(tick);
            }
        }
        ticks.sort_unstable();
        Ok(ticks)
    }

    /// Whether a committed snapshot exists at exactly `tick`.
    pub fn exists(&self, tick: u64) -> bool {
        self.tick_path(tick).join(item::META).is_file()
    }

    /// Greatest committed tick not after `tick`, or 0 if there is none.
    pub fn find_nearest(&self, tick: u64) -> Result<u64, CheckpointError> {
        let ticks = self.ticks()?;
        let pos = ticks.partition_point(|&t| t <= tick);
        Ok(if pos == 0 { 0 } else { ticks[pos - 1] })
    }

    /// Most recent committed tick.
    pub fn latest(&self) -> Result<Option<u64>, CheckpointError> {
        Ok(self.ticks()?.last().copied())
    }

    /// Starts writing the snapshot for `tick`.
    ///
    /// Items are staged privately; nothing is visible until [`CheckpointStore::commit`].
    /// Committing replaces any existing snapshot at the same tick.
    pub fn open(&self, tick: u64) -> Result<CheckpointWriter, CheckpointError> {
        let staging = self.root.join(format!("{STAGING_PREFIX}{}", tick_dir_name(tick)));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| CheckpointError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| CheckpointError::io(&staging, e))?;
        debug!(tick, path = %staging.display(), "checkpoint staging opened");
        Ok(CheckpointWriter { tick, dir: staging })
    }

    /// Publishes a staged snapshot.
    pub fn commit(&self, writer: CheckpointWriter) -> Result<(), CheckpointError> {
        let meta = CheckpointMeta {
            version: FORMAT_VERSION,
            tick: writer.tick,
            layout_fingerprint: self.fingerprint,
        };
        writer.write_item(item::TICK, &writer.tick.to_le_bytes())?;
        writer.write_json(item::META, &meta)?;

        let target = self.tick_path(writer.tick);
        if target.exists() {
            let retired = self
                .root
                .join(format!("{RETIRED_PREFIX}{}", tick_dir_name(writer.tick)));
            fs::rename(&target, &retired).map_err(|e| CheckpointError::io(&target, e))?;
            fs::rename(&writer.dir, &target).map_err(|e| CheckpointError::io(&target, e))?;
            fs::remove_dir_all(&retired).map_err(|e| CheckpointError::io(&retired, e))?;
        } else {
            fs::rename(&writer.dir, &target).map_err(|e| CheckpointError::io(&target, e))?;
        }
        debug!(tick = writer.tick, "checkpoint committed");
        Ok(())
    }

    /// Opens the committed snapshot at `tick` for reading.
    pub fn read(&self, tick: u64) -> Result<CheckpointReader, CheckpointError> {
        if !self.exists(tick) {
            return Err(CheckpointError::NotFound(tick));
        }
        let reader = CheckpointReader {
            tick,
            dir: self.tick_path(tick),
        };
        let meta: CheckpointMeta = reader.read_json(item::META)?;
        if meta.layout_fingerprint != self.fingerprint {
            return Err(CheckpointError::LayoutMismatch {
                tick,
                expected: self.fingerprint,
                found: meta.layout_fingerprint,
            });
        }
        Ok(reader)
    }

    /// Irreversibly discards every snapshot after `tick`.
    pub fn truncate(&self, tick: u64) -> Result<(), CheckpointError> {
        for t in self.ticks()?.into_iter().filter(|&t| t > tick) {
            let path = self.tick_path(t);
            fs::remove_dir_all(&path).map_err(|e| CheckpointError::io(&path, e))?;
        }
        info!(tick, "checkpoints after tick discarded");
        Ok(())
    }

    /// Discards every snapshot.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        for t in self.ticks()? {
            let path = self.tick_path(t);
            fs::remove_dir_all(&path).map_err(|e| CheckpointError::io(&path, e))?;
        }
        Ok(())
    }
}

/// A snapshot being written.
#[derive(Debug)]
pub struct CheckpointWriter {
    tick: u64,
    dir: PathBuf,
}

impl CheckpointWriter {
    /// Tick of the snapshot.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Staging path of an item.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Creates (or truncates) an item for writing, creating parent directories.
    pub fn create_item(&self, name: &str) -> Result<BufWriter<File>, CheckpointError> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| CheckpointError::io(&path, e))?;
        Ok(BufWriter::new(file))
    }

    /// Writes a whole item.
    pub fn write_item(&self, name: &str, bytes: &[u8]) -> Result<(), CheckpointError> {
        let mut out = self.create_item(name)?;
        out.write_all(bytes)
            .and_then(|()| out.flush())
            .map_err(|e| CheckpointError::io(self.path(name), e))
    }

    /// Writes an item as pretty-printed JSON.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), CheckpointError> {
        let text = serde_json::to_string_pretty(value).map_err(|source| CheckpointError::Json {
            path: self.path(name),
            source,
        })?;
        self.write_item(name, text.as_bytes())
    }

    /// Writes the signal trace item.
    pub fn write_trace(&self, trace: &SignalTrace) -> Result<(), CheckpointError> {
        let text = trace.to_json().map_err(|source| CheckpointError::Json {
            path: self.path(item::TRACE),
            source,
        })?;
        self.write_item(item::TRACE, text.as_bytes())
    }
}

/// A committed snapshot opened for reading.
#[derive(Debug)]
pub struct CheckpointReader {
    tick: u64,
    dir: PathBuf,
}

impl CheckpointReader {
    /// Tick of the snapshot.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Path of an item.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Whether an item exists.
    pub fn has_item(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Opens an item for streaming reads.
    pub fn open_item(&self, name: &str) -> Result<BufReader<File>, CheckpointError> {
        let path = self.path(name);
        let file = File::open(&path).map_err(|e| CheckpointError::io(&path, e))?;
        Ok(BufReader::new(file))
    }

    /// Reads a whole item.
    pub fn read_item(&self, name: &str) -> Result<Vec<u8>, CheckpointError> {
        let mut buf = Vec::new();
        let _ = self
            .open_item(name)?
            .read_to_end(&mut buf)
            .map_err(|e| CheckpointError::io(self.path(name), e))?;
        Ok(buf)
    }

    /// Reads a JSON item.
    pub fn read_json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<T, CheckpointError> {
        let bytes = self.read_item(name)?;
        serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Json {
            path: self.path(name),
            source,
        })
    }

    /// Reads the 8-byte tick item.
    pub fn read_tick(&self) -> Result<u64, CheckpointError> {
        let bytes = self.read_item(item::TICK)?;
        let arr: [u8; 8] = bytes
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| CheckpointError::Truncated {
                item: item::TICK.to_string(),
                expected: 8,
                found: bytes.len(),
            })?;
        Ok(u64::from_le_bytes(arr))
    }

    /// Reads the signal trace; a snapshot without one yields an empty trace.
    pub fn read_trace(&self) -> Result<SignalTrace, CheckpointError> {
        if !self.has_item(item::TRACE) {
            return Ok(SignalTrace::new());
        }
        let bytes = self.read_item(item::TRACE)?;
        let text = String::from_utf8_lossy(&bytes);
        SignalTrace::from_json(&text).map_err(|source| CheckpointError::Json {
            path: self.path(item::TRACE),
            source,
        })
    }
}
