//! Circuit state and the scan-chain blob codec.
//!
//! The scan chain streams every flip-flop chunk in declaration order, then every scanned RAM in
//! declaration order. In the blob each of the two sections is padded to a 64-bit boundary, and
//! the whole blob is zero-padded to a 4 KiB boundary so it can be DMA'd page-wise.
//!
//! [`ScanLayout`] validates the layout against the system description and fingerprints it;
//! [`CircuitState`] holds decoded wire and RAM contents keyed by flattened name.

use std::collections::BTreeMap;

use crate::common::bitvector::{BitVector, BitVectorArray};
use crate::common::error::{BitVectorError, CheckpointError, ConfigError};
use crate::config::{ScanFfInfo, ScanRamInfo, SysInfo, flatten_name};

/// Alignment of the encoded scan-chain blob.
pub const BLOB_ALIGN: usize = 4096;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Bytes occupied by `bits` when padded to whole 64-bit words.
const fn section_bytes(bits: usize) -> usize {
    bits.div_ceil(64) * 8
}

fn words_to_bytes(bv: &BitVector) -> Vec<u8> {
    let nwords = bv.width().div_ceil(64);
    bv.words()[..nwords.min(bv.words().len())]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// A flip-flop chunk of the scan chain with its flattened wire name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FfEntry {
    wire: Option<String>,
    width: usize,
    offset: usize,
}

/// A scanned RAM with its flattened name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RamEntry {
    name: String,
    width: usize,
    depth: u64,
}

/// The validated, immutable scan-chain layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLayout {
    ff: Vec<FfEntry>,
    ram: Vec<RamEntry>,
    ff_bits: usize,
    ram_bits: usize,
    fingerprint: u64,
}

impl ScanLayout {
    /// Builds the layout from the description, checking that every entry names a declared
    /// wire or RAM and fits inside it.
    pub fn new(sysinfo: &SysInfo) -> Result<Self, ConfigError> {
        let ff = sysinfo
            .scan_ff
            .iter()
            .map(|info| Self::ff_entry(sysinfo, info))
            .collect::<Result<Vec<_>, _>>()?;
        let ram = sysinfo
            .scan_ram
            .iter()
            .map(|info| Self::ram_entry(sysinfo, info))
            .collect::<Result<Vec<_>, _>>()?;

        let ff_bits = ff.iter().map(|e| e.width).sum();
        let ram_bits = ram.iter().map(|e| e.width * e.depth as usize).sum();
        let fingerprint = Self::compute_fingerprint(&sysinfo.scan_ff, &sysinfo.scan_ram);

        Ok(Self {
            ff,
            ram,
            ff_bits,
            ram_bits,
            fingerprint,
        })
    }

    fn ff_entry(sysinfo: &SysInfo, info: &ScanFfInfo) -> Result<FfEntry, ConfigError> {
        if info.name.is_empty() {
            return Ok(FfEntry {
                wire: None,
                width: info.width,
                offset: info.offset,
            });
        }
        let name = flatten_name(&info.name);
        let wire = sysinfo
            .find_wire(&name)
            .ok_or_else(|| ConfigError::UndeclaredScanTarget {
                kind: "wire",
                name: name.clone(),
            })?;
        if info.offset + info.width > wire.width {
            return Err(ConfigError::ScanEntryMismatch {
                name,
                source: BitVectorError::RangeOutOfBounds {
                    offset: info.offset,
                    width: info.width,
                    capacity: wire.width,
                },
            });
        }
        Ok(FfEntry {
            wire: Some(name),
            width: info.width,
            offset: info.offset,
        })
    }

    fn ram_entry(sysinfo: &SysInfo, info: &ScanRamInfo) -> Result<RamEntry, ConfigError> {
        let name = flatten_name(&info.name);
        let ram = sysinfo
            .find_ram(&name)
            .ok_or_else(|| ConfigError::UndeclaredScanTarget {
                kind: "ram",
                name: name.clone(),
            })?;
        if ram.width != info.width || ram.depth != info.depth {
            return Err(ConfigError::ScanEntryMismatch {
                name,
                source: BitVectorError::WidthMismatch {
                    expected: ram.width * ram.depth as usize,
                    found: info.width * info.depth as usize,
                },
            });
        }
        Ok(RamEntry {
            name,
            width: info.width,
            depth: info.depth,
        })
    }

    fn compute_fingerprint(ff: &[ScanFfInfo], ram: &[ScanRamInfo]) -> u64 {
        let mut h = FNV_OFFSET;
        for e in ff {
            h = fnv1a(h, b"F");
            h = fnv1a(h, flatten_name(&e.name).as_bytes());
            h = fnv1a(h, &[0]);
            h = fnv1a(h, &(e.width as u64).to_le_bytes());
            h = fnv1a(h, &(e.offset as u64).to_le_bytes());
        }
        for e in ram {
            h = fnv1a(h, b"R");
            h = fnv1a(h, flatten_name(&e.name).as_bytes());
            h = fnv1a(h, &[0]);
            h = fnv1a(h, &(e.width as u64).to_le_bytes());
            h = fnv1a(h, &e.depth.to_le_bytes());
        }
        h
    }

    /// Total flip-flop bits in the chain.
    pub const fn ff_bits(&self) -> usize {
        self.ff_bits
    }

    /// Total RAM bits in the chain.
    pub const fn ram_bits(&self) -> usize {
        self.ram_bits
    }

    /// Size of the encoded blob including all padding.
    pub const fn encoded_len(&self) -> usize {
        let raw = section_bytes(self.ff_bits) + section_bytes(self.ram_bits);
        raw.div_ceil(BLOB_ALIGN) * BLOB_ALIGN
    }

    /// FNV-1a hash over every entry's name, width, and offset or depth.
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// Contents of one RAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamState {
    /// Element storage.
    pub data: BitVectorArray,
    /// Contents come from the AXI memory model rather than the scan chain.
    pub dissolved: bool,
}

/// Decoded flip-flop and RAM contents of the whole design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitState {
    layout: ScanLayout,
    /// Wire values keyed by flattened name.
    pub wire: BTreeMap<String, BitVector>,
    /// RAM contents keyed by flattened name.
    pub ram: BTreeMap<String, RamState>,
}

impl CircuitState {
    /// Builds the initial state from the description's declared initial values.
    pub fn new(sysinfo: &SysInfo) -> Result<Self, ConfigError> {
        let layout = ScanLayout::new(sysinfo)?;

        let mut wire = BTreeMap::new();
        for info in &sysinfo.wire {
            let name = flatten_name(&info.name);
            let value = match &info.init_data {
                Some(text) => BitVector::parse(info.width, text).map_err(|source| {
                    ConfigError::InvalidInitValue {
                        name: name.clone(),
                        source,
                    }
                })?,
                None => BitVector::new(info.width),
            };
            let _ = wire.insert(name, value);
        }

        let mut ram = BTreeMap::new();
        for info in &sysinfo.ram {
            let name = flatten_name(&info.name);
            let mut data = BitVectorArray::new(info.width, info.depth, info.start_offset);
            if let Some(text) = &info.init_data {
                let flat = BitVector::parse(data.data().width(), text).map_err(|source| {
                    ConfigError::InvalidInitValue {
                        name: name.clone(),
                        source,
                    }
                })?;
                *data.data_mut() = flat;
            }
            let _ = ram.insert(
                name,
                RamState {
                    data,
                    dissolved: info.dissolved,
                },
            );
        }

        Ok(Self { layout, wire, ram })
    }

    /// The scan layout this state encodes against.
    pub const fn layout(&self) -> &ScanLayout {
        &self.layout
    }

    /// Packs the state into a scan-chain blob of [`ScanLayout::encoded_len`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, BitVectorError> {
        let mut ff_data = BitVector::new(self.layout.ff_bits);
        let mut at = 0;
        for entry in &self.layout.ff {
            if let Some(wire) = entry.wire.as_ref().and_then(|name| self.wire.get(name)) {
                ff_data.set_value(at, &wire.get_value(entry.offset, entry.width)?)?;
            }
            at += entry.width;
        }

        let mut ram_data = BitVector::new(self.layout.ram_bits);
        let mut at = 0;
        for entry in &self.layout.ram {
            if let Some(state) = self.ram.get(&entry.name) {
                ram_data.set_value(at, state.data.data())?;
            }
            at += entry.width * entry.depth as usize;
        }

        let mut blob = words_to_bytes(&ff_data);
        blob.extend(words_to_bytes(&ram_data));
        blob.resize(self.layout.encoded_len(), 0);
        Ok(blob)
    }

    /// Redistributes a scan-chain blob into wire and RAM storage.
    pub fn decode(&mut self, blob: &[u8]) -> Result<(), CheckpointError> {
        let ff_len = section_bytes(self.layout.ff_bits);
        let ram_len = section_bytes(self.layout.ram_bits);
        if blob.len() < ff_len + ram_len {
            return Err(CheckpointError::Truncated {
                item: "scanchain".to_string(),
                expected: ff_len + ram_len,
                found: blob.len(),
            });
        }

        let ff_data = BitVector::from_le_bytes(self.layout.ff_bits, &blob[..ff_len]);
        let mut at = 0;
        for entry in &self.layout.ff {
            if let Some(wire) = entry.wire.as_ref().and_then(|name| self.wire.get_mut(name)) {
                wire.set_value(entry.offset, &ff_data.get_value(at, entry.width)?)?;
            }
            at += entry.width;
        }

        let ram_data =
            BitVector::from_le_bytes(self.layout.ram_bits, &blob[ff_len..ff_len + ram_len]);
        let mut at = 0;
        for entry in &self.layout.ram {
            let bits = entry.width * entry.depth as usize;
            if let Some(state) = self.ram.get_mut(&entry.name) {
                *state.data.data_mut() = ram_data.get_value(at, bits)?;
            }
            at += bits;
        }
        Ok(())
    }
}
