//! Software AXI4 RAM model.
//!
//! This module answers AXI4 memory-mapped transactions from a flat byte store so that external
//! RAM behaviour can be replayed deterministically from a checkpoint. It provides:
//! 1. **Channels:** A (address/command), W (write data), B (write response), R (read data).
//! 2. **Scheduling:** Lazy servicing of the head A request before any B/R access, with INCR and
//!    WRAP address sequencing, strobed writes, and burst validation.
//! 3. **Persistence:** Backing bytes and the exact contents of every queue, so that a checkpoint
//!    taken mid-transaction resumes with identical in-flight state.
//!
//! B and R queues are kept per transaction ID in a fixed array of `2^id_width` entries.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use tracing::{debug, warn};

use crate::checkpoint::{CheckpointReader, CheckpointWriter, item};
use crate::common::bitvector::BitVector;
use crate::common::error::{AxiChannel, AxiError, CheckpointError, ConfigError};
use crate::config::ModelInfo;

/// AXI burst type encodings.
pub mod burst {
    /// Fixed-address burst (unsupported).
    pub const FIXED: u8 = 0;
    /// Incrementing burst.
    pub const INCR: u8 = 1;
    /// Wrapping burst.
    pub const WRAP: u8 = 2;
}

/// Address/command channel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AChannel {
    /// Start address in bytes.
    pub addr: u64,
    /// Transaction ID.
    pub id: u16,
    /// Burst length minus one.
    pub len: u8,
    /// Log2 of bytes per beat.
    pub size: u8,
    /// Burst type (see [`burst`]).
    pub burst: u8,
    /// Write (`true`) or read (`false`).
    pub write: bool,
}

impl AChannel {
    /// Number of beats.
    pub const fn burst_len(&self) -> u64 {
        self.len as u64 + 1
    }

    /// Bytes per beat.
    pub const fn burst_size(&self) -> u64 {
        1 << self.size
    }

    const fn pack(&self) -> u32 {
        ((self.id as u32) << 16)
            | ((self.len as u32) << 8)
            | (((self.size & 0x7) as u32) << 5)
            | (((self.burst & 0x3) as u32) << 3)
            | (self.write as u32)
    }

    const fn unpack(word: u32, addr: u64) -> Self {
        Self {
            addr,
            id: (word >> 16) as u16,
            len: (word >> 8) as u8,
            size: ((word >> 5) & 0x7) as u8,
            burst: ((word >> 3) & 0x3) as u8,
            write: word & 1 != 0,
        }
    }
}

/// Write data channel payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WChannel {
    /// Beat data, `data_width` bits.
    pub data: BitVector,
    /// Byte strobes, one bit per data byte.
    pub strb: BitVector,
    /// Last beat of the burst.
    pub last: bool,
}

/// Write response channel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BChannel {
    /// Transaction ID.
    pub id: u16,
}

/// Read data channel payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RChannel {
    /// Beat data, `data_width` bits.
    pub data: BitVector,
    /// Transaction ID.
    pub id: u16,
    /// Last beat of the burst.
    pub last: bool,
}

/// Outcome of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// No A request is pending.
    Idle,
    /// The head write request is waiting for more W beats.
    Stalled,
    /// The head request was executed and popped.
    Serviced,
}

/// Geometry of a RAM model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamModelConfig {
    /// Address width in bits.
    pub addr_width: u32,
    /// Data width in bits; a multiple of 8.
    pub data_width: u32,
    /// Transaction ID width in bits.
    pub id_width: u32,
    /// Backing store size in bytes.
    pub mem_size: u64,
}

impl RamModelConfig {
    /// Reads `addr_width`, `data_width`, `id_width`, and `mem_size` (or `pf_count` 4 KiB pages)
    /// from a model description.
    pub fn from_model_info(info: &ModelInfo) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            info.int_param(key)
                .ok_or_else(|| ConfigError::InvalidModelParameter(format!("missing {key}")))
        };
        let mem_size = match info.int_param("mem_size") {
            Some(size) => non_negative("mem_size", size)?,
            None => non_negative("pf_count", get("pf_count")?)?
                .checked_mul(4096)
                .ok_or_else(|| {
                    ConfigError::InvalidModelParameter("pf_count overflows memory size".into())
                })?,
        };
        let width = |key: &str| {
            let value = get(key)?;
            u32::try_from(value).map_err(|_| {
                ConfigError::InvalidModelParameter(format!("{key} = {value} is out of range"))
            })
        };
        Ok(Self {
            addr_width: width("addr_width")?,
            data_width: width("data_width")?,
            id_width: width("id_width")?,
            mem_size,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_width == 0 || self.data_width % 8 != 0 || !self.data_width.is_power_of_two() {
            return Err(ConfigError::InvalidModelParameter(format!(
                "data width {} is not a power-of-two multiple of 8",
                self.data_width
            )));
        }
        if self.id_width > 16 {
            return Err(ConfigError::InvalidModelParameter(format!(
                "id width {} exceeds 16",
                self.id_width
            )));
        }
        if self.addr_width == 0 || self.addr_width > 64 {
            return Err(ConfigError::InvalidModelParameter(format!(
                "address width {} outside 1..=64",
                self.addr_width
            )));
        }
        if self.mem_size == 0 {
            return Err(ConfigError::InvalidModelParameter("memory size is zero".into()));
        }
        Ok(())
    }

    /// Bytes per data beat.
    pub const fn data_bytes(&self) -> usize {
        (self.data_width / 8) as usize
    }

    /// Number of distinct transaction IDs.
    pub const fn id_count(&self) -> usize {
        1 << self.id_width
    }
}

/// AXI4 transaction engine over a flat byte store.
#[derive(Debug, Clone)]
pub struct RamModel {
    cfg: RamModelConfig,
    data: Vec<u8>,
    a_queue: VecDeque<AChannel>,
    w_queue: VecDeque<WChannel>,
    b_queue: Box<[VecDeque<BChannel>]>,
    r_queue: Box<[VecDeque<RChannel>]>,
}

impl RamModel {
    /// Creates a model with a zeroed backing store and empty queues.
    pub fn new(cfg: RamModelConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            data: vec![0; cfg.mem_size as usize],
            a_queue: VecDeque::new(),
            w_queue: VecDeque::new(),
            b_queue: vec![VecDeque::new(); cfg.id_count()].into_boxed_slice(),
            r_queue: vec![VecDeque::new(); cfg.id_count()].into_boxed_slice(),
        })
    }

    /// Model geometry.
    pub const fn config(&self) -> &RamModelConfig {
        &self.cfg
    }

    /// Backing store.
    pub fn memory(&self) -> &[u8] {
        &self.data
    }

    /// Mutable backing store.
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Enqueues an address/command request.
    pub fn a_push(&mut self, a: AChannel) {
        self.a_queue.push_back(a);
    }

    /// Enqueues a write data beat.
    pub fn w_push(&mut self, w: WChannel) {
        self.w_queue.push_back(w);
    }

    /// Pending A requests.
    pub fn pending_a(&self) -> usize {
        self.a_queue.len()
    }

    /// Pending W beats.
    pub fn pending_w(&self) -> usize {
        self.w_queue.len()
    }

    /// Pending B responses for `id`.
    pub fn pending_b(&self, id: u16) -> Result<usize, AxiError> {
        Ok(self.b_queue[self.check_id(id)?].len())
    }

    /// Pending R beats for `id`.
    pub fn pending_r(&self, id: u16) -> Result<usize, AxiError> {
        Ok(self.r_queue[self.check_id(id)?].len())
    }

    fn check_id(&self, id: u16) -> Result<usize, AxiError> {
        let idx = id as usize;
        if idx >= self.cfg.id_count() {
            return Err(AxiError::IdOutOfRange {
                id,
                id_width: self.cfg.id_width,
            });
        }
        Ok(idx)
    }

    /// Computes every beat address of `a`, validating the burst first.
    fn beat_addresses(&self, a: &AChannel) -> Result<Vec<u64>, AxiError> {
        let nbytes = a.burst_size();
        let len = a.burst_len();

        if nbytes > self.cfg.data_bytes() as u64 {
            return Err(AxiError::BurstSizeTooLarge {
                size: nbytes,
                data_bytes: self.cfg.data_bytes() as u64,
            });
        }
        match a.burst {
            burst::WRAP => {
                if !matches!(len, 2 | 4 | 8 | 16) {
                    return Err(AxiError::InvalidWrapLength(len));
                }
            }
            burst::INCR => {}
            other => return Err(AxiError::UnsupportedBurst(other)),
        }

        let aligned = a.addr & !(nbytes - 1);
        let wrap_boundary = a.addr & !(nbytes * len - 1);
        let lower = if a.burst == burst::WRAP {
            wrap_boundary
        } else {
            aligned
        };
        let upper = lower + nbytes * len;

        let mut addr = aligned;
        let mut beats = Vec::with_capacity(len as usize);
        for _ in 0..len {
            if addr.checked_add(nbytes).is_none_or(|end| end > self.cfg.mem_size) {
                return Err(AxiError::AddressOutOfRange {
                    addr,
                    mem_size: self.cfg.mem_size,
                });
            }
            beats.push(addr);
            addr += nbytes;
            if addr == upper {
                addr = lower;
            }
        }
        Ok(beats)
    }

    /// Services the head A request if it can complete.
    ///
    /// A write waits until all of its W beats are queued. A request that fails validation is
    /// left at the head of the queue and no memory is touched.
    pub fn schedule(&mut self) -> Result<Schedule, AxiError> {
        let Some(a) = self.a_queue.front().copied() else {
            return Ok(Schedule::Idle);
        };

        if a.write && (self.w_queue.len() as u64) < a.burst_len() {
            return Ok(Schedule::Stalled);
        }

        let beats = self.beat_addresses(&a).inspect_err(|e| {
            warn!(id = a.id, addr = a.addr, error = %e, "rammodel: rejected transaction");
        })?;
        let id = self.check_id(a.id)?;
        let nbytes = a.burst_size() as usize;
        let data_bytes = self.cfg.data_bytes();
        let last_beat = beats.len() - 1;

        for (i, &addr) in beats.iter().enumerate() {
            let at = addr as usize;
            // Narrow beats occupy the byte lanes selected by the low address bits.
            let lane = at % data_bytes;
            if a.write {
                let Some(w) = self.w_queue.pop_front() else {
                    break;
                };
                let bytes = w.data.to_le_bytes();
                for j in 0..nbytes {
                    if w.strb.get_bit(lane + j).unwrap_or(false) {
                        self.data[at + j] = bytes.get(lane + j).copied().unwrap_or(0);
                    }
                }
            } else {
                let mut beat = vec![0u8; data_bytes];
                beat[lane..lane + nbytes].copy_from_slice(&self.data[at..at + nbytes]);
                let data = BitVector::from_le_bytes(self.cfg.data_width as usize, &beat);
                self.r_queue[id].push_back(RChannel {
                    data,
                    id: a.id,
                    last: i == last_beat,
                });
            }
        }

        if a.write {
            self.b_queue[id].push_back(BChannel { id: a.id });
        }
        let _ = self.a_queue.pop_front();
        debug!(
            id = a.id,
            addr = a.addr,
            beats = beats.len(),
            write = a.write,
            "rammodel: serviced"
        );
        Ok(Schedule::Serviced)
    }

    /// Head of the B queue for `id`, or a default response if empty.
    pub fn b_front(&mut self, id: u16) -> Result<BChannel, AxiError> {
        let idx = self.check_id(id)?;
        let _ = self.schedule()?;
        Ok(self.b_queue[idx].front().copied().unwrap_or(BChannel { id }))
    }

    /// Head of the R queue for `id`, or a zeroed beat if empty.
    pub fn r_front(&mut self, id: u16) -> Result<RChannel, AxiError> {
        let idx = self.check_id(id)?;
        let _ = self.schedule()?;
        Ok(self.r_queue[idx].front().cloned().unwrap_or_else(|| RChannel {
            data: BitVector::new(self.cfg.data_width as usize),
            id,
            last: false,
        }))
    }

    /// Removes the head of the B queue for `id`.
    pub fn b_pop(&mut self, id: u16) -> Result<BChannel, AxiError> {
        let idx = self.check_id(id)?;
        self.b_queue[idx].pop_front().ok_or(AxiError::EmptyQueue {
            channel: AxiChannel::B,
            id,
        })
    }

    /// Removes the head of the R queue for `id`.
    pub fn r_pop(&mut self, id: u16) -> Result<RChannel, AxiError> {
        let idx = self.check_id(id)?;
        self.r_queue[idx].pop_front().ok_or(AxiError::EmptyQueue {
            channel: AxiChannel::R,
            id,
        })
    }

    /// Empties every queue; the backing store is kept.
    pub fn reset(&mut self) {
        self.a_queue.clear();
        self.w_queue.clear();
        self.b_queue.iter_mut().for_each(VecDeque::clear);
        self.r_queue.iter_mut().for_each(VecDeque::clear);
    }

    /// Fills the backing store from `reader`, stopping at end of input.
    pub fn load_data(&mut self, reader: &mut dyn Read) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.data.len() {
            match reader.read(&mut self.data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Writes the whole backing store to `writer`.
    pub fn save_data(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&self.data)
    }

    fn strb_bytes(&self) -> usize {
        self.cfg.data_bytes().div_ceil(8)
    }

    /// Serializes the contents of every queue.
    pub fn save_state(&self, writer: &mut dyn Write) -> io::Result<()> {
        write_u32(writer, self.a_queue.len() as u32)?;
        for a in &self.a_queue {
            write_u32(writer, a.pack())?;
            writer.write_all(&a.addr.to_le_bytes())?;
        }

        write_u32(writer, self.w_queue.len() as u32)?;
        for w in &self.w_queue {
            writer.write_all(&[u8::from(w.last)])?;
            writer.write_all(&fixed_bytes(&w.strb, self.strb_bytes()))?;
            writer.write_all(&fixed_bytes(&w.data, self.cfg.data_bytes()))?;
        }

        for queue in &self.b_queue {
            write_u32(writer, queue.len() as u32)?;
            for b in queue {
                writer.write_all(&b.id.to_le_bytes())?;
            }
        }

        for queue in &self.r_queue {
            write_u32(writer, queue.len() as u32)?;
            for r in queue {
                writer.write_all(&r.id.to_le_bytes())?;
                writer.write_all(&[u8::from(r.last)])?;
                writer.write_all(&fixed_bytes(&r.data, self.cfg.data_bytes()))?;
            }
        }
        Ok(())
    }

    /// Restores every queue from the format written by [`RamModel::save_state`].
    ///
    /// On failure the queues are left empty.
    pub fn load_state(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        self.reset();
        let result = self.read_queues(reader);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn read_queues(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        let data_width = self.cfg.data_width as usize;
        let data_bytes = self.cfg.data_bytes();
        let strb_bytes = self.strb_bytes();

        for _ in 0..read_u32(reader)? {
            let word = read_u32(reader)?;
            let addr = u64::from_le_bytes(read_array(reader)?);
            self.a_queue.push_back(AChannel::unpack(word, addr));
        }

        for _ in 0..read_u32(reader)? {
            let [last] = read_array::<1>(reader)?;
            let strb = read_vec(reader, strb_bytes)?;
            let data = read_vec(reader, data_bytes)?;
            self.w_queue.push_back(WChannel {
                data: BitVector::from_le_bytes(data_width, &data),
                strb: BitVector::from_le_bytes(data_bytes, &strb),
                last: last != 0,
            });
        }

        for queue in self.b_queue.iter_mut() {
            for _ in 0..read_u32(reader)? {
                let id = u16::from_le_bytes(read_array(reader)?);
                queue.push_back(BChannel { id });
            }
        }

        for queue in self.r_queue.iter_mut() {
            for _ in 0..read_u32(reader)? {
                let id = u16::from_le_bytes(read_array(reader)?);
                let [last] = read_array::<1>(reader)?;
                let data = read_vec(reader, data_bytes)?;
                queue.push_back(RChannel {
                    data: BitVector::from_le_bytes(data_width, &data),
                    id,
                    last: last != 0,
                });
            }
        }
        Ok(())
    }

    /// Restores the model from checkpoint items.
    ///
    /// Queue state comes from `model/<name>/state.bin`. Backing bytes come from
    /// `model/<name>/data.bin` if present, otherwise from the AXI region image `mem/<name>`.
    pub fn load_checkpoint(
        &mut self,
        ckpt: &CheckpointReader,
        name: &str,
    ) -> Result<(), CheckpointError> {
        let data_item = if ckpt.has_item(&item::model(name, item::MODEL_DATA)) {
            item::model(name, item::MODEL_DATA)
        } else {
            item::mem(name)
        };
        let mut data = ckpt.open_item(&data_item)?;
        let _ = self
            .load_data(&mut data)
            .map_err(|e| CheckpointError::io(ckpt.path(&data_item), e))?;

        let state_item = item::model(name, item::MODEL_STATE);
        if ckpt.has_item(&state_item) {
            let mut state = ckpt.open_item(&state_item)?;
            self.load_state(&mut state)
                .map_err(|e| CheckpointError::io(ckpt.path(&state_item), e))?;
        } else {
            self.reset();
        }
        Ok(())
    }

    /// Writes the model's backing bytes and queue state into checkpoint items.
    pub fn save_checkpoint(
        &self,
        ckpt: &CheckpointWriter,
        name: &str,
    ) -> Result<(), CheckpointError> {
        let data_item = item::model(name, item::MODEL_DATA);
        let mut data = ckpt.create_item(&data_item)?;
        self.save_data(&mut data)
            .and_then(|()| data.flush())
            .map_err(|e| CheckpointError::io(ckpt.path(&data_item), e))?;

        let state_item = item::model(name, item::MODEL_STATE);
        let mut state = ckpt.create_item(&state_item)?;
        self.save_state(&mut state)
            .and_then(|()| state.flush())
            .map_err(|e| CheckpointError::io(ckpt.path(&state_item), e))
    }
}

fn non_negative(key: &str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value)
        .map_err(|_| ConfigError::InvalidModelParameter(format!("{key} = {value} is negative")))
}

fn fixed_bytes(bv: &BitVector, len: usize) -> Vec<u8> {
    let mut bytes = bv.to_le_bytes();
    bytes.resize(len, 0);
    bytes
}

fn write_u32(writer: &mut dyn Write, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_u32(reader: &mut dyn Read) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_array(reader)?))
}

fn read_array<const N: usize>(reader: &mut dyn Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_vec(reader: &mut dyn Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
