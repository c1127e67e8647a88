use remu_core::controller::{ScanDirection, regdef};
use remu_core::uma::{DeviceMemory, RegisterBus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Register offsets at or above this are treated as signal registers and logged.
pub const SIGNAL_BASE: usize = 0x1000;

/// Observable state of the simulated fabric.
#[derive(Debug, Default)]
pub struct FabricState {
    pub regs: BTreeMap<usize, u32>,
    pub memory: Vec<u8>,
    pub dma_base: u64,
    pub tick: u64,
    /// Contents of the physical scan chain.
    pub scan_state: Vec<u8>,
    /// `(tick, trigger bit)` pairs; a RUN stops early when it reaches one.
    pub trigger_ticks: Vec<(u64, usize)>,
    /// Number of `MODE_CTRL` reads that report pause-busy after leaving RUN.
    pub pause_busy_polls: u32,
    pending_busy: u32,
    /// `(start tick, programmed steps)` of every RUN.
    pub runs: Vec<(u64, u32)>,
    pub scans: Vec<ScanDirection>,
    pub reg_writes: Vec<(usize, u32)>,
    /// `(tick, offset, value)` of every signal register write.
    pub signal_log: Vec<(u64, usize, u32)>,
}

impl FabricState {
    fn reg(&self, offset: usize) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn start_run(&mut self) {
        for i in 0..regdef::TRIG_REGS {
            let _ = self.regs.remove(&(regdef::TRIG_STAT_START + 4 * i));
        }
        let start = self.tick;
        let steps = self.reg(regdef::STEP_CNT);
        self.runs.push((start, steps));

        let target = start + u64::from(steps);
        let hit = self
            .trigger_ticks
            .iter()
            .filter(|(t, _)| *t > start && *t <= target)
            .map(|(t, _)| *t)
            .min();
        self.tick = hit.unwrap_or(target);
        if let Some(t) = hit {
            let bits: Vec<usize> = self
                .trigger_ticks
                .iter()
                .filter(|(tt, _)| *tt == t)
                .map(|(_, b)| *b)
                .collect();
            for bit in bits {
                let off = regdef::TRIG_STAT_START + (bit / 32) * 4;
                let v = self.reg(off) | (1 << (bit % 32));
                let _ = self.regs.insert(off, v);
            }
        }

        let ctrl = self.reg(regdef::MODE_CTRL) & !regdef::MODE_CTRL_RUN_MODE;
        let _ = self.regs.insert(regdef::MODE_CTRL, ctrl);
        self.pending_busy = self.pause_busy_polls;
    }

    fn scan(&mut self, value: u32) {
        let dir = if value & regdef::SCAN_CTRL_DIRECTION != 0 {
            ScanDirection::In
        } else {
            ScanDirection::Out
        };
        let off = (u64::from(self.reg(regdef::DMA_BASE)) - self.dma_base) as usize;
        let len = self.scan_state.len();
        match dir {
            ScanDirection::In => {
                self.scan_state = self.memory[off..off + len].to_vec();
            }
            ScanDirection::Out => {
                let state = self.scan_state.clone();
                self.memory[off..off + len].copy_from_slice(&state);
            }
        }
        self.scans.push(dir);
    }
}

/// A behavioural fabric shared between a register and a memory transport.
///
/// RUN completes instantly (stopping early at a trigger tick) and scans copy between the scan
/// chain and the DMA window programmed in `DMA_BASE`.
#[derive(Clone, Debug, Default)]
pub struct SimFabric {
    state: Arc<Mutex<FabricState>>,
}

impl SimFabric {
    pub fn new(mem_size: usize, dma_base: u64, scan_len: usize) -> Self {
        let state = FabricState {
            memory: vec![0; mem_size],
            dma_base,
            scan_state: vec![0; scan_len],
            ..FabricState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FabricState> {
        self.state.lock().unwrap()
    }

    pub fn registers(&self) -> Box<dyn RegisterBus> {
        Box::new(FabricRegisters(self.clone()))
    }

    pub fn memory(&self) -> Box<dyn DeviceMemory> {
        Box::new(FabricMemory(self.clone()))
    }
}

pub struct FabricRegisters(SimFabric);

impl RegisterBus for FabricRegisters {
    fn read(&mut self, offset: usize) -> u32 {
        let mut s = self.0.state();
        match offset {
            regdef::MODE_CTRL => {
                let mut value = s.reg(offset);
                if s.pending_busy > 0 {
                    s.pending_busy -= 1;
                    value |= regdef::MODE_CTRL_PAUSE_BUSY;
                }
                value
            }
            regdef::TICK_CNT_LO => s.tick as u32,
            regdef::TICK_CNT_HI => (s.tick >> 32) as u32,
            regdef::SCAN_CTRL => 0,
            _ => s.reg(offset),
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        let mut s = self.0.state();
        s.reg_writes.push((offset, value));
        match offset {
            regdef::MODE_CTRL => {
                let prev = s.reg(offset);
                let mask = regdef::MODE_CTRL_RUN_MODE | regdef::MODE_CTRL_SCAN_MODE;
                let _ = s.regs.insert(offset, value & mask);
                let run_now = value & regdef::MODE_CTRL_RUN_MODE != 0;
                let run_before = prev & regdef::MODE_CTRL_RUN_MODE != 0;
                if run_now && !run_before {
                    s.start_run();
                } else if run_before && !run_now {
                    s.pending_busy = s.pause_busy_polls;
                }
            }
            regdef::TICK_CNT_LO => {
                s.tick = (s.tick & !0xffff_ffff) | u64::from(value);
            }
            regdef::TICK_CNT_HI => {
                s.tick = (s.tick & 0xffff_ffff) | (u64::from(value) << 32);
            }
            regdef::SCAN_CTRL => {
                if value & regdef::SCAN_CTRL_START != 0 {
                    s.scan(value);
                }
            }
            _ => {
                if offset >= SIGNAL_BASE {
                    let tick = s.tick;
                    s.signal_log.push((tick, offset, value));
                }
                let _ = s.regs.insert(offset, value);
            }
        }
    }
}

pub struct FabricMemory(SimFabric);

impl DeviceMemory for FabricMemory {
    fn read(&mut self, buf: &mut [u8], offset: u64) {
        let s = self.0.state();
        let at = offset as usize;
        buf.copy_from_slice(&s.memory[at..at + buf.len()]);
    }

    fn write(&mut self, buf: &[u8], offset: u64) {
        let mut s = self.0.state();
        let at = offset as usize;
        s.memory[at..at + buf.len()].copy_from_slice(buf);
    }

    fn fill(&mut self, byte: u8, offset: u64, len: u64) {
        let mut s = self.0.state();
        let at = offset as usize;
        s.memory[at..at + len as usize].fill(byte);
    }

    fn size(&self) -> u64 {
        self.0.state().memory.len() as u64
    }

    fn dma_base(&self) -> u64 {
        self.0.state().dma_base
    }
}
