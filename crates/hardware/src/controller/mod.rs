//! Hardware abstraction of the emulation fabric.
//!
//! This module drives the fabric through its control registers. It provides:
//! 1. **Mode machine:** PAUSE, RUN, and SCAN with the busy-wait handshakes the hardware requires.
//! 2. **Tick counter:** Torn-read-safe 64-bit reads across two 32-bit registers.
//! 3. **Signals and triggers:** Register-mapped access by object index.
//! 4. **AXI memory:** Largest-first power-of-two allocation of device memory, base/mask remap
//!    programming, and streaming load/save of region contents.
//! 5. **Scan window:** A page-aligned DMA window that receives scan-out data and supplies
//!    scan-in data.
//!
//! Every busy-wait polls with a fixed sleep and has no timeout: the hardware is assumed to make
//! progress, so a stuck device shows up as a hang.

/// Device memory allocation for AXI regions and the scan window.
pub mod axi;
/// Execution modes and scan direction.
pub mod mode;
/// Runtime signal, trigger, and AXI objects.
pub mod objects;
/// Control register map.
pub mod regdef;

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

pub use axi::{Allocation, AllocationPlan, allocate};
pub use mode::{Mode, ScanDirection};
pub use objects::{AxiObject, ObjectTable, SignalObject, TriggerObject};

use crate::checkpoint::ScanLayout;
use crate::common::bitvector::BitVector;
use crate::common::error::{ConfigError, ProtocolError, Result};
use crate::config::{SysInfo, flatten_name};
use crate::uma::{DeviceMemory, RegisterBus};

/// Register-level driver for one emulation fabric.
pub struct Controller {
    reg: Box<dyn RegisterBus>,
    mem: Box<dyn DeviceMemory>,
    signals: ObjectTable<SignalObject>,
    triggers: ObjectTable<TriggerObject>,
    axis: ObjectTable<AxiObject>,
    scan_window: Allocation,
    poll_interval: Duration,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("signals", &self.signals.len())
            .field("triggers", &self.triggers.len())
            .field("axis", &self.axis.len())
            .field("scan_window", &self.scan_window)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Binds the description to the transports and initializes the fabric.
    ///
    /// The device memory plan is computed and checked before any register is written. On
    /// success all triggers are enabled, input signals are zeroed, AXI regions are remapped and
    /// cleared, and the scan window address is programmed.
    pub fn new(
        sysinfo: &SysInfo,
        mem: Box<dyn DeviceMemory>,
        reg: Box<dyn RegisterBus>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let signals = ObjectTable::new(
            sysinfo
                .signal
                .iter()
                .enumerate()
                .map(|(index, info)| SignalObject {
                    index,
                    name: flatten_name(&info.name),
                    width: info.width,
                    output: info.output,
                    reg_offset: info.reg_offset,
                })
                .collect(),
        );

        let mut triggers = Vec::with_capacity(sysinfo.trigger.len());
        for (index, info) in sysinfo.trigger.iter().enumerate() {
            let name = flatten_name(&info.name);
            if info.index >= regdef::MAX_TRIGGERS {
                return Err(ConfigError::TriggerIndexOutOfRange {
                    name,
                    index: info.index,
                    max: regdef::MAX_TRIGGERS,
                }
                .into());
            }
            triggers.push(TriggerObject {
                index,
                name,
                reg_index: info.index,
            });
        }
        let triggers = ObjectTable::new(triggers);

        let layout = ScanLayout::new(sysinfo)?;
        let sizes: Vec<u64> = sysinfo.axi.iter().map(|a| a.size).collect();
        let plan = allocate(&sizes, layout.encoded_len() as u64);
        plan.check_capacity(mem.size())?;
        let scan_addr = mem.dma_base() + plan.scan_window.offset;
        let scan_addr = u32::try_from(scan_addr)
            .map_err(|_| ConfigError::ScanWindowOutOfReach { addr: scan_addr })?;

        let axis = ObjectTable::new(
            sysinfo
                .axi
                .iter()
                .zip(&plan.regions)
                .enumerate()
                .map(|(index, (info, alloc))| AxiObject {
                    index,
                    name: flatten_name(&info.name),
                    size: info.size,
                    reg_offset: info.reg_offset,
                    assigned_offset: alloc.offset,
                    assigned_size: alloc.size,
                })
                .collect(),
        );

        let mut ctrl = Self {
            reg,
            mem,
            signals,
            triggers,
            axis,
            scan_window: plan.scan_window,
            poll_interval,
        };
        ctrl.init_signals()?;
        ctrl.init_triggers()?;
        ctrl.init_axi();
        ctrl.init_scan_window(scan_addr);
        Ok(ctrl)
    }

    fn init_signals(&mut self) -> Result<()> {
        let inputs: Vec<(usize, usize)> = self
            .signals
            .iter()
            .filter(|s| !s.output)
            .map(|s| (s.index, s.width))
            .collect();
        for (index, width) in inputs {
            self.set_signal(index, &BitVector::new(width))?;
        }
        Ok(())
    }

    fn init_triggers(&mut self) -> Result<()> {
        for index in 0..self.triggers.len() {
            self.set_trigger_enable(index, true)?;
        }
        Ok(())
    }

    fn init_axi(&mut self) {
        let dma_base = self.mem.dma_base();
        let mut order: Vec<&AxiObject> = self.axis.iter().collect();
        order.sort_by_key(|a| a.assigned_offset);
        for axi in order {
            info!(
                axi = %axi.name,
                start = %format_args!("{:#010x}", dma_base + axi.assigned_offset),
                end = %format_args!("{:#010x}", dma_base + axi.assigned_offset + axi.assigned_size),
                "allocated device memory for AXI port"
            );
        }

        for axi in &self.axis {
            let base = dma_base + axi.assigned_offset;
            let mask = axi.assigned_size - 1;
            let off = axi.reg_offset as usize;
            self.reg.write(off + regdef::axi::BASE_LO, base as u32);
            self.reg.write(off + regdef::axi::BASE_HI, (base >> 32) as u32);
            self.reg.write(off + regdef::axi::MASK_LO, mask as u32);
            self.reg.write(off + regdef::axi::MASK_HI, (mask >> 32) as u32);
        }

        for axi in &self.axis {
            debug!(axi = %axi.name, "clearing AXI memory");
            self.mem.fill(0, axi.assigned_offset, axi.assigned_size);
        }
    }

    fn init_scan_window(&mut self, addr: u32) {
        self.reg.write(regdef::DMA_BASE, addr);
        debug!(
            addr = %format_args!("{addr:#x}"),
            size = self.scan_window.size,
            "scan window programmed"
        );
    }

    fn mode_ctrl(&mut self) -> u32 {
        self.reg.read(regdef::MODE_CTRL)
    }

    fn wait_while(&mut self, offset: usize, mask: u32) {
        while self.reg.read(offset) & mask != 0 {
            thread::sleep(self.poll_interval);
        }
    }

    /// Current execution mode.
    pub fn mode(&mut self) -> std::result::Result<Mode, ProtocolError> {
        let ctrl = self.mode_ctrl();
        Mode::from_mode_ctrl(ctrl)
    }

    /// Whether the run-mode bit is set.
    pub fn is_run_mode(&mut self) -> bool {
        self.mode_ctrl() & regdef::MODE_CTRL_RUN_MODE != 0
    }

    /// Whether the scan-mode bit is set.
    pub fn is_scan_mode(&mut self) -> bool {
        self.mode_ctrl() & regdef::MODE_CTRL_SCAN_MODE != 0
    }

    fn enter_run_mode(&mut self) {
        let ctrl = self.mode_ctrl() | regdef::MODE_CTRL_RUN_MODE;
        self.reg.write(regdef::MODE_CTRL, ctrl);
        debug!("PAUSE -> RUN");
    }

    fn exit_run_mode(&mut self) {
        let ctrl = self.mode_ctrl() & !regdef::MODE_CTRL_RUN_MODE;
        self.reg.write(regdef::MODE_CTRL, ctrl);
        self.wait_while(regdef::MODE_CTRL, regdef::MODE_CTRL_PAUSE_BUSY);
        // RAM output registers need one more fabric cycle before they are scannable; the
        // register read round trips above provide it on current platforms.
        debug!("RUN -> PAUSE");
    }

    fn enter_scan_mode(&mut self) {
        self.wait_while(regdef::MODE_CTRL, regdef::MODE_CTRL_MODEL_BUSY);
        let ctrl = self.mode_ctrl() | regdef::MODE_CTRL_SCAN_MODE;
        self.reg.write(regdef::MODE_CTRL, ctrl);
        debug!("PAUSE -> SCAN");
    }

    fn exit_scan_mode(&mut self) {
        let ctrl = self.mode_ctrl() & !regdef::MODE_CTRL_SCAN_MODE;
        self.reg.write(regdef::MODE_CTRL, ctrl);
        debug!("SCAN -> PAUSE");
    }

    /// Moves to `mode`, passing through PAUSE.
    ///
    /// A direct RUN <-> SCAN transition is rejected without touching the hardware.
    pub fn set_mode(&mut self, mode: Mode) -> std::result::Result<(), ProtocolError> {
        let prev = self.mode()?;
        if prev == mode {
            return Ok(());
        }
        match (prev, mode) {
            (Mode::Run, Mode::Scan) | (Mode::Scan, Mode::Run) => {
                return Err(ProtocolError::IllegalTransition {
                    from: prev,
                    to: mode,
                });
            }
            (Mode::Run, _) => self.exit_run_mode(),
            (Mode::Scan, _) => self.exit_scan_mode(),
            (Mode::Pause, _) => {}
        }
        match mode {
            Mode::Run => self.enter_run_mode(),
            Mode::Scan => self.enter_scan_mode(),
            Mode::Pause => {}
        }
        Ok(())
    }

    /// Programs `steps` and starts running from PAUSE.
    pub fn run(&mut self, steps: u32) -> std::result::Result<(), ProtocolError> {
        let mode = self.mode()?;
        if mode != Mode::Pause {
            return Err(ProtocolError::IllegalTransition {
                from: mode,
                to: Mode::Run,
            });
        }
        self.set_step_count(steps);
        self.set_mode(Mode::Run)
    }

    /// Requests PAUSE and waits for the fabric to settle.
    pub fn pause(&mut self) -> std::result::Result<(), ProtocolError> {
        self.set_mode(Mode::Pause)
    }

    /// Blocks until the fabric returns to PAUSE on its own after a RUN.
    pub fn wait_for_pause(&mut self) {
        self.wait_while(
            regdef::MODE_CTRL,
            regdef::MODE_CTRL_RUN_MODE | regdef::MODE_CTRL_PAUSE_BUSY,
        );
    }

    /// Reads the 64-bit tick counter, retrying if the high half changed mid-read.
    pub fn tick_count(&mut self) -> u64 {
        loop {
            let hi = self.reg.read(regdef::TICK_CNT_HI);
            let lo = self.reg.read(regdef::TICK_CNT_LO);
            if hi == self.reg.read(regdef::TICK_CNT_HI) {
                return (u64::from(hi) << 32) | u64::from(lo);
            }
        }
    }

    /// Overwrites the tick counter.
    pub fn set_tick_count(&mut self, count: u64) {
        self.reg.write(regdef::TICK_CNT_LO, count as u32);
        self.reg.write(regdef::TICK_CNT_HI, (count >> 32) as u32);
    }

    /// Programs the number of ticks the next RUN executes.
    pub fn set_step_count(&mut self, count: u32) {
        self.reg.write(regdef::STEP_CNT, count);
    }

    /// Streams state across the scan chain and returns to PAUSE.
    ///
    /// Only legal in PAUSE; in any other mode it fails without writing a register.
    pub fn do_scan(&mut self, direction: ScanDirection) -> std::result::Result<(), ProtocolError> {
        let mode = self.mode()?;
        if mode != Mode::Pause {
            return Err(ProtocolError::ScanOutsidePause(mode));
        }

        self.enter_scan_mode();
        self.reg.write(regdef::SCAN_CTRL, direction.scan_ctrl());
        self.wait_while(regdef::SCAN_CTRL, regdef::SCAN_CTRL_RUNNING);
        self.exit_scan_mode();
        debug!(?direction, "scan complete");
        Ok(())
    }

    /// Signal objects.
    pub const fn signals(&self) -> &ObjectTable<SignalObject> {
        &self.signals
    }

    /// Index of the signal named `name`.
    pub fn lookup_signal(&self, name: &str) -> Option<usize> {
        self.signals.lookup(name)
    }

    /// Reads a signal's current value.
    pub fn get_signal(&mut self, index: usize) -> Result<BitVector> {
        let sig = self.signals.get(index)?;
        let (width, base) = (sig.width, sig.reg_offset as usize);
        let mut value = BitVector::new(width);
        for blk in 0..sig.nblocks() {
            let offset = blk * 32;
            let bits = (width - offset).min(32);
            let word = self.reg.read(base + blk * 4);
            value.set_u64(offset, bits, u64::from(word))?;
        }
        Ok(value)
    }

    /// Writes an input signal; writes to output signals are ignored.
    pub fn set_signal(&mut self, index: usize, value: &BitVector) -> Result<()> {
        let sig = self.signals.get(index)?;
        if sig.output {
            return Ok(());
        }
        if value.width() != sig.width {
            return Err(ProtocolError::SignalWidthMismatch {
                name: sig.name.clone(),
                expected: sig.width,
                found: value.width(),
            }
            .into());
        }
        let (width, base, nblocks) = (sig.width, sig.reg_offset as usize, sig.nblocks());
        for blk in 0..nblocks {
            let offset = blk * 32;
            let bits = (width - offset).min(32);
            let word = value.get_u64(offset, bits)? as u32;
            self.reg.write(base + blk * 4, word);
        }
        Ok(())
    }

    /// Trigger objects.
    pub const fn triggers(&self) -> &ObjectTable<TriggerObject> {
        &self.triggers
    }

    /// Index of the trigger named `name`.
    pub fn lookup_trigger(&self, name: &str) -> Option<usize> {
        self.triggers.lookup(name)
    }

    /// Whether the trigger's status bit is set.
    pub fn is_trigger_active(&mut self, index: usize) -> Result<bool> {
        let trig = self.triggers.get(index)?;
        let (offset, bit) = (regdef::TRIG_STAT_START + trig.bank_offset(), trig.bit());
        Ok(self.reg.read(offset) & bit != 0)
    }

    /// Whether the trigger's enable bit is set.
    pub fn trigger_enabled(&mut self, index: usize) -> Result<bool> {
        let trig = self.triggers.get(index)?;
        let (offset, bit) = (regdef::TRIG_EN_START + trig.bank_offset(), trig.bit());
        Ok(self.reg.read(offset) & bit != 0)
    }

    /// Sets or clears the trigger's enable bit.
    pub fn set_trigger_enable(&mut self, index: usize, enable: bool) -> Result<()> {
        let trig = self.triggers.get(index)?;
        let (offset, bit) = (regdef::TRIG_EN_START + trig.bank_offset(), trig.bit());
        let name = trig.name.clone();
        let value = self.reg.read(offset);
        let value = if enable { value | bit } else { value & !bit };
        self.reg.write(offset, value);
        info!(trigger = %name, enabled = enable, "trigger enable changed");
        Ok(())
    }

    /// Indices of triggers whose status bit is set, optionally only those also enabled.
    pub fn active_triggers(&mut self, enabled_only: bool) -> Vec<usize> {
        let mut banks = [0u32; regdef::TRIG_REGS];
        for (i, bank) in banks.iter_mut().enumerate() {
            *bank = self.reg.read(regdef::TRIG_STAT_START + 4 * i);
            if enabled_only {
                *bank &= self.reg.read(regdef::TRIG_EN_START + 4 * i);
            }
        }
        self.triggers
            .iter()
            .filter(|t| banks[t.reg_index / 32] & t.bit() != 0)
            .map(|t| t.index)
            .collect()
    }

    /// AXI region objects.
    pub const fn axis(&self) -> &ObjectTable<AxiObject> {
        &self.axis
    }

    /// Index of the AXI region named `name`.
    pub fn lookup_axi(&self, name: &str) -> Option<usize> {
        self.axis.lookup(name)
    }

    /// Streams up to the region's assigned size from `reader` into an AXI region.
    ///
    /// The outer error reports an unknown region; the inner one the transfer itself.
    pub fn load_axi_mem(
        &mut self,
        index: usize,
        reader: &mut dyn Read,
    ) -> std::result::Result<io::Result<u64>, ProtocolError> {
        let axi = self.axis.get(index)?;
        let (offset, size) = (axi.assigned_offset, axi.assigned_size);
        Ok(self.mem.copy_from_reader(offset, size, reader))
    }

    /// Streams an AXI region's assigned span into `writer`.
    pub fn save_axi_mem(
        &mut self,
        index: usize,
        writer: &mut dyn Write,
    ) -> std::result::Result<io::Result<u64>, ProtocolError> {
        let axi = self.axis.get(index)?;
        let (offset, size) = (axi.assigned_offset, axi.assigned_size);
        Ok(self.mem.copy_to_writer(offset, size, writer))
    }

    /// Placement of the scan-chain DMA window in device memory.
    pub const fn scan_window(&self) -> Allocation {
        self.scan_window
    }

    /// Copies the scan window out of device memory.
    pub fn read_scan_window(&mut self) -> Vec<u8> {
        let mut buf = vec![0u8; self.scan_window.size as usize];
        self.mem.read(&mut buf, self.scan_window.offset);
        buf
    }

    /// Copies `blob` into the scan window; the remainder of the window is zeroed.
    pub fn write_scan_window(&mut self, blob: &[u8]) {
        let len = (blob.len() as u64).min(self.scan_window.size);
        self.mem.write(&blob[..len as usize], self.scan_window.offset);
        if len < self.scan_window.size {
            self.mem
                .fill(0, self.scan_window.offset + len, self.scan_window.size - len);
        }
    }

    /// Device memory transport.
    pub fn memory_mut(&mut self) -> &mut dyn DeviceMemory {
        self.mem.as_mut()
    }
}
