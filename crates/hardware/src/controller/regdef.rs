//! Control register map of the emulation fabric.
//!
//! Offsets are byte offsets into the register transport; every register is 32 bits wide.

/// Mode control: run/scan request bits and busy status.
pub const MODE_CTRL: usize = 0x000;
/// Number of ticks to execute on the next RUN.
pub const STEP_CNT: usize = 0x004;
/// Tick counter, low half.
pub const TICK_CNT_LO: usize = 0x008;
/// Tick counter, high half.
pub const TICK_CNT_HI: usize = 0x00c;
/// Scan control: start/running and direction.
pub const SCAN_CTRL: usize = 0x010;
/// Fabric address of the scan-chain DMA window.
pub const DMA_BASE: usize = 0x014;

/// First trigger status register.
pub const TRIG_STAT_START: usize = 0x100;
/// One past the last trigger status register.
pub const TRIG_STAT_END: usize = 0x110;
/// First trigger enable register.
pub const TRIG_EN_START: usize = 0x110;
/// One past the last trigger enable register.
pub const TRIG_EN_END: usize = 0x120;

/// Number of 32-bit registers in each trigger bank.
pub const TRIG_REGS: usize = (TRIG_STAT_END - TRIG_STAT_START) / 4;
/// Number of trigger bits addressable through the banks.
pub const MAX_TRIGGERS: usize = TRIG_REGS * 32;

/// `MODE_CTRL`: hardware is (or is requested to be) running.
pub const MODE_CTRL_RUN_MODE: u32 = 1 << 0;
/// `MODE_CTRL`: hardware is in scan mode.
pub const MODE_CTRL_SCAN_MODE: u32 = 1 << 1;
/// `MODE_CTRL`: pause has been requested but the fabric has not settled.
pub const MODE_CTRL_PAUSE_BUSY: u32 = 1 << 2;
/// `MODE_CTRL`: at least one sub-model has a transaction in flight.
pub const MODE_CTRL_MODEL_BUSY: u32 = 1 << 3;

/// `SCAN_CTRL`: reads as 1 while a scan is in progress.
pub const SCAN_CTRL_RUNNING: u32 = 1 << 0;
/// `SCAN_CTRL`: write 1 to start a scan.
pub const SCAN_CTRL_START: u32 = 1 << 0;
/// `SCAN_CTRL`: set for scan-in (load state into the fabric), clear for scan-out.
pub const SCAN_CTRL_DIRECTION: u32 = 1 << 1;

/// Offsets of an AXI port's remap registers, relative to the port's `reg_offset`.
pub mod axi {
    /// Region base, low half.
    pub const BASE_LO: usize = 0x0;
    /// Region base, high half.
    pub const BASE_HI: usize = 0x4;
    /// Address mask, low half.
    pub const MASK_LO: usize = 0x8;
    /// Address mask, high half.
    pub const MASK_HI: usize = 0xc;
}
