//! Hardware execution modes.

use std::fmt;

use super::regdef;
use crate::common::error::ProtocolError;

/// Execution mode reported by the fabric's mode-control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Stopped; the only mode in which scans and configuration are legal.
    Pause,
    /// Free-running for the programmed step count.
    Run,
    /// Streaming state across the scan chain.
    Scan,
}

impl Mode {
    /// Decodes the run/scan bits of `MODE_CTRL`.
    pub fn from_mode_ctrl(mode_ctrl: u32) -> Result<Self, ProtocolError> {
        let run = mode_ctrl & regdef::MODE_CTRL_RUN_MODE != 0;
        let scan = mode_ctrl & regdef::MODE_CTRL_SCAN_MODE != 0;
        match (run, scan) {
            (false, false) => Ok(Self::Pause),
            (true, false) => Ok(Self::Run),
            (false, true) => Ok(Self::Scan),
            (true, true) => Err(ProtocolError::UnknownMode(mode_ctrl)),
        }
    }

    /// Upper-case name as used in log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "PAUSE",
            Self::Run => "RUN",
            Self::Scan => "SCAN",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a scan operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    /// Load state from the DMA window into the fabric.
    In,
    /// Dump fabric state into the DMA window.
    Out,
}

impl ScanDirection {
    /// `SCAN_CTRL` value that starts a scan in this direction.
    pub const fn scan_ctrl(self) -> u32 {
        match self {
            Self::In => regdef::SCAN_CTRL_START | regdef::SCAN_CTRL_DIRECTION,
            Self::Out => regdef::SCAN_CTRL_START,
        }
    }
}
