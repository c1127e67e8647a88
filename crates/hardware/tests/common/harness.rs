use crate::common::mocks::fabric::SimFabric;
use remu_core::checkpoint::ScanLayout;
use remu_core::config::{DriverOptions, SysInfo};
use remu_core::{Controller, Driver};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Device memory size given to the simulated fabric.
pub const DEVICE_MEM: usize = 16 * 1024;
/// Fabric address of device memory.
pub const DMA_BASE: u64 = 0x8000_0000;

/// A simulated fabric plus a scratch directory for checkpoints.
pub struct TestContext {
    pub fabric: SimFabric,
    pub sysinfo: SysInfo,
    pub dir: TempDir,
}

impl TestContext {
    pub fn new(sysinfo: SysInfo) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let scan_len = ScanLayout::new(&sysinfo).unwrap().encoded_len();
        Self {
            fabric: SimFabric::new(DEVICE_MEM, DMA_BASE, scan_len),
            sysinfo,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn ckpt_dir(&self) -> PathBuf {
        self.dir.path().join("ckpt")
    }

    /// Record-mode options with a zero poll interval.
    pub fn options(&self) -> DriverOptions {
        let mut options = DriverOptions::new(self.ckpt_dir());
        options.poll_interval_ms = 0;
        options
    }

    pub fn controller(&self) -> Controller {
        Controller::new(
            &self.sysinfo,
            self.fabric.memory(),
            self.fabric.registers(),
            Duration::ZERO,
        )
        .unwrap()
    }

    pub fn driver(&self, options: DriverOptions) -> Driver {
        Driver::new(&self.sysinfo, self.controller(), options).unwrap()
    }
}
