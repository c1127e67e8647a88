//! User-mode access to the fabric's registers and device memory.
//!
//! This module provides the following:
//! 1. **Traits:** `RegisterBus` and `DeviceMemory`, the contracts the controller is written against.
//! 2. **Mapped transports:** `mmap`-based backends for `/dev/mem` and shared-memory files.
//! 3. **Construction:** `open_transports`, building both transports from a `PlatInfo`.

/// `mmap`-backed register and memory transports.
pub mod mapped;
/// Transport capability traits.
pub mod traits;

use tracing::info;

pub use mapped::{MappedMemory, MappedRegion, MappedRegisters};
pub use traits::{DeviceMemory, RegisterBus, STREAM_CHUNK};

use crate::common::error::ConfigError;
use crate::config::{PlatInfo, TransportConfig};

fn open_region(cfg: &TransportConfig) -> Result<(MappedRegion, u64), ConfigError> {
    match cfg {
        TransportConfig::Devmem {
            base,
            size,
            dma_base,
            device,
            sync,
        } => {
            let region = MappedRegion::open_device(device, *base, *size as usize, *sync)?;
            Ok((region, dma_base.unwrap_or(*base)))
        }
        TransportConfig::Shm {
            path,
            size,
            offset,
            dma_base,
        } => {
            let region = MappedRegion::open_shared(path, *offset, *size as usize)?;
            Ok((region, *dma_base))
        }
    }
}

/// Opens the device memory and register transports described by `plat`.
pub fn open_transports(
    plat: &PlatInfo,
) -> Result<(Box<dyn DeviceMemory>, Box<dyn RegisterBus>), ConfigError> {
    let (mem_region, dma_base) = open_region(&plat.mem)?;
    let (reg_region, _) = open_region(&plat.reg)?;
    info!(
        mem_size = mem_region.len(),
        dma_base = %format_args!("{dma_base:#x}"),
        reg_size = reg_region.len(),
        "transports opened"
    );
    Ok((
        Box::new(MappedMemory::new(mem_region, dma_base)),
        Box::new(MappedRegisters::new(reg_region)),
    ))
}
