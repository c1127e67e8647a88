//! Device memory allocation for AXI regions and the scan-chain DMA window.
//!
//! Regions are packed largest-first, each rounded up to a power of two so the fabric can remap
//! addresses with a simple base/mask pair. The scan-chain window follows the last region at the
//! next page boundary.

use crate::common::error::ConfigError;

/// Alignment of the scan-chain DMA window.
pub const SCAN_WINDOW_ALIGN: u64 = 4096;

/// A span of device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Allocation {
    /// Offset from the start of device memory.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

impl Allocation {
    /// One past the last byte.
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Remap mask programmed for a power-of-two region.
    pub const fn mask(&self) -> u64 {
        self.size.saturating_sub(1)
    }
}

/// Placement of every AXI region plus the scan window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    /// One entry per requested region, in request order.
    pub regions: Vec<Allocation>,
    /// Scan-chain DMA window.
    pub scan_window: Allocation,
}

impl AllocationPlan {
    /// Total device memory the plan occupies.
    pub fn required(&self) -> u64 {
        let axi_end = self.regions.iter().map(Allocation::end).max().unwrap_or(0);
        axi_end.max(self.scan_window.end())
    }

    /// Fails if the plan does not fit in `available` bytes.
    pub fn check_capacity(&self, available: u64) -> Result<(), ConfigError> {
        let required = self.required();
        if required > available {
            return Err(ConfigError::InsufficientDeviceMemory {
                required,
                available,
            });
        }
        Ok(())
    }
}

const fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// Plans device memory for regions of the requested `sizes` and a scan window of `scan_bytes`.
///
/// Regions are placed in descending size order (ties keep request order); each is rounded up to
/// the next power of two.
pub fn allocate(sizes: &[u64], scan_bytes: u64) -> AllocationPlan {
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));

    let mut regions = vec![Allocation::default(); sizes.len()];
    let mut next = 0u64;
    for idx in order {
        let size = sizes[idx].next_power_of_two();
        regions[idx] = Allocation { offset: next, size };
        next += size;
    }

    let scan_window = Allocation {
        offset: align_up(next, SCAN_WINDOW_ALIGN),
        size: align_up(scan_bytes, SCAN_WINDOW_ALIGN),
    };

    AllocationPlan {
        regions,
        scan_window,
    }
}
