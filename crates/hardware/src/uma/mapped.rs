//! Memory-mapped transports.
//!
//! This module maps a window of a file into the host address space with `mmap` and exposes it
//! through the transport traits. It provides:
//! 1. **`MappedRegion`:** The raw mapping, bounds-checked byte access, and volatile 32-bit access.
//!    Out-of-range or misaligned accesses are returned as [`TransportError`]; the trait adapters
//!    log and drop them.
//! 2. **`MappedMemory`:** A `DeviceMemory` over a region plus the fabric-side DMA base.
//! 3. **`MappedRegisters`:** A `RegisterBus` over a region.
//!
//! `/dev/mem` windows must start on a page boundary; shared-memory files are created and sized
//! on demand so a co-simulation peer can attach to the same file.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;

use tracing::{debug, error};

use super::traits::{DeviceMemory, RegisterBus};
use crate::common::error::{ConfigError, TransportError};

/// A shared, writable mapping of `[offset, offset + len)` of a file.
pub struct MappedRegion {
    ptr: *mut u8,
    len: usize,
    _file: File,
}

impl MappedRegion {
    /// Maps a window of a device file such as `/dev/mem`.
    ///
    /// `base` must be a multiple of the system page size. With `sync`, the file is opened
    /// `O_SYNC` so accesses bypass the host cache.
    pub fn open_device(path: &Path, base: u64, len: usize, sync: bool) -> Result<Self, ConfigError> {
        let page = page_size();
        if base % page != 0 {
            return Err(ConfigError::InvalidTransport(format!(
                "base {base:#x} is not a multiple of the page size {page:#x}"
            )));
        }
        let mut opts = OpenOptions::new();
        let _ = opts.read(true).write(true);
        if sync {
            let _ = opts.custom_flags(libc::O_SYNC);
        }
        let file = opts.open(path).map_err(|source| ConfigError::Transport {
            path: path.to_path_buf(),
            source,
        })?;
        Self::map(file, path, base, len)
    }

    /// Maps a window of a shared-memory file, creating and extending it if necessary.
    pub fn open_shared(path: &Path, offset: u64, len: usize) -> Result<Self, ConfigError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| ConfigError::Transport {
                path: path.to_path_buf(),
                source,
            })?;
        let needed = offset + len as u64;
        let current = file
            .metadata()
            .map_err(|source| ConfigError::Transport {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if current < needed {
            file.set_len(needed).map_err(|source| ConfigError::Transport {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Self::map(file, path, offset, len)
    }

    fn map(file: File, path: &Path, offset: u64, len: usize) -> Result<Self, ConfigError> {
        if len == 0 {
            return Err(ConfigError::InvalidTransport(format!(
                "zero-length mapping of {}",
                path.display()
            )));
        }
        // SAFETY: the fd is valid for the lifetime of `file`, which the region owns. The result
        // is checked against MAP_FAILED before use.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset as libc::off_t,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(ConfigError::Transport {
                path: path.to_path_buf(),
                source: std::io::Error::last_os_error(),
            });
        }
        debug!(path = %path.display(), offset, len, "mapped transport window");
        Ok(Self {
            ptr: raw.cast::<u8>(),
            len,
            _file: file,
        })
    }

    /// Size of the mapping in bytes.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty (never true for a live region).
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    const fn check(&self, offset: usize, len: usize) -> Result<(), TransportError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(TransportError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    const fn check_reg(&self, offset: usize) -> Result<(), TransportError> {
        if offset % 4 != 0 {
            return Err(TransportError::Misaligned(offset));
        }
        self.check(offset, 4)
    }

    /// Copies bytes out of the mapping.
    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<(), TransportError> {
        self.check(offset, buf.len())?;
        // SAFETY: bounds checked above; the mapping is live while `self` exists.
        unsafe { ptr::copy_nonoverlapping(self.ptr.add(offset), buf.as_mut_ptr(), buf.len()) }
        Ok(())
    }

    /// Copies bytes into the mapping.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), TransportError> {
        self.check(offset, data.len())?;
        // SAFETY: bounds checked above; `&mut self` gives exclusive host-side access.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len()) }
        Ok(())
    }

    /// Fills bytes of the mapping.
    pub fn fill_bytes(
        &mut self,
        offset: usize,
        len: usize,
        byte: u8,
    ) -> Result<(), TransportError> {
        self.check(offset, len)?;
        // SAFETY: bounds checked above.
        unsafe { ptr::write_bytes(self.ptr.add(offset), byte, len) }
        Ok(())
    }

    /// Volatile 32-bit load; `offset` must be 4-byte aligned.
    pub fn read_u32(&self, offset: usize) -> Result<u32, TransportError> {
        self.check_reg(offset)?;
        // SAFETY: aligned and in bounds; mmap returns page-aligned memory.
        Ok(unsafe { ptr::read_volatile(self.ptr.add(offset).cast::<u32>()) })
    }

    /// Volatile 32-bit store; `offset` must be 4-byte aligned.
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), TransportError> {
        self.check_reg(offset)?;
        // SAFETY: aligned and in bounds; mmap returns page-aligned memory.
        unsafe { ptr::write_volatile(self.ptr.add(offset).cast::<u32>(), value) }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` came from a successful mmap and are unmapped exactly once.
        unsafe {
            let _ = libc::munmap(self.ptr.cast::<libc::c_void>(), self.len);
        }
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 { page as u64 } else { 4096 }
}

/// Device memory backed by a mapped region.
#[derive(Debug)]
pub struct MappedMemory {
    region: MappedRegion,
    dma_base: u64,
}

impl MappedMemory {
    /// Wraps a region whose first byte the fabric addresses as `dma_base`.
    pub const fn new(region: MappedRegion, dma_base: u64) -> Self {
        Self { region, dma_base }
    }
}

impl DeviceMemory for MappedMemory {
    fn read(&mut self, buf: &mut [u8], offset: u64) {
        if let Err(e) = self.region.read_bytes(offset as usize, buf) {
            error!(%e, "device memory read dropped");
            buf.fill(0);
        }
    }

    fn write(&mut self, buf: &[u8], offset: u64) {
        if let Err(e) = self.region.write_bytes(offset as usize, buf) {
            error!(%e, "device memory write dropped");
        }
    }

    fn fill(&mut self, byte: u8, offset: u64, len: u64) {
        if let Err(e) = self.region.fill_bytes(offset as usize, len as usize, byte) {
            error!(%e, "device memory fill dropped");
        }
    }

    fn size(&self) -> u64 {
        self.region.len() as u64
    }

    fn dma_base(&self) -> u64 {
        self.dma_base
    }
}

/// Control registers backed by a mapped region.
#[derive(Debug)]
pub struct MappedRegisters {
    region: MappedRegion,
}

impl MappedRegisters {
    /// Wraps a region holding the register file.
    pub const fn new(region: MappedRegion) -> Self {
        Self { region }
    }
}

impl RegisterBus for MappedRegisters {
    fn read(&mut self, offset: usize) -> u32 {
        self.region.read_u32(offset).unwrap_or_else(|e| {
            error!(%e, "register read dropped");
            0
        })
    }

    fn write(&mut self, offset: usize, value: u32) {
        if let Err(e) = self.region.write_u32(offset, value) {
            error!(%e, "register write dropped");
        }
    }
}
