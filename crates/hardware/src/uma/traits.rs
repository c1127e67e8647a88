//! Transport capability traits.
//!
//! This module defines the two contracts every transport backend implements. It provides:
//! 1. **`RegisterBus`:** 32-bit reads and writes at byte offsets into the control register file.
//! 2. **`DeviceMemory`:** Bulk byte access, fill, geometry, and streaming copies for the
//!    device memory that backs AXI regions and the scan-chain DMA window.
//!
//! The controller is written against these traits only, so any backend (mapped memory, shared
//! memory, a simulated fabric in tests) can drive it.

use std::io::{self, Read, Write};

/// Chunk size for streaming copies between device memory and files (4 MiB).
pub const STREAM_CHUNK: usize = 4 * 1024 * 1024;

/// Control register file of the fabric.
pub trait RegisterBus {
    /// Reads the 32-bit register at byte `offset`.
    fn read(&mut self, offset: usize) -> u32;
    /// Writes the 32-bit register at byte `offset`.
    fn write(&mut self, offset: usize, value: u32);
}

/// Device memory shared between the host and the fabric.
pub trait DeviceMemory {
    /// Copies `buf.len()` bytes starting at `offset` into `buf`.
    fn read(&mut self, buf: &mut [u8], offset: u64);
    /// Copies `buf` into device memory starting at `offset`.
    fn write(&mut self, buf: &[u8], offset: u64);
    /// Sets `len` bytes starting at `offset` to `byte`.
    fn fill(&mut self, byte: u8, offset: u64, len: u64);
    /// Total size in bytes.
    fn size(&self) -> u64;
    /// Base address of this memory as seen by the fabric's DMA engine.
    fn dma_base(&self) -> u64;

    /// Streams up to `len` bytes from `reader` into device memory at `offset`.
    ///
    /// Stops early at end of input. Returns the number of bytes transferred.
    fn copy_from_reader(&mut self, offset: u64, len: u64, reader: &mut dyn Read) -> io::Result<u64> {
        let mut buf = vec![0u8; STREAM_CHUNK.min(len as usize)];
        let mut done = 0u64;
        while done < len {
            let want = ((len - done) as usize).min(buf.len());
            let n = match reader.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.write(&buf[..n], offset + done);
            done += n as u64;
        }
        Ok(done)
    }

    /// Streams `len` bytes of device memory at `offset` into `writer`.
    fn copy_to_writer(&mut self, offset: u64, len: u64, writer: &mut dyn Write) -> io::Result<u64> {
        let mut buf = vec![0u8; STREAM_CHUNK.min(len as usize)];
        let mut done = 0u64;
        while done < len {
            let n = ((len - done) as usize).min(buf.len());
            self.read(&mut buf[..n], offset + done);
            writer.write_all(&buf[..n])?;
            done += n as u64;
        }
        Ok(done)
    }
}
