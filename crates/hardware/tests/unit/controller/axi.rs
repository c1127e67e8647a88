//! # AXI Allocation Tests
//!
//! Largest-first power-of-two packing, remap register programming, capacity checks, and
//! streaming region contents.

use crate::common::builder::{SysInfoBuilder, sample_sysinfo};
use crate::common::harness::{DMA_BASE, TestContext};
use crate::common::mocks::transport::{MockMemory, MockRegisters};
use pretty_assertions::assert_eq;
use remu_core::Error;
use remu_core::common::error::{ConfigError, ProtocolError};
use remu_core::controller::{Allocation, Controller, allocate, regdef};
use rstest::rstest;
use std::io::Cursor;
use std::time::Duration;

/// Regions are packed largest first and rounded up to powers of two.
#[test]
fn largest_first_packing() {
    let plan = allocate(&[100, 4096, 10], 4096);
    assert_eq!(
        plan.regions,
        vec![
            Allocation {
                offset: 4096,
                size: 128
            },
            Allocation {
                offset: 0,
                size: 4096
            },
            Allocation {
                offset: 4224,
                size: 16
            },
        ]
    );
    assert_eq!(
        plan.scan_window,
        Allocation {
            offset: 8192,
            size: 4096
        }
    );
    assert_eq!(plan.required(), 12288);
}

/// Equal sizes keep their request order.
#[test]
fn ties_keep_request_order() {
    let plan = allocate(&[64, 64, 64], 0);
    let offsets: Vec<u64> = plan.regions.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0, 64, 128]);
}

#[rstest]
#[case(1, 1)]
#[case(3, 4)]
#[case(4096, 4096)]
#[case(4097, 8192)]
fn sizes_round_to_powers_of_two(#[case] requested: u64, #[case] assigned: u64) {
    let plan = allocate(&[requested], 0);
    assert_eq!(plan.regions[0].size, assigned);
    assert_eq!(plan.regions[0].mask(), assigned - 1);
}

/// Base and mask registers hold the fabric address and size of each region.
#[test]
fn remap_registers_are_programmed() {
    let ctx = TestContext::new(sample_sysinfo());
    let ctrl = ctx.controller();
    let state = ctx.fabric.state();
    let reg = |offset: usize| state.regs.get(&offset).copied().unwrap_or(0);

    for (name, base, mask) in [
        ("dram", DMA_BASE + 4096, 127u32),
        ("sram", DMA_BASE, 4095),
        ("rom", DMA_BASE + 4224, 15),
    ] {
        let axi = &ctrl.axis().iter().find(|a| a.name == name).unwrap();
        let off = axi.reg_offset as usize;
        assert_eq!(reg(off + regdef::axi::BASE_LO), base as u32, "{name}");
        assert_eq!(reg(off + regdef::axi::BASE_HI), 0, "{name}");
        assert_eq!(reg(off + regdef::axi::MASK_LO), mask, "{name}");
        assert_eq!(reg(off + regdef::axi::MASK_HI), 0, "{name}");
    }
    assert_eq!(reg(regdef::DMA_BASE), (DMA_BASE + 8192) as u32);
}

/// AXI regions are zeroed during initialization.
#[test]
fn regions_are_cleared() {
    let ctx = TestContext::new(sample_sysinfo());
    ctx.fabric.state().memory.fill(0xee);
    let _ctrl = ctx.controller();
    let state = ctx.fabric.state();
    assert!(state.memory[..4240].iter().all(|&b| b == 0));
}

/// An allocation that does not fit fails before any register is touched.
#[test]
fn insufficient_memory_writes_nothing() {
    let reg = MockRegisters::new();
    let mut mem = MockMemory::new();
    let _ = mem.expect_size().return_const(100u64);

    let err = Controller::new(
        &sample_sysinfo(),
        Box::new(mem),
        Box::new(reg),
        Duration::ZERO,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::InsufficientDeviceMemory {
            required: 12288,
            available: 100
        })
    ));
}

/// A scan window the 32-bit `DMA_BASE` register cannot address is refused before any write.
#[test]
fn scan_window_above_4gib_writes_nothing() {
    let reg = MockRegisters::new();
    let mut mem = MockMemory::new();
    let _ = mem.expect_size().return_const(1u64 << 20);
    let _ = mem.expect_dma_base().return_const(0xffff_f000u64);

    let err = Controller::new(
        &sample_sysinfo(),
        Box::new(mem),
        Box::new(reg),
        Duration::ZERO,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::ScanWindowOutOfReach {
            addr: 0x1_0000_1000
        })
    ));
}

/// Loading streams at most the assigned size; saving returns the whole assigned span.
#[test]
fn load_and_save_region() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    let dram = ctrl.lookup_axi("dram").unwrap();

    let image: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
    let loaded = ctrl
        .load_axi_mem(dram, &mut Cursor::new(&image))
        .unwrap()
        .unwrap();
    assert_eq!(loaded, 128);
    assert_eq!(&ctx.fabric.state().memory[4096..4224], &image[..128]);

    let mut saved = Vec::new();
    let n = ctrl.save_axi_mem(dram, &mut saved).unwrap().unwrap();
    assert_eq!(n, 128);
    assert_eq!(saved, image[..128].to_vec());
}

#[test]
fn short_image_stops_at_end_of_input() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    let sram = ctrl.lookup_axi("sram").unwrap();
    let n = ctrl
        .load_axi_mem(sram, &mut Cursor::new(vec![1u8; 10]))
        .unwrap()
        .unwrap();
    assert_eq!(n, 10);
}

#[test]
fn unknown_region_index() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    assert_eq!(
        ctrl.load_axi_mem(9, &mut Cursor::new(Vec::<u8>::new()))
            .map(|r| r.is_ok()),
        Err(ProtocolError::UnknownObject {
            kind: "axi",
            index: 9
        })
    );
}

/// A design without AXI ports still reserves a scan window.
#[test]
fn scan_only_design() {
    let sysinfo = SysInfoBuilder::new()
        .wire("top.r", 8)
        .scan_ff("top.r", 8, 0)
        .build();
    let ctx = TestContext::new(sysinfo);
    let ctrl = ctx.controller();
    assert_eq!(
        ctrl.scan_window(),
        Allocation {
            offset: 0,
            size: 4096
        }
    );
}
