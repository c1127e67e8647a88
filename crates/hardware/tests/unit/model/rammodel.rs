//! # RAM Model Tests
//!
//! Burst sequencing, write stalls, burst validation, and queue persistence.

use crate::common::builder::SysInfoBuilder;
use pretty_assertions::assert_eq;
use remu_core::BitVector;
use remu_core::common::error::{AxiChannel, AxiError, ConfigError};
use remu_core::model::{AChannel, RamModel, RamModelConfig, Schedule, WChannel, burst};
use rstest::rstest;

const MEM: u64 = 4096;

fn model() -> RamModel {
    RamModel::new(RamModelConfig {
        addr_width: 32,
        data_width: 64,
        id_width: 2,
        mem_size: MEM,
    })
    .unwrap()
}

fn read(addr: u64, id: u16, len: u8, burst: u8) -> AChannel {
    AChannel {
        addr,
        id,
        len,
        size: 3,
        burst,
        write: false,
    }
}

fn write(addr: u64, id: u16, len: u8) -> AChannel {
    AChannel {
        write: true,
        ..read(addr, id, len, burst::INCR)
    }
}

fn beat(data: u64, strb: u64, last: bool) -> WChannel {
    WChannel {
        data: BitVector::from_u64(64, data),
        strb: BitVector::from_u64(8, strb),
        last,
    }
}

/// A four-beat write produces exactly one response, and only once all beats are queued.
#[test]
fn write_burst_waits_for_all_beats() {
    let mut m = model();
    m.a_push(write(0x100, 1, 3));
    for i in 0..3 {
        m.w_push(beat(0x1111_1111_1111_1111 * (i + 1), 0xff, false));
    }

    assert_eq!(m.schedule().unwrap(), Schedule::Stalled);
    assert_eq!(m.pending_b(1).unwrap(), 0);
    assert_eq!(m.b_front(1).unwrap().id, 1);
    assert_eq!(m.pending_a(), 1);

    m.w_push(beat(0x4444_4444_4444_4444, 0x0f, true));
    assert_eq!(m.b_front(1).unwrap().id, 1);
    assert_eq!(m.pending_b(1).unwrap(), 1);
    assert_eq!(m.pending_a(), 0);
    assert_eq!(m.pending_w(), 0);

    assert_eq!(&m.memory()[0x100..0x108], &[0x11; 8]);
    assert_eq!(&m.memory()[0x110..0x118], &[0x33; 8]);
    assert_eq!(&m.memory()[0x118..0x120], &[0x44, 0x44, 0x44, 0x44, 0, 0, 0, 0]);

    assert_eq!(m.b_pop(1).unwrap().id, 1);
    assert_eq!(
        m.b_pop(1),
        Err(AxiError::EmptyQueue {
            channel: AxiChannel::B,
            id: 1
        })
    );
}

/// A four-beat read yields four R beats with `last` only on the final one.
#[test]
fn read_burst_marks_last_beat() {
    let mut m = model();
    for (i, byte) in m.memory_mut()[0x200..0x220].iter_mut().enumerate() {
        *byte = i as u8;
    }
    m.a_push(read(0x200, 2, 3, burst::INCR));

    let head = m.r_front(2).unwrap();
    assert_eq!(head.data.to_u64(), 0x0706_0504_0302_0100);
    assert_eq!(m.pending_r(2).unwrap(), 4);

    let lasts: Vec<bool> = (0..4).map(|_| m.r_pop(2).unwrap().last).collect();
    assert_eq!(lasts, vec![false, false, false, true]);
    assert!(m.r_pop(2).is_err());
}

/// An empty R queue yields a zeroed placeholder beat.
#[test]
fn idle_front_is_placeholder() {
    let mut m = model();
    let r = m.r_front(3).unwrap();
    assert!(r.data.is_zero());
    assert_eq!((r.id, r.last), (3, false));
    assert_eq!(m.schedule().unwrap(), Schedule::Idle);
}

/// Wrapping bursts return to the wrap boundary after crossing it.
#[test]
fn wrap_burst_sequence() {
    let mut m = model();
    for (i, byte) in m.memory_mut()[0x100..0x120].iter_mut().enumerate() {
        *byte = (i / 8) as u8;
    }
    m.a_push(read(0x118, 0, 3, burst::WRAP));
    assert_eq!(m.schedule().unwrap(), Schedule::Serviced);

    let firsts: Vec<u64> = (0..4)
        .map(|_| m.r_pop(0).unwrap().data.to_u64() & 0xff)
        .collect();
    assert_eq!(firsts, vec![3, 0, 1, 2]);
}

/// Narrow write beats take their data and strobes from the lanes selected by the address.
#[test]
fn narrow_write_uses_address_lanes() {
    let mut m = model();
    m.a_push(AChannel {
        size: 2,
        ..write(0x4, 0, 0)
    });
    m.w_push(beat(0xddcc_bbaa_0000_0000, 0xf0, true));
    assert_eq!(m.schedule().unwrap(), Schedule::Serviced);
    assert_eq!(&m.memory()[0x0..0x8], &[0, 0, 0, 0, 0xaa, 0xbb, 0xcc, 0xdd]);

    m.a_push(AChannel {
        size: 0,
        ..write(0x7, 0, 0)
    });
    m.w_push(beat(0x1200_0000_0000_00ff, 0xff, true));
    assert_eq!(m.schedule().unwrap(), Schedule::Serviced);
    assert_eq!(&m.memory()[0x6..0x9], &[0xcc, 0x12, 0]);
}

/// A narrow strobe outside the addressed lanes leaves memory untouched.
#[test]
fn narrow_write_ignores_other_lanes() {
    let mut m = model();
    m.a_push(AChannel {
        size: 2,
        ..write(0x4, 0, 0)
    });
    m.w_push(beat(0xffff_ffff_ffff_ffff, 0x0f, true));
    assert_eq!(m.schedule().unwrap(), Schedule::Serviced);
    assert!(m.memory().iter().all(|&b| b == 0));
}

/// Narrow read beats place their bytes in the lane of each beat address.
#[test]
fn narrow_read_burst_uses_address_lanes() {
    let mut m = model();
    m.memory_mut()[0x100..0x108].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
    m.a_push(AChannel {
        size: 2,
        ..read(0x100, 1, 1, burst::INCR)
    });
    assert_eq!(m.schedule().unwrap(), Schedule::Serviced);
    assert_eq!(m.r_pop(1).unwrap().data.to_u64(), 0x0403_0201);
    assert_eq!(m.r_pop(1).unwrap().data.to_u64(), 0x0807_0605_0000_0000);
}

/// Invalid bursts are rejected, stay queued, and leave memory untouched.
#[rstest]
#[case(read(0x100, 0, 2, burst::WRAP), AxiError::InvalidWrapLength(3))]
#[case(read(0x100, 0, 0, burst::FIXED), AxiError::UnsupportedBurst(burst::FIXED))]
#[case(
    AChannel { size: 4, ..read(0x100, 0, 0, burst::INCR) },
    AxiError::BurstSizeTooLarge { size: 16, data_bytes: 8 }
)]
#[case(
    read(MEM - 8, 0, 1, burst::INCR),
    AxiError::AddressOutOfRange { addr: MEM, mem_size: MEM }
)]
fn invalid_bursts(#[case] a: AChannel, #[case] expected: AxiError) {
    let mut m = model();
    m.a_push(a);
    assert_eq!(m.schedule(), Err(expected));
    assert_eq!(m.pending_a(), 1);
    assert_eq!(m.pending_r(0).unwrap(), 0);
    assert!(m.memory().iter().all(|&b| b == 0));
}

#[test]
fn rejected_write_consumes_no_beats() {
    let mut m = model();
    m.a_push(AChannel {
        burst: burst::WRAP,
        ..write(0x100, 0, 2)
    });
    for _ in 0..3 {
        m.w_push(beat(u64::MAX, 0xff, false));
    }
    assert!(m.schedule().is_err());
    assert_eq!(m.pending_w(), 3);
    assert!(m.memory().iter().all(|&b| b == 0));
}

#[test]
fn id_out_of_range() {
    let mut m = model();
    assert_eq!(
        m.pending_b(4),
        Err(AxiError::IdOutOfRange { id: 4, id_width: 2 })
    );
    assert!(m.r_front(4).is_err());
}

/// Saving mid-transaction and restoring reproduces every queue exactly.
#[test]
fn queue_state_round_trip() {
    let mut m = model();
    m.a_push(write(0x0, 1, 0));
    m.w_push(beat(0xaa, 0x01, true));
    m.a_push(read(0x0, 2, 1, burst::INCR));
    assert_eq!(m.schedule().unwrap(), Schedule::Serviced);
    assert_eq!(m.schedule().unwrap(), Schedule::Serviced);
    m.a_push(write(0x40, 3, 1));
    m.w_push(beat(0x55, 0x03, false));
    assert_eq!(m.schedule().unwrap(), Schedule::Stalled);

    let mut saved = Vec::new();
    m.save_state(&mut saved).unwrap();

    let mut restored = model();
    restored.load_state(&mut saved.as_slice()).unwrap();

    assert_eq!(restored.pending_a(), 1);
    assert_eq!(restored.pending_w(), 1);
    assert_eq!(restored.pending_b(1).unwrap(), 1);
    assert_eq!(restored.pending_r(2).unwrap(), 2);
    for _ in 0..2 {
        assert_eq!(restored.r_pop(2).unwrap(), m.r_pop(2).unwrap());
    }

    restored.w_push(beat(0x66, 0x03, true));
    assert_eq!(restored.schedule().unwrap(), Schedule::Serviced);
    assert_eq!(&restored.memory()[0x40..0x42], &[0x55, 0x00]);
    assert_eq!(&restored.memory()[0x48..0x4a], &[0x66, 0x00]);
}

/// A truncated state blob is an error and leaves the queues empty.
#[test]
fn truncated_state_resets_queues() {
    let mut m = model();
    m.a_push(read(0, 0, 0, burst::INCR));
    m.a_push(read(8, 0, 0, burst::INCR));
    let mut saved = Vec::new();
    m.save_state(&mut saved).unwrap();
    saved.truncate(10);

    let mut restored = model();
    restored.a_push(read(0, 1, 0, burst::INCR));
    assert!(restored.load_state(&mut saved.as_slice()).is_err());
    assert_eq!(restored.pending_a(), 0);
}

/// Geometry comes from the model's integer parameters; `pf_count` counts 4 KiB pages.
#[test]
fn config_from_model_info() {
    let sysinfo = SysInfoBuilder::new()
        .rammodel("dram", 64, 4, 1 << 20)
        .model("scratch", "rammodel")
        .build();
    let cfg = RamModelConfig::from_model_info(&sysinfo.model[0]).unwrap();
    assert_eq!(cfg.data_bytes(), 8);
    assert_eq!(cfg.id_count(), 16);
    assert_eq!(cfg.mem_size, 1 << 20);

    assert!(RamModelConfig::from_model_info(&sysinfo.model[1]).is_err());

    let mut paged = sysinfo.model[0].clone();
    let _ = paged.int_params.remove("mem_size");
    let _ = paged.int_params.insert("pf_count".into(), 3);
    assert_eq!(
        RamModelConfig::from_model_info(&paged).unwrap().mem_size,
        3 * 4096
    );
}

/// Negative or oversized parameters are configuration errors, not allocations.
#[rstest]
#[case("mem_size", -1)]
#[case("data_width", -64)]
#[case("id_width", 1 << 40)]
fn config_rejects_out_of_range_parameters(#[case] key: &str, #[case] value: i64) {
    let mut info = SysInfoBuilder::new()
        .rammodel("dram", 64, 2, 4096)
        .build()
        .model
        .remove(0);
    let _ = info.int_params.insert(key.to_string(), value);
    assert!(matches!(
        RamModelConfig::from_model_info(&info),
        Err(ConfigError::InvalidModelParameter(_))
    ));
}

#[rstest]
#[case(12, 2)]
#[case(64, 17)]
fn invalid_geometry(#[case] data_width: u32, #[case] id_width: u32) {
    assert!(
        RamModel::new(RamModelConfig {
            addr_width: 32,
            data_width,
            id_width,
            mem_size: MEM,
        })
        .is_err()
    );
}
