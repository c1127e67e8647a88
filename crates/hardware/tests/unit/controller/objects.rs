//! # Signal and Trigger Tests
//!
//! Multi-register signals, output signals, and the trigger status/enable banks.

use crate::common::builder::{SysInfoBuilder, sample_sysinfo};
use crate::common::harness::TestContext;
use pretty_assertions::assert_eq;
use remu_core::common::error::{ConfigError, ProtocolError};
use remu_core::{BitVector, Error};
use remu_core::controller::regdef;

/// Input signals are zeroed at init; output signals are never written.
#[test]
fn inputs_are_zeroed_at_init() {
    let ctx = TestContext::new(sample_sysinfo());
    let _ctrl = ctx.controller();
    let offsets: Vec<usize> = ctx
        .fabric
        .state()
        .signal_log
        .iter()
        .filter(|(_, off, _)| *off < 0x2000)
        .map(|(_, off, _)| *off)
        .collect();
    assert_eq!(offsets, vec![0x1000, 0x1010, 0x1014]);
}

/// A 40-bit signal spans two registers, low word first.
#[test]
fn wide_signal_spans_registers() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    let data = ctrl.lookup_signal("data").unwrap();

    let value = BitVector::from_u64(40, 0xab_1234_5678);
    ctrl.set_signal(data, &value).unwrap();
    {
        let state = ctx.fabric.state();
        assert_eq!(state.regs[&0x1010], 0x1234_5678);
        assert_eq!(state.regs[&0x1014], 0xab);
    }
    assert_eq!(ctrl.get_signal(data).unwrap(), value);
}

#[test]
fn output_signal_writes_are_ignored() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    let status = ctrl.lookup_signal("status").unwrap();

    ctrl.set_signal(status, &BitVector::from_u64(8, 0x5a)).unwrap();
    assert!(!ctx.fabric.state().regs.contains_key(&0x1020));

    let _ = ctx.fabric.state().regs.insert(0x1020, 0x3c);
    assert_eq!(ctrl.get_signal(status).unwrap().to_u64(), 0x3c);
}

#[test]
fn signal_width_must_match() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    let rst = ctrl.lookup_signal("rst").unwrap();
    assert!(matches!(
        ctrl.set_signal(rst, &BitVector::from_u64(2, 1)),
        Err(Error::Protocol(ProtocolError::SignalWidthMismatch {
            expected: 1,
            found: 2,
            ..
        }))
    ));
    assert!(matches!(
        ctrl.get_signal(7),
        Err(Error::Protocol(ProtocolError::UnknownObject {
            kind: "signal",
            ..
        }))
    ));
}

/// Every trigger is enabled at init, in the bank its bit index selects.
#[test]
fn triggers_enabled_at_init() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    {
        let state = ctx.fabric.state();
        assert_eq!(state.regs[&regdef::TRIG_EN_START], 1 << 3);
        assert_eq!(state.regs[&(regdef::TRIG_EN_START + 4)], 1 << 1);
    }
    assert!(ctrl.trigger_enabled(0).unwrap());
    assert!(ctrl.trigger_enabled(1).unwrap());
}

#[test]
fn active_triggers_respect_enable() {
    let ctx = TestContext::new(sample_sysinfo());
    let mut ctrl = ctx.controller();
    let done = ctrl.lookup_trigger("done").unwrap();
    let error = ctrl.lookup_trigger("error").unwrap();
    {
        let mut state = ctx.fabric.state();
        let _ = state.regs.insert(regdef::TRIG_STAT_START, 1 << 3);
        let _ = state.regs.insert(regdef::TRIG_STAT_START + 4, 1 << 1);
    }

    assert!(ctrl.is_trigger_active(done).unwrap());
    assert_eq!(ctrl.active_triggers(true), vec![done, error]);

    ctrl.set_trigger_enable(error, false).unwrap();
    assert!(!ctrl.trigger_enabled(error).unwrap());
    assert!(ctrl.trigger_enabled(done).unwrap());
    assert_eq!(ctrl.active_triggers(true), vec![done]);
    assert_eq!(ctrl.active_triggers(false), vec![done, error]);
}

#[test]
fn trigger_index_beyond_banks() {
    let sysinfo = SysInfoBuilder::new().trigger("late", 128).build();
    let ctx = TestContext::new(sysinfo);
    let err = remu_core::Controller::new(
        &ctx.sysinfo,
        ctx.fabric.memory(),
        ctx.fabric.registers(),
        std::time::Duration::ZERO,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::TriggerIndexOutOfRange { index: 128, .. })
    ));
    assert!(ctx.fabric.state().reg_writes.is_empty());
}
