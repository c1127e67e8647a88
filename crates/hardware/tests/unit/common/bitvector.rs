//! # Bit Vector Tests
//!
//! Range get/set across word boundaries, single-bit access, text rendering and
//! parsing, and signed index translation in arrays.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use remu_core::common::error::BitVectorError;
use remu_core::{BitVector, BitVectorArray};
use rstest::rstest;

fn patterned(width: usize, seed: u64) -> BitVector {
    let mut bv = BitVector::new(width);
    let mut x = seed | 1;
    for i in 0..width {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        bv.set_bit(i, x & 1 != 0).unwrap();
    }
    bv
}

proptest! {
    /// Writing a range and reading it back returns exactly the written bits,
    /// and every bit outside the range is untouched.
    #[test]
    fn set_value_then_get_value_round_trips(
        width in 1usize..300,
        a in 0usize..300,
        b in 0usize..300,
        seed in any::<u64>(),
        vseed in any::<u64>(),
    ) {
        let offset = a % width;
        let len = b % (width - offset) + 1;
        let before = patterned(width, seed);
        let value = patterned(len, vseed);

        let mut bv = before.clone();
        bv.set_value(offset, &value).unwrap();

        prop_assert_eq!(bv.get_value(offset, len).unwrap(), value);
        for i in (0..offset).chain(offset + len..width) {
            prop_assert_eq!(bv.get_bit(i).unwrap(), before.get_bit(i).unwrap());
        }
    }

    /// `set_bit`/`get_bit` round-trip for every in-range index.
    #[test]
    fn single_bits_round_trip(width in 1usize..200, i in 0usize..200, v in any::<bool>()) {
        let i = i % width;
        let mut bv = BitVector::new(width);
        bv.set_bit(i, v).unwrap();
        prop_assert_eq!(bv.get_bit(i).unwrap(), v);
        prop_assert_eq!(bv.is_zero(), !v);
    }
}

/// Bit accesses at or past the width fail instead of truncating.
#[rstest]
#[case(1)]
#[case(64)]
#[case(65)]
#[case(130)]
fn bit_access_past_width_fails(#[case] width: usize) {
    let mut bv = BitVector::new(width);
    assert!(bv.get_bit(width).is_err());
    assert!(bv.set_bit(width, true).is_err());
}

/// Range accesses that overrun the vector report the offending range.
#[test]
fn range_past_width_fails() {
    let bv = BitVector::new(70);
    assert_eq!(
        bv.get_value(60, 11),
        Err(BitVectorError::RangeOutOfBounds {
            offset: 60,
            width: 11,
            capacity: 70
        })
    );
    let mut bv = bv;
    assert!(bv.set_value(65, &BitVector::new(6)).is_err());
    assert!(bv.set_value(64, &BitVector::new(6)).is_ok());
}

/// Unaligned extraction crossing a 64-bit word boundary.
#[test]
fn get_u64_crosses_word_boundary() {
    let mut bv = BitVector::new(128);
    bv.set_u64(60, 8, 0xa5).unwrap();
    assert_eq!(bv.get_u64(60, 8).unwrap(), 0xa5);
    assert_eq!(bv.words(), &[0x5000_0000_0000_0000, 0xa]);
}

/// Equality compares width as well as contents.
#[test]
fn equality_includes_width() {
    assert_eq!(BitVector::from_u64(8, 3), BitVector::from_u64(8, 3));
    assert_ne!(BitVector::from_u64(8, 3), BitVector::from_u64(9, 3));
    assert_eq!(BitVector::from_u64(4, 0xff), BitVector::from_u64(4, 0xf));
}

/// Binary and hex rendering are most-significant first and width-padded.
#[test]
fn text_rendering() {
    let bv = BitVector::from_u64(10, 0x2a5);
    assert_eq!(bv.to_binary_string(), "1010100101");
    assert_eq!(bv.to_hex_string(), "2a5");
    assert_eq!(format!("{bv}"), "10'h2a5");
    assert_eq!(format!("{bv:#x}"), "0x2a5");
    assert_eq!(format!("{bv:#b}"), "0b1010100101");
}

/// Hex, binary, and decimal parsing; values wider than the target fail.
#[rstest]
#[case(12, "0xabc", 0xabc)]
#[case(12, "0b1010_0101", 0xa5)]
#[case(12, "4095", 4095)]
#[case(8, "0x00ff", 0xff)]
fn parse_accepts_radices(#[case] width: usize, #[case] text: &str, #[case] value: u64) {
    assert_eq!(BitVector::parse(width, text).unwrap().to_u64(), value);
}

#[test]
fn parse_rejects_overflow_and_bad_digits() {
    assert!(matches!(
        BitVector::parse(8, "0x1ff"),
        Err(BitVectorError::WidthMismatch { expected: 8, .. })
    ));
    assert!(BitVector::parse(8, "256").is_err());
    assert_eq!(
        BitVector::parse(8, "0xfg"),
        Err(BitVectorError::InvalidDigit('g'))
    );
    let err = BitVector::parse(12, "12a").unwrap_err();
    assert_eq!(err, BitVectorError::InvalidDigit('a'));
    assert_eq!(err.to_string(), "invalid digit 'a'");
}

/// Wide hex values land in the right words.
#[test]
fn parse_wide_hex() {
    let bv = BitVector::parse(72, "0xab_0000_0000_0000_0001").unwrap();
    assert_eq!(bv.words(), &[1, 0xab]);
}

/// Little-endian bytes round-trip and ignore bytes beyond the width.
#[test]
fn le_bytes_conversion() {
    let bv = BitVector::from_le_bytes(12, &[0x34, 0xf2, 0xff]);
    assert_eq!(bv.to_u64(), 0x234);
    assert_eq!(bv.to_le_bytes(), vec![0x34, 0x02]);
}

/// Serde form preserves width and contents.
#[test]
fn serde_round_trip() {
    let bv = patterned(150, 7);
    let json = serde_json::to_string(&bv).unwrap();
    let back: BitVector = serde_json::from_str(&json).unwrap();
    assert_eq!(back, bv);
}

/// Array indices are translated through `start_offset` before scaling by width.
#[rstest]
#[case(0)]
#[case(-4)]
#[case(100)]
fn array_index_translation(#[case] start: i64) {
    let mut arr = BitVectorArray::new(12, 8, start);
    for i in 0..8 {
        arr.set(start + i, &BitVector::from_u64(12, 0x100 + i as u64))
            .unwrap();
    }
    for i in 0..8 {
        assert_eq!(arr.get(start + i).unwrap().to_u64(), 0x100 + i as u64);
    }
    assert_eq!(arr.data().get_u64(12, 12).unwrap(), 0x101);
}

/// Indices outside `[start_offset, start_offset + depth)` are rejected.
#[test]
fn array_bounds() {
    let mut arr = BitVectorArray::new(4, 4, 10);
    assert_eq!(
        arr.get(9),
        Err(BitVectorError::IndexOutOfRange {
            index: 9,
            start: 10,
            depth: 4
        })
    );
    assert!(arr.get(14).is_err());
    assert!(arr.get(13).is_ok());
    assert!(arr.set(14, &BitVector::new(4)).is_err());
}

/// Elements must be stored with exactly the element width.
#[test]
fn array_width_mismatch() {
    let mut arr = BitVectorArray::new(4, 4, 0);
    assert_eq!(
        arr.set(0, &BitVector::new(5)),
        Err(BitVectorError::WidthMismatch {
            expected: 4,
            found: 5
        })
    );
}
