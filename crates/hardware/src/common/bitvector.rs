//! Arbitrary-width bit vectors.
//!
//! Every piece of emulated hardware state (wires, RAM contents, signal values, AXI data beats)
//! is carried as a [`BitVector`]. It provides:
//! 1. **Storage:** Values up to 64 bits live inline; wider values use a boxed word slice.
//! 2. **Range access:** `get_value`/`set_value` move arbitrary, unaligned bit ranges using a
//!    sliding 64-bit window that crosses word boundaries transparently.
//! 3. **Rendering:** Binary and hexadecimal text, plus parsing from `0x`/`0b`/decimal strings.
//!
//! [`BitVectorArray`] partitions one vector into fixed-width elements addressed by a signed
//! index range, matching hardware memories whose first address is non-zero.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::BitVectorError;

const WORD_BITS: usize = 64;

/// Mask with the low `n` bits set; `n` may be 64.
#[inline]
const fn low_mask(n: usize) -> u64 {
    if n >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Number of 64-bit words needed to hold `width` bits (at least one).
#[inline]
const fn words_for(width: usize) -> usize {
    if width == 0 {
        1
    } else {
        width.div_ceil(WORD_BITS)
    }
}

/// Reads `n` (1..=64) bits starting at bit `offset` of `src`.
#[inline]
fn read_bits(src: &[u64], offset: usize, n: usize) -> u64 {
    let word = offset / WORD_BITS;
    let shift = offset % WORD_BITS;
    let mut value = src[word] >> shift;
    if shift != 0 && shift + n > WORD_BITS {
        value |= src[word + 1] << (WORD_BITS - shift);
    }
    value & low_mask(n)
}

/// Writes the low `n` (1..=64) bits of `value` at bit `offset` of `dst`.
#[inline]
fn write_bits(dst: &mut [u64], offset: usize, n: usize, value: u64) {
    let word = offset / WORD_BITS;
    let shift = offset % WORD_BITS;
    let mask = low_mask(n);
    let value = value & mask;
    dst[word] = (dst[word] & !(mask << shift)) | (value << shift);
    if shift != 0 && shift + n > WORD_BITS {
        let spill = shift + n - WORD_BITS;
        let hi_mask = low_mask(spill);
        dst[word + 1] = (dst[word + 1] & !hi_mask) | ((value >> (WORD_BITS - shift)) & hi_mask);
    }
}

/// Sliding window over a source bit range, yielding chunks of up to 64 bits.
///
/// Each chunk is `(bits, count)`; the final chunk may be shorter than a word.
struct BitsReader<'a> {
    src: &'a [u64],
    pos: usize,
    remaining: usize,
}

impl<'a> BitsReader<'a> {
    const fn new(src: &'a [u64], offset: usize, width: usize) -> Self {
        Self {
            src,
            pos: offset,
            remaining: width,
        }
    }
}

impl Iterator for BitsReader<'_> {
    type Item = (u64, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let n = self.remaining.min(WORD_BITS);
        let bits = read_bits(self.src, self.pos, n);
        self.pos += n;
        self.remaining -= n;
        Some((bits, n))
    }
}

/// Copies `width` bits from `src[src_off..]` into `dst[dst_off..]`.
fn copy_bits(dst: &mut [u64], dst_off: usize, src: &[u64], src_off: usize, width: usize) {
    let mut at = dst_off;
    for (bits, n) in BitsReader::new(src, src_off, width) {
        write_bits(dst, at, n, bits);
        at += n;
    }
}

#[derive(Clone)]
enum Storage {
    Inline(u64),
    Heap(Box<[u64]>),
}

/// Fixed-width bit vector addressed LSB-first.
///
/// Bits above `width` in the top word are always zero, so equality compares words directly.
#[derive(Clone)]
pub struct BitVector {
    width: usize,
    storage: Storage,
}

impl BitVector {
    /// Creates a zeroed vector of `width` bits.
    pub fn new(width: usize) -> Self {
        let storage = if width <= WORD_BITS {
            Storage::Inline(0)
        } else {
            Storage::Heap(vec![0u64; words_for(width)].into_boxed_slice())
        };
        Self { width, storage }
    }

    /// Creates a vector holding the low `width` bits of `value`.
    pub fn from_u64(width: usize, value: u64) -> Self {
        let mut bv = Self::new(width);
        let n = width.min(WORD_BITS);
        bv.words_mut()[0] = value & low_mask(n);
        bv
    }

    /// Creates a vector from little-endian 64-bit words; excess input bits are discarded.
    pub fn from_words(width: usize, words: &[u64]) -> Self {
        let mut bv = Self::new(width);
        let avail = (words.len() * WORD_BITS).min(width);
        if avail > 0 {
            copy_bits(bv.words_mut(), 0, words, 0, avail);
        }
        bv
    }

    /// Creates a vector from little-endian bytes; missing bytes read as zero.
    pub fn from_le_bytes(width: usize, bytes: &[u8]) -> Self {
        let mut bv = Self::new(width);
        let nbytes = width.div_ceil(8).min(bytes.len());
        let words = bv.words_mut();
        for (i, &b) in bytes[..nbytes].iter().enumerate() {
            words[i / 8] |= u64::from(b) << ((i % 8) * 8);
        }
        bv.clear_unused();
        bv
    }

    /// Width in bits.
    #[inline]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Backing words, least significant first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        match &self.storage {
            Storage::Inline(w) => std::slice::from_ref(w),
            Storage::Heap(words) => words,
        }
    }

    #[inline]
    fn words_mut(&mut self) -> &mut [u64] {
        match &mut self.storage {
            Storage::Inline(w) => std::slice::from_mut(w),
            Storage::Heap(words) => words,
        }
    }

    fn clear_unused(&mut self) {
        let width = self.width;
        let words = self.words_mut();
        let last = words.len() - 1;
        let used = width - last * WORD_BITS;
        words[last] &= low_mask(used);
    }

    fn check_range(&self, offset: usize, width: usize) -> Result<(), BitVectorError> {
        match offset.checked_add(width) {
            Some(end) if end <= self.width => Ok(()),
            _ => Err(BitVectorError::RangeOutOfBounds {
                offset,
                width,
                capacity: self.width,
            }),
        }
    }

    /// Returns bit `index`.
    pub fn get_bit(&self, index: usize) -> Result<bool, BitVectorError> {
        self.check_range(index, 1)?;
        Ok((self.words()[index / WORD_BITS] >> (index % WORD_BITS)) & 1 != 0)
    }

    /// Sets bit `index` to `value`.
    pub fn set_bit(&mut self, index: usize, value: bool) -> Result<(), BitVectorError> {
        self.check_range(index, 1)?;
        let word = &mut self.words_mut()[index / WORD_BITS];
        let mask = 1u64 << (index % WORD_BITS);
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        Ok(())
    }

    /// Extracts `[offset, offset + width)` as a new vector of `width` bits.
    pub fn get_value(&self, offset: usize, width: usize) -> Result<Self, BitVectorError> {
        self.check_range(offset, width)?;
        let mut out = Self::new(width);
        if width > 0 {
            copy_bits(out.words_mut(), 0, self.words(), offset, width);
        }
        Ok(out)
    }

    /// Overwrites `[offset, offset + value.width())` with `value`; other bits are untouched.
    pub fn set_value(&mut self, offset: usize, value: &Self) -> Result<(), BitVectorError> {
        self.check_range(offset, value.width)?;
        if value.width > 0 {
            copy_bits(self.words_mut(), offset, value.words(), 0, value.width);
        }
        Ok(())
    }

    /// Extracts up to 64 bits at `offset` as an integer.
    pub fn get_u64(&self, offset: usize, width: usize) -> Result<u64, BitVectorError> {
        if width > WORD_BITS {
            return Err(BitVectorError::WidthMismatch {
                expected: WORD_BITS,
                found: width,
            });
        }
        self.check_range(offset, width)?;
        Ok(if width == 0 {
            0
        } else {
            read_bits(self.words(), offset, width)
        })
    }

    /// Writes the low `width` (at most 64) bits of `value` at `offset`.
    pub fn set_u64(&mut self, offset: usize, width: usize, value: u64) -> Result<(), BitVectorError> {
        if width > WORD_BITS {
            return Err(BitVectorError::WidthMismatch {
                expected: WORD_BITS,
                found: width,
            });
        }
        self.check_range(offset, width)?;
        if width > 0 {
            write_bits(self.words_mut(), offset, width, value);
        }
        Ok(())
    }

    /// Low 64 bits of the value.
    #[inline]
    pub fn to_u64(&self) -> u64 {
        self.words()[0]
    }

    /// Whether every bit is zero.
    pub fn is_zero(&self) -> bool {
        self.words().iter().all(|&w| w == 0)
    }

    /// Zeroes every bit.
    pub fn clear(&mut self) {
        self.words_mut().fill(0);
    }

    /// Little-endian bytes, `ceil(width / 8)` long.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let nbytes = self.width.div_ceil(8);
        self.words()
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .take(nbytes)
            .collect()
    }

    /// Binary text, most significant bit first, exactly `width` digits.
    pub fn to_binary_string(&self) -> String {
        (0..self.width)
            .rev()
            .map(|i| {
                if (self.words()[i / WORD_BITS] >> (i % WORD_BITS)) & 1 != 0 {
                    '1'
                } else {
                    '0'
                }
            })
            .collect()
    }

    /// Hexadecimal text, most significant nibble first, `ceil(width / 4)` digits.
    pub fn to_hex_string(&self) -> String {
        let digits = self.width.div_ceil(4).max(1);
        let words = self.words();
        (0..digits)
            .rev()
            .map(|d| {
                let bit = d * 4;
                let nibble = (words[bit / WORD_BITS] >> (bit % WORD_BITS)) & 0xf;
                char::from_digit(nibble as u32, 16).unwrap_or('0')
            })
            .collect()
    }

    /// Parses `text` into a vector of `width` bits.
    ///
    /// Accepts `0x`-prefixed hex, `0b`-prefixed binary, or unprefixed decimal (up to 64 bits).
    /// Underscores are ignored. Fails if a set bit lies at or above `width`.
    pub fn parse(width: usize, text: &str) -> Result<Self, BitVectorError> {
        let cleaned: String = text.trim().chars().filter(|&c| c != '_').collect();
        let (radix_bits, digits) = if let Some(hex) = cleaned
            .strip_prefix("0x")
            .or_else(|| cleaned.strip_prefix("0X"))
        {
            (4, hex)
        } else if let Some(bin) = cleaned
            .strip_prefix("0b")
            .or_else(|| cleaned.strip_prefix("0B"))
        {
            (1, bin)
        } else {
            let value = parse_decimal(&cleaned)?;
            let needed = (WORD_BITS - value.leading_zeros() as usize).max(1);
            if value != 0 && needed > width {
                return Err(BitVectorError::WidthMismatch {
                    expected: width,
                    found: needed,
                });
            }
            return Ok(Self::from_u64(width, value));
        };

        let mut scratch = vec![0u64; (digits.len() * radix_bits).div_ceil(WORD_BITS).max(1)];
        for (pos, c) in digits.chars().rev().enumerate() {
            let v = c
                .to_digit(1 << radix_bits)
                .ok_or(BitVectorError::InvalidDigit(c))?;
            write_bits(&mut scratch, pos * radix_bits, radix_bits, u64::from(v));
        }
        let top = scratch
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map_or(0, |(i, w)| i * WORD_BITS + (WORD_BITS - w.leading_zeros() as usize));
        if top > width {
            return Err(BitVectorError::WidthMismatch {
                expected: width,
                found: top,
            });
        }
        Ok(Self::from_words(width, &scratch))
    }
}

fn parse_decimal(text: &str) -> Result<u64, BitVectorError> {
    if let Some(bad) = text.chars().find(|c| !c.is_ascii_digit()) {
        return Err(BitVectorError::InvalidDigit(bad));
    }
    text.parse::<u64>()
        .map_err(|_| BitVectorError::InvalidDigit(text.chars().next().unwrap_or(' ')))
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.words() == other.words()
    }
}

impl Eq for BitVector {}

impl Default for BitVector {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitVector({}'h{})", self.width, self.to_hex_string())
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'h{}", self.width, self.to_hex_string())
    }
}

impl fmt::LowerHex for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(&self.to_hex_string())
    }
}

impl fmt::Binary for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0b")?;
        }
        f.write_str(&self.to_binary_string())
    }
}

#[derive(Serialize, Deserialize)]
struct BitVectorRepr {
    width: usize,
    words: Vec<u64>,
}

impl Serialize for BitVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BitVectorRepr {
            width: self.width,
            words: self.words().to_vec(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BitVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = BitVectorRepr::deserialize(deserializer)?;
        Ok(Self::from_words(repr.width, &repr.words))
    }
}

/// A [`BitVector`] partitioned into `depth` elements of `width` bits.
///
/// Valid indices are `[start_offset, start_offset + depth)`; element `i` occupies bits
/// `[(i - start_offset) * width, (i - start_offset + 1) * width)` of the flattened storage.
#[derive(Clone, PartialEq, Eq)]
pub struct BitVectorArray {
    width: usize,
    depth: u64,
    start_offset: i64,
    data: BitVector,
}

impl BitVectorArray {
    /// Creates a zeroed array.
    pub fn new(width: usize, depth: u64, start_offset: i64) -> Self {
        Self {
            width,
            depth,
            start_offset,
            data: BitVector::new(width * depth as usize),
        }
    }

    /// Element width in bits.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of elements.
    pub const fn depth(&self) -> u64 {
        self.depth
    }

    /// First valid index.
    pub const fn start_offset(&self) -> i64 {
        self.start_offset
    }

    /// Flattened storage, element 0 in the low bits.
    pub const fn data(&self) -> &BitVector {
        &self.data
    }

    /// Mutable flattened storage.
    pub const fn data_mut(&mut self) -> &mut BitVector {
        &mut self.data
    }

    fn bit_offset(&self, index: i64) -> Result<usize, BitVectorError> {
        let rel = index
            .checked_sub(self.start_offset)
            .filter(|rel| *rel >= 0 && (*rel as u64) < self.depth)
            .ok_or(BitVectorError::IndexOutOfRange {
                index,
                start: self.start_offset,
                depth: self.depth,
            })?;
        Ok(rel as usize * self.width)
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: i64) -> Result<BitVector, BitVectorError> {
        let off = self.bit_offset(index)?;
        self.data.get_value(off, self.width)
    }

    /// Stores `value` at `index`; `value` must be exactly one element wide.
    pub fn set(&mut self, index: i64, value: &BitVector) -> Result<(), BitVectorError> {
        if value.width() != self.width {
            return Err(BitVectorError::WidthMismatch {
                expected: self.width,
                found: value.width(),
            });
        }
        let off = self.bit_offset(index)?;
        self.data.set_value(off, value)
    }
}

impl fmt::Debug for BitVectorArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitVectorArray")
            .field("width", &self.width)
            .field("depth", &self.depth)
            .field("start_offset", &self.start_offset)
            .finish_non_exhaustive()
    }
}
