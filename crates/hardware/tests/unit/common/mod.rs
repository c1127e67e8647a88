/// Bit vector and bit vector array behaviour.
pub mod bitvector;
