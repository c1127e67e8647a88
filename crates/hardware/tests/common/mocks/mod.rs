//! # Mock Transports

/// Behavioural model of the emulation fabric.
pub mod fabric;
/// `mockall` register and memory transports.
pub mod transport;
