//! # Shared Test Infrastructure

/// Test context owning a simulated fabric and a checkpoint directory.
pub mod harness;
/// Simulated fabric and mock transports.
pub mod mocks;
