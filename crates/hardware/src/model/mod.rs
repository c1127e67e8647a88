//! Software models attached to the emulated design.
//!
//! Only the AXI4 RAM model is implemented; other model types in the system description are
//! reported and ignored by the driver.

/// AXI4 burst transaction engine.
pub mod rammodel;

pub use rammodel::{
    AChannel, BChannel, RChannel, RamModel, RamModelConfig, Schedule, WChannel, burst,
};

/// Model type name of [`RamModel`] in the system description.
pub const RAMMODEL_TYPE: &str = "rammodel";
