/// AXI4 burst servicing and queue persistence.
pub mod rammodel;
