//! Runtime objects bound from the system description.
//!
//! Signals, triggers, and AXI ports are numbered in declaration order. The index is the stable
//! handle used by the driver, the event queue, and the signal trace.

use crate::common::error::ProtocolError;

/// Common behaviour of runtime objects held in an [`ObjectTable`].
pub trait RuntimeObject {
    /// Object kind used in error messages.
    const KIND: &'static str;
    /// Flattened hierarchical name.
    fn name(&self) -> &str;
}

/// A host-visible signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalObject {
    /// Declaration index.
    pub index: usize,
    /// Flattened name.
    pub name: String,
    /// Width in bits.
    pub width: usize,
    /// Driven by the design; writes from the host are ignored.
    pub output: bool,
    /// Byte offset of the first 32-bit register.
    pub reg_offset: u32,
}

impl SignalObject {
    /// Number of 32-bit registers spanned by the signal.
    pub const fn nblocks(&self) -> usize {
        self.width.div_ceil(32)
    }
}

impl RuntimeObject for SignalObject {
    const KIND: &'static str = "signal";
    fn name(&self) -> &str {
        &self.name
    }
}

/// A trigger bit in the status/enable banks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerObject {
    /// Declaration index.
    pub index: usize,
    /// Flattened name.
    pub name: String,
    /// Bit index across the trigger banks.
    pub reg_index: usize,
}

impl TriggerObject {
    /// Byte offset of the 32-bit bank register holding this trigger, relative to the bank start.
    pub const fn bank_offset(&self) -> usize {
        (self.reg_index / 32) * 4
    }

    /// Bit mask of this trigger within its bank register.
    pub const fn bit(&self) -> u32 {
        1 << (self.reg_index % 32)
    }
}

impl RuntimeObject for TriggerObject {
    const KIND: &'static str = "trigger";
    fn name(&self) -> &str {
        &self.name
    }
}

/// An AXI memory region and its place in device memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiObject {
    /// Declaration index.
    pub index: usize,
    /// Flattened name.
    pub name: String,
    /// Requested size in bytes.
    pub size: u64,
    /// Byte offset of the remap registers.
    pub reg_offset: u32,
    /// Offset of the region within device memory.
    pub assigned_offset: u64,
    /// Power-of-two size reserved for the region.
    pub assigned_size: u64,
}

impl RuntimeObject for AxiObject {
    const KIND: &'static str = "axi";
    fn name(&self) -> &str {
        &self.name
    }
}

/// Objects of one kind, indexed by declaration order.
#[derive(Debug, Clone)]
pub struct ObjectTable<T> {
    objects: Vec<T>,
}

impl<T: RuntimeObject> ObjectTable<T> {
    /// Wraps objects already numbered by position.
    pub const fn new(objects: Vec<T>) -> Self {
        Self { objects }
    }

    /// Finds an object by flattened name.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.name() == name)
    }

    /// Returns the object at `index`.
    pub fn get(&self, index: usize) -> Result<&T, ProtocolError> {
        self.objects.get(index).ok_or(ProtocolError::UnknownObject {
            kind: T::KIND,
            index,
        })
    }

    /// Iterates objects in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.objects.iter()
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<'a, T: RuntimeObject> IntoIterator for &'a ObjectTable<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
