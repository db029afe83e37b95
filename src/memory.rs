//! VM memory abstraction.
//!
//! The engine never owns memory; it borrows a [`Memory`] implementation
//! for the duration of one execution. Hosts can supply custom backends;
//! [`SimpleMemory`] is the standard fixed-size, Nil-initialized store.

use crate::errors::VmError;
use crate::value::Value;

/// Indexed value storage used by `LOAD`/`STORE` and their dynamic forms.
///
/// Any index outside `[0, size)` yields `InvalidMemoryAddress` without
/// mutating the store.
pub trait Memory {
    /// Retrieves the value at the given cell.
    fn load(&self, index: usize) -> Result<Value, VmError>;

    /// Stores a value into the given cell.
    fn store(&mut self, index: usize, value: Value) -> Result<(), VmError>;

    /// Number of addressable cells.
    fn size(&self) -> usize;

    /// True if the memory rejects writes.
    fn is_read_only(&self) -> bool {
        false
    }
}

/// Fixed-size writable memory backed by a vector.
///
/// Not safe for concurrent mutation; concurrent executions need separate
/// instances.
#[derive(Debug, Clone)]
pub struct SimpleMemory {
    cells: Vec<Value>,
}

impl SimpleMemory {
    /// Creates a memory with `size` cells, all initialized to Nil.
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![Value::Nil; size],
        }
    }

    /// Returns a snapshot of all cells.
    pub fn values(&self) -> Vec<Value> {
        self.cells.clone()
    }

    /// Bulk-installs cell contents. The slice length must match the memory
    /// size exactly; mismatched lengths leave the memory untouched.
    pub fn set_values(&mut self, values: &[Value]) {
        if values.len() == self.cells.len() {
            self.cells.clone_from_slice(values);
        }
    }

    /// Clears every cell back to Nil.
    pub fn reset(&mut self) {
        self.cells.fill(Value::Nil);
    }

    /// Freezes this memory into a read-only view.
    pub fn freeze(self) -> FrozenMemory {
        FrozenMemory { inner: self }
    }
}

impl Memory for SimpleMemory {
    fn load(&self, index: usize) -> Result<Value, VmError> {
        self.cells
            .get(index)
            .cloned()
            .ok_or(VmError::InvalidMemoryAddress {
                index: index as i64,
            })
    }

    fn store(&mut self, index: usize, value: Value) -> Result<(), VmError> {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(VmError::InvalidMemoryAddress {
                index: index as i64,
            }),
        }
    }

    fn size(&self) -> usize {
        self.cells.len()
    }
}

/// Read-only wrapper over a [`SimpleMemory`]. Loads pass through; every
/// store yields `ReadOnlyMemory`.
#[derive(Debug, Clone)]
pub struct FrozenMemory {
    inner: SimpleMemory,
}

impl Memory for FrozenMemory {
    fn load(&self, index: usize) -> Result<Value, VmError> {
        self.inner.load(index)
    }

    fn store(&mut self, _index: usize, _value: Value) -> Result<(), VmError> {
        Err(VmError::ReadOnlyMemory)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
