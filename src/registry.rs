//! Custom instruction registry.
//!
//! Hosts extend the instruction set by binding opcodes in `128..=255` to
//! [`InstructionHandler`] implementations. The registry is consulted on
//! every custom-opcode dispatch, so it is backed by a concurrent map:
//! many readers proceed in parallel while registration is serialized.

use crate::errors::VmError;
use crate::isa::CUSTOM_OPCODE_BASE;
use crate::vm::ExecContext;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use stackvm_derive::Error;

/// Errors produced by registry mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Opcodes below 128 belong to the standard instruction set.
    #[error("cannot register opcode {opcode}: reserved for built-in instructions")]
    Reserved { opcode: u8 },
    /// A handler is already bound; it is never silently replaced.
    #[error("opcode {opcode} already registered")]
    AlreadyRegistered { opcode: u8 },
    /// Unregister of an unbound opcode.
    #[error("opcode {opcode} not registered")]
    NotRegistered { opcode: u8 },
}

/// A host-defined instruction.
///
/// Handlers run synchronously inside the interpreter loop and interact
/// with the machine only through the [`ExecContext`] capability surface.
pub trait InstructionHandler: Send + Sync {
    /// Executes the instruction. An error aborts the surrounding execution
    /// and surfaces to the host wrapped in fault context.
    fn execute(&self, ctx: &mut ExecContext<'_>, operand: i32) -> Result<(), VmError>;

    /// Mnemonic used by the assembler and disassembler.
    fn name(&self) -> &str;
}

/// Thread-safe opcode-to-handler mapping for the custom range.
#[derive(Default)]
pub struct InstructionRegistry {
    handlers: DashMap<u8, Arc<dyn InstructionHandler>>,
}

impl InstructionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to a custom opcode. Fails without mutation if the
    /// opcode is reserved (< 128) or already bound.
    pub fn register(
        &self,
        opcode: u8,
        handler: Arc<dyn InstructionHandler>,
    ) -> Result<(), RegistryError> {
        if opcode < CUSTOM_OPCODE_BASE {
            return Err(RegistryError::Reserved { opcode });
        }
        match self.handlers.entry(opcode) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered { opcode }),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Removes a binding.
    pub fn unregister(&self, opcode: u8) -> Result<(), RegistryError> {
        self.handlers
            .remove(&opcode)
            .map(|_| ())
            .ok_or(RegistryError::NotRegistered { opcode })
    }

    /// Retrieves the handler bound to an opcode.
    pub fn get(&self, opcode: u8) -> Option<Arc<dyn InstructionHandler>> {
        self.handlers.get(&opcode).map(|entry| entry.value().clone())
    }

    /// All bound opcodes, in ascending order.
    pub fn list(&self) -> Vec<u8> {
        let mut opcodes: Vec<u8> = self.handlers.iter().map(|entry| *entry.key()).collect();
        opcodes.sort_unstable();
        opcodes
    }

    /// Opcode-to-mnemonic mapping, for the assembler and disassembler.
    pub fn names(&self) -> HashMap<u8, String> {
        self.handlers
            .iter()
            .map(|entry| (*entry.key(), entry.value().name().to_string()))
            .collect()
    }

    /// Number of bound opcodes.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
