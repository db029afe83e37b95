//! Error taxonomy for the virtual machine.
//!
//! [`VmError`] enumerates every failure kind the machine can produce.
//! [`VmFault`] wraps a kind with the execution context captured at the
//! moment of failure (program counter, opcode, instruction count, stack
//! depth) so hosts can both match programmatically on the kind and render
//! a useful diagnostic.

use stackvm_derive::Error;

/// Failure kinds surfaced by the VM, codec, and program builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Push would exceed the configured stack depth (operand or call stack).
    #[error("stack overflow")]
    StackOverflow,
    /// Pop or peek on an empty (or too shallow) stack.
    #[error("stack underflow")]
    StackUnderflow,
    /// Memory access outside `[0, size)`.
    #[error("invalid memory address {index}")]
    InvalidMemoryAddress { index: i64 },
    /// Store against a read-only memory.
    #[error("memory is read-only")]
    ReadOnlyMemory,
    /// Opcode byte in the standard range with no assigned instruction.
    #[error("invalid instruction: opcode {opcode}")]
    InvalidInstruction { opcode: u8 },
    /// Custom-range opcode with no registered handler.
    #[error("invalid opcode: {opcode} has no registered handler")]
    InvalidOpcode { opcode: u8 },
    /// Instruction budget exhausted.
    #[error("instruction limit exceeded ({limit})")]
    InstructionLimit { limit: u32 },
    /// Division or modulo with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
    /// Operand type not usable by the instruction.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Wall-clock deadline passed.
    #[error("execution timeout")]
    Timeout,
    /// Cancellation flag observed between instructions.
    #[error("execution cancelled")]
    Cancelled,
    /// Operand rejected while building a program.
    #[error("invalid operand: {reason}")]
    InvalidOperand { reason: String },
    /// Malformed binary program image.
    #[error("invalid program: {reason}")]
    InvalidProgram { reason: String },
    /// Label referenced but never defined.
    #[error("unresolved label: {label}")]
    UnresolvedLabel { label: String },
}

impl VmError {
    /// True for operand- or call-stack bound violations.
    pub fn is_stack_error(&self) -> bool {
        matches!(self, VmError::StackOverflow | VmError::StackUnderflow)
    }

    /// True for memory addressing or write-protection failures.
    pub fn is_memory_error(&self) -> bool {
        matches!(
            self,
            VmError::InvalidMemoryAddress { .. } | VmError::ReadOnlyMemory
        )
    }

    /// True for resource-budget failures (limit, timeout, cancellation).
    pub fn is_limit_error(&self) -> bool {
        matches!(
            self,
            VmError::InstructionLimit { .. } | VmError::Timeout | VmError::Cancelled
        )
    }
}

/// A [`VmError`] wrapped with the execution state observed when it was
/// raised. The stack depth is the depth at the moment of the error; for
/// operations that consume operands before detecting a fault this is the
/// post-consumption depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmFault {
    /// Underlying error kind, preserved for programmatic matching.
    pub kind: VmError,
    /// Program counter of the failing instruction.
    pub pc: usize,
    /// Opcode byte of the failing instruction.
    pub opcode: u8,
    /// Instructions executed up to and including the failing one.
    pub instruction_count: u32,
    /// Stack depth observed when the error was raised.
    pub stack_depth: usize,
    /// Optional host-facing note.
    pub message: Option<String>,
}

impl VmFault {
    /// Returns the underlying error kind.
    pub fn kind(&self) -> &VmError {
        &self.kind
    }
}

impl std::fmt::Display for VmFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VM fault at pc={} (opcode={}, instructions={}, stack={}): ",
            self.pc, self.opcode, self.instruction_count, self.stack_depth
        )?;
        if let Some(message) = &self.message {
            write!(f, "{message}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for VmFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let fault = VmFault {
            kind: VmError::DivisionByZero,
            pc: 2,
            opcode: 19,
            instruction_count: 3,
            stack_depth: 0,
            message: None,
        };
        let rendered = fault.to_string();
        assert!(rendered.contains("pc=2"));
        assert!(rendered.contains("opcode=19"));
        assert!(rendered.contains("division by zero"));
    }

    #[test]
    fn display_includes_optional_message() {
        let fault = VmFault {
            kind: VmError::Cancelled,
            pc: 0,
            opcode: 62,
            instruction_count: 1,
            stack_depth: 0,
            message: Some("host shutdown".to_string()),
        };
        assert!(fault.to_string().contains("host shutdown"));
    }

    #[test]
    fn classification_predicates() {
        assert!(VmError::StackOverflow.is_stack_error());
        assert!(VmError::StackUnderflow.is_stack_error());
        assert!(VmError::InvalidMemoryAddress { index: -1 }.is_memory_error());
        assert!(VmError::ReadOnlyMemory.is_memory_error());
        assert!(VmError::InstructionLimit { limit: 3 }.is_limit_error());
        assert!(VmError::Timeout.is_limit_error());
        assert!(VmError::Cancelled.is_limit_error());
        assert!(!VmError::DivisionByZero.is_stack_error());
        assert!(!VmError::DivisionByZero.is_limit_error());
    }

    #[test]
    fn kind_survives_wrapping() {
        let fault = VmFault {
            kind: VmError::InvalidMemoryAddress { index: 300 },
            pc: 7,
            opcode: 48,
            instruction_count: 8,
            stack_depth: 1,
            message: None,
        };
        assert_eq!(
            fault.kind(),
            &VmError::InvalidMemoryAddress { index: 300 }
        );
    }
}
