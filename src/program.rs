//! Bytecode program representation and wire serialization.
//!
//! A [`Program`] is an immutable instruction sequence plus optional debug
//! information (an address-to-label symbol table) and optional
//! [`ProgramMetadata`]. Programs are pure data and safe to share across
//! concurrent executions.
//!
//! # Wire format
//!
//! `to_bytes`/`from_bytes` implement the portable binary form: a 4-byte
//! little-endian instruction count followed by one 5-byte record per
//! instruction (opcode byte, then 4-byte little-endian signed operand).
//! There is no header; the symbol table and metadata are intentionally
//! not part of the wire form and are discarded by the codec.

use crate::encoding::{Decode, Encode};
use crate::errors::VmError;
use crate::isa::Instruction;
use std::collections::HashMap;

/// Size in bytes of one encoded instruction record.
const RECORD_SIZE: usize = 5;
/// Size in bytes of the instruction-count header.
const COUNT_SIZE: usize = 4;

/// Descriptive program information. Never interpreted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramMetadata {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    /// Creation time as seconds since the Unix epoch (0 = unset).
    pub created: u64,
}

/// An executable instruction sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
    symbols: HashMap<usize, String>,
    metadata: ProgramMetadata,
}

impl Program {
    /// Creates a program from an instruction vector, without debug info.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            symbols: HashMap::new(),
            metadata: ProgramMetadata::default(),
        }
    }

    /// Creates a program with metadata attached.
    pub fn with_metadata(instructions: Vec<Instruction>, metadata: ProgramMetadata) -> Self {
        Self {
            instructions,
            symbols: HashMap::new(),
            metadata,
        }
    }

    /// The instruction sequence.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Label bound at the given instruction address, if any.
    pub fn symbol(&self, address: usize) -> Option<&str> {
        self.symbols.get(&address).map(String::as_str)
    }

    /// The full address-to-label table.
    pub fn symbols(&self) -> &HashMap<usize, String> {
        &self.symbols
    }

    /// Installs the symbol table (used by the builder).
    pub(crate) fn set_symbols(&mut self, symbols: HashMap<usize, String>) {
        self.symbols = symbols;
    }

    /// Attaches a single debug symbol.
    pub fn add_symbol(&mut self, address: usize, label: impl Into<String>) {
        self.symbols.insert(address, label.into());
    }

    pub fn metadata(&self) -> &ProgramMetadata {
        &self.metadata
    }

    /// Encodes the program to its portable binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COUNT_SIZE + self.instructions.len() * RECORD_SIZE);
        (self.instructions.len() as u32).encode(&mut out);
        for instruction in &self.instructions {
            instruction.encode(&mut out);
        }
        out
    }

    /// Decodes a program from its portable binary form.
    ///
    /// The byte length must equal exactly `4 + 5 * count`; anything else is
    /// `InvalidProgram`. The decoded program carries no symbols or metadata.
    pub fn from_bytes(data: &[u8]) -> Result<Self, VmError> {
        if data.len() < COUNT_SIZE {
            return Err(VmError::InvalidProgram {
                reason: "bytecode too short (minimum 4 bytes required)".to_string(),
            });
        }

        let mut input = data;
        let count = u32::decode(&mut input).map_err(|_| VmError::InvalidProgram {
            reason: "bytecode too short (minimum 4 bytes required)".to_string(),
        })?;

        let expected = COUNT_SIZE as u64 + u64::from(count) * RECORD_SIZE as u64;
        if data.len() as u64 != expected {
            return Err(VmError::InvalidProgram {
                reason: format!(
                    "bytecode length mismatch (expected {expected} bytes, got {} bytes)",
                    data.len()
                ),
            });
        }
        let count = count as usize;

        let mut instructions = Vec::with_capacity(count);
        for _ in 0..count {
            let instruction =
                Instruction::decode(&mut input).map_err(|_| VmError::InvalidProgram {
                    reason: "truncated instruction record".to_string(),
                })?;
            instructions.push(instruction);
        }

        Ok(Program::new(instructions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Op;

    #[test]
    fn empty_program_round_trip() {
        let program = Program::new(vec![]);
        let bytes = program.to_bytes();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert!(Program::from_bytes(&bytes).unwrap().is_empty());
    }

    #[test]
    fn encode_is_byte_exact() {
        // [PUSH 42, ADD] -> 02 00 00 00 | 00 2A 00 00 00 | 10 00 00 00 00
        let program = Program::new(vec![
            Instruction::new(Op::Push, 42),
            Instruction::new(Op::Add, 0),
        ]);
        let bytes = program.to_bytes();
        assert_eq!(
            bytes,
            vec![
                0x02, 0x00, 0x00, 0x00, // count
                0x00, 0x2A, 0x00, 0x00, 0x00, // PUSH 42
                0x10, 0x00, 0x00, 0x00, 0x00, // ADD
            ]
        );
        assert_eq!(bytes.len(), 14);
    }

    #[test]
    fn round_trip_preserves_instructions() {
        let instructions = vec![
            Instruction::new(Op::Push, i32::MAX),
            Instruction::new(Op::Pushi, i32::MIN),
            Instruction::new(Op::Jmp, 0),
            Instruction::custom(200, -7),
            Instruction::new(Op::Halt, 0),
        ];
        let program = Program::new(instructions.clone());
        let decoded = Program::from_bytes(&program.to_bytes()).unwrap();
        assert_eq!(decoded.instructions(), instructions.as_slice());
    }

    #[test]
    fn codec_discards_symbols_and_metadata() {
        let mut program = Program::with_metadata(
            vec![Instruction::new(Op::Halt, 0)],
            ProgramMetadata {
                name: "demo".to_string(),
                ..ProgramMetadata::default()
            },
        );
        program.add_symbol(0, "start");

        let decoded = Program::from_bytes(&program.to_bytes()).unwrap();
        assert!(decoded.symbols().is_empty());
        assert_eq!(decoded.metadata(), &ProgramMetadata::default());
        assert_eq!(decoded.instructions(), program.instructions());
    }

    #[test]
    fn from_bytes_rejects_short_input() {
        let err = Program::from_bytes(&[0x01, 0x00]).unwrap_err();
        assert!(matches!(err, VmError::InvalidProgram { .. }));
    }

    #[test]
    fn from_bytes_rejects_length_mismatch() {
        // Claims 2 instructions but carries only one record.
        let mut bytes = vec![0x02, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0x3D, 0x00, 0x00, 0x00, 0x00]);
        let err = Program::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, VmError::InvalidProgram { .. }));

        // Trailing garbage after a valid image.
        let mut bytes = Program::new(vec![Instruction::new(Op::Halt, 0)]).to_bytes();
        bytes.push(0xFF);
        assert!(matches!(
            Program::from_bytes(&bytes),
            Err(VmError::InvalidProgram { .. })
        ));
    }

    #[test]
    fn symbols_are_queryable() {
        let mut program = Program::new(vec![Instruction::new(Op::Nop, 0)]);
        program.add_symbol(0, "entry");
        assert_eq!(program.symbol(0), Some("entry"));
        assert_eq!(program.symbol(1), None);
    }
}
