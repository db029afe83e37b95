//! Program-to-source conversion.
//!
//! The inverse of the assembler: renders an instruction sequence back to
//! assembly text, using the program's symbol table for label definitions
//! and jump operands, and the registry for custom mnemonics. Output from
//! a program with a symbol table re-assembles to an equal instruction
//! vector.

use crate::errors::VmError;
use crate::isa::{Op, OperandKind};
use crate::program::Program;
use crate::registry::InstructionRegistry;
use std::fmt::Write as _;
use std::sync::Arc;

/// Output formatting options.
#[derive(Debug, Clone, Copy)]
pub struct DisassemblerOptions {
    /// Prefix each instruction with its address as a comment.
    pub include_addresses: bool,
    /// Emit program metadata as leading comments.
    pub include_metadata: bool,
    /// Indent instructions under labels.
    pub indent_instructions: bool,
}

impl Default for DisassemblerOptions {
    fn default() -> Self {
        Self {
            include_addresses: false,
            include_metadata: true,
            indent_instructions: true,
        }
    }
}

/// Bytecode-to-source converter.
#[derive(Default)]
pub struct Disassembler {
    registry: Option<Arc<InstructionRegistry>>,
    options: DisassemblerOptions,
}

impl Disassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DisassemblerOptions) -> Self {
        Self {
            registry: None,
            options,
        }
    }

    /// Enables custom instruction mnemonics from a registry.
    pub fn set_registry(&mut self, registry: Arc<InstructionRegistry>) {
        self.registry = Some(registry);
    }

    /// Renders a program as assembly source.
    ///
    /// Fails with `InvalidInstruction` for unassigned standard opcodes and
    /// `InvalidOpcode` for custom opcodes the registry cannot name.
    pub fn disassemble(&self, program: &Program) -> Result<String, VmError> {
        let mut out = String::new();

        if self.options.include_metadata {
            self.write_metadata(&mut out, program);
        }

        let custom_names = self
            .registry
            .as_ref()
            .map(|registry| registry.names())
            .unwrap_or_default();

        for (address, instruction) in program.instructions().iter().enumerate() {
            if let Some(label) = program.symbol(address) {
                if address > 0 {
                    out.push('\n');
                }
                let _ = writeln!(out, "{label}:");
            }

            if self.options.include_addresses {
                let _ = write!(out, "; [{address:04}] ");
            }
            if self.options.indent_instructions {
                out.push_str("    ");
            }

            self.write_instruction(&mut out, program, &custom_names, instruction)?;
            out.push('\n');
        }

        // A label may be bound one past the last instruction (a jump target
        // at the end of the program); emit it so the output re-assembles.
        if let Some(label) = program.symbol(program.len()) {
            let _ = writeln!(out, "{label}:");
        }

        Ok(out)
    }

    fn write_metadata(&self, out: &mut String, program: &Program) {
        let metadata = program.metadata();
        if metadata.name.is_empty() && metadata.version.is_empty() && metadata.author.is_empty() {
            return;
        }
        out.push_str("; Program Metadata\n");
        if !metadata.name.is_empty() {
            let _ = writeln!(out, "; Name: {}", metadata.name);
        }
        if !metadata.version.is_empty() {
            let _ = writeln!(out, "; Version: {}", metadata.version);
        }
        if !metadata.author.is_empty() {
            let _ = writeln!(out, "; Author: {}", metadata.author);
        }
        if !metadata.description.is_empty() {
            let _ = writeln!(out, "; Description: {}", metadata.description);
        }
        out.push('\n');
    }

    fn write_instruction(
        &self,
        out: &mut String,
        program: &Program,
        custom_names: &std::collections::HashMap<u8, String>,
        instruction: &crate::isa::Instruction,
    ) -> Result<(), VmError> {
        match instruction.op() {
            Some(op) => match op.operand_kind() {
                OperandKind::None => {
                    out.push_str(op.mnemonic());
                    Ok(())
                }
                OperandKind::Float | OperandKind::Int | OperandKind::Index => {
                    let _ = write!(out, "{} {}", op.mnemonic(), instruction.operand);
                    Ok(())
                }
                OperandKind::Address => {
                    let target = usize::try_from(instruction.operand).ok();
                    match target.and_then(|address| self.target_label(program, address)) {
                        Some(label) => {
                            let _ = write!(out, "{} {}", op.mnemonic(), label);
                        }
                        None => {
                            let _ = write!(out, "{} {}", op.mnemonic(), instruction.operand);
                        }
                    }
                    Ok(())
                }
            },
            None if instruction.is_custom() => match custom_names.get(&instruction.opcode) {
                Some(name) => {
                    let _ = write!(out, "{} {}", name.to_ascii_uppercase(), instruction.operand);
                    Ok(())
                }
                None => Err(VmError::InvalidOpcode {
                    opcode: instruction.opcode,
                }),
            },
            None => Err(VmError::InvalidInstruction {
                opcode: instruction.opcode,
            }),
        }
    }

    fn target_label<'p>(&self, program: &'p Program, address: usize) -> Option<&'p str> {
        program.symbol(address)
    }
}

/// One-shot disassembly via [`Op`]-table defaults.
pub fn disassemble(program: &Program) -> Result<String, VmError> {
    Disassembler::new().disassemble(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{assemble, Assembler};
    use crate::isa::Instruction;
    use crate::program::ProgramMetadata;
    use crate::registry::InstructionHandler;
    use crate::vm::ExecContext;

    #[test]
    fn renders_plain_instructions() {
        let program = Program::new(vec![
            Instruction::new(Op::Push, 10),
            Instruction::new(Op::Add, 0),
            Instruction::new(Op::Halt, 0),
        ]);
        let text = disassemble(&program).unwrap();
        assert_eq!(text, "    PUSH 10\n    ADD\n    HALT\n");
    }

    #[test]
    fn labels_and_jump_operands_use_symbols() {
        let program = assemble("start:\nPUSH 1\nJMPNZ start\nHALT").unwrap();
        let text = disassemble(&program).unwrap();
        assert!(text.contains("start:"));
        assert!(text.contains("JMPNZ start"));
    }

    #[test]
    fn jump_without_symbol_falls_back_to_address() {
        let program = Program::new(vec![
            Instruction::new(Op::Jmp, 2),
            Instruction::new(Op::Nop, 0),
            Instruction::new(Op::Halt, 0),
        ]);
        let text = disassemble(&program).unwrap();
        assert!(text.contains("JMP 2"));
    }

    #[test]
    fn trailing_label_is_emitted() {
        let program = assemble("JMP end\nNOP\nend:").unwrap();
        let text = disassemble(&program).unwrap();
        assert!(text.contains("JMP end"));
        assert!(text.trim_end().ends_with("end:"));
    }

    #[test]
    fn metadata_comments() {
        let mut builder = crate::builder::ProgramBuilder::new();
        builder
            .metadata(ProgramMetadata {
                name: "demo".to_string(),
                version: "1.0".to_string(),
                author: "tester".to_string(),
                description: "a demo".to_string(),
                created: 0,
            })
            .halt();
        let program = builder.build().unwrap();
        let text = disassemble(&program).unwrap();
        assert!(text.contains("; Name: demo"));
        assert!(text.contains("; Version: 1.0"));
        assert!(text.contains("; Author: tester"));
        assert!(text.contains("; Description: a demo"));
    }

    #[test]
    fn address_comments_option() {
        let program = Program::new(vec![
            Instruction::new(Op::Nop, 0),
            Instruction::new(Op::Halt, 0),
        ]);
        let disassembler = Disassembler::with_options(DisassemblerOptions {
            include_addresses: true,
            include_metadata: false,
            indent_instructions: false,
        });
        let text = disassembler.disassemble(&program).unwrap();
        assert!(text.contains("; [0000] NOP"));
        assert!(text.contains("; [0001] HALT"));
    }

    struct Emit;

    impl InstructionHandler for Emit {
        fn execute(&self, _ctx: &mut ExecContext<'_>, _operand: i32) -> Result<(), VmError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "EMIT"
        }
    }

    #[test]
    fn custom_opcodes_use_registry_names() {
        let registry = Arc::new(InstructionRegistry::new());
        registry.register(200, Arc::new(Emit)).unwrap();

        let program = Program::new(vec![
            Instruction::custom(200, 7),
            Instruction::new(Op::Halt, 0),
        ]);

        let mut disassembler = Disassembler::new();
        disassembler.set_registry(Arc::clone(&registry));
        let text = disassembler.disassemble(&program).unwrap();
        assert!(text.contains("EMIT 7"));
    }

    #[test]
    fn unknown_opcodes_are_errors() {
        let program = Program::new(vec![Instruction {
            opcode: 9,
            operand: 0,
        }]);
        assert!(matches!(
            disassemble(&program),
            Err(VmError::InvalidInstruction { opcode: 9 })
        ));

        let program = Program::new(vec![Instruction::custom(200, 0)]);
        assert!(matches!(
            disassemble(&program),
            Err(VmError::InvalidOpcode { opcode: 200 })
        ));
    }

    #[test]
    fn disassembly_reassembles_to_equal_instructions() {
        let source = "\
; compute until done
start:
PUSH 10
PUSH 5
GT
JMPZ done
PUSHI 3
STORE 0
JMP start
done:
HALT
";
        let original = assemble(source).unwrap();
        let text = disassemble(&original).unwrap();
        let reassembled = assemble(&text).unwrap();
        assert_eq!(original.instructions(), reassembled.instructions());
    }

    #[test]
    fn custom_round_trip_through_registry() {
        let registry = Arc::new(InstructionRegistry::new());
        registry.register(200, Arc::new(Emit)).unwrap();

        let mut asm = Assembler::new();
        asm.set_registry(Arc::clone(&registry));
        let original = asm.assemble("EMIT 5\nHALT").unwrap();

        let mut disassembler = Disassembler::new();
        disassembler.set_registry(Arc::clone(&registry));
        let text = disassembler.disassemble(&original).unwrap();

        let reassembled = asm.assemble(&text).unwrap();
        assert_eq!(original.instructions(), reassembled.instructions());
    }
}
