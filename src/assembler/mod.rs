//! Assembly language front end.
//!
//! Converts human-readable assembly source into a [`Program`]:
//! lexing ([`lexer`]), statement parsing ([`parser`]), then code
//! generation with label resolution through the [`ProgramBuilder`].
//!
//! # Syntax
//!
//! ```text
//! ; array sum
//!         PUSHI 0
//! loop:   DUP
//!         LOADD
//!         ADD
//!         JMPNZ loop
//!         HALT
//! ```
//!
//! - Opcode mnemonics are case-insensitive; label names are case-sensitive
//! - Operands are numeric literals or label references
//! - Comments run from `;` or `#` to end of line
//! - Jump targets may also be written as absolute numeric addresses

mod lexer;
mod parser;

use crate::builder::ProgramBuilder;
use crate::errors::VmError;
use crate::isa::{Op, OperandKind};
use crate::program::Program;
use crate::registry::InstructionRegistry;
use self::lexer::Lexer;
use self::parser::{Operand, Parser, Statement, StatementKind};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// An assembly failure, located at a source line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    /// 1-based line (0 when no location applies, e.g. file I/O).
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    pub message: String,
    /// The offending source line, when available.
    pub source_line: String,
}

impl AsmError {
    fn at(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
            source_line: String::new(),
        }
    }

    /// Attaches the offending line text from the original source.
    fn with_source(mut self, source: &str) -> Self {
        if self.line > 0 {
            if let Some(text) = source.lines().nth(self.line - 1) {
                self.source_line = text.trim_end_matches('\r').to_string();
            }
        }
        self
    }
}

impl std::fmt::Display for AsmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "assembler error at {}:{}: {}",
            self.line, self.column, self.message
        )?;
        if !self.source_line.is_empty() {
            write!(f, "\n{}", self.source_line)?;
        }
        Ok(())
    }
}

impl std::error::Error for AsmError {}

/// Formats a compiler-style diagnostic for an assembly failure.
pub fn render_diagnostic(file: &str, err: &AsmError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {}", err.message);
    let _ = writeln!(diag, " --> {}:{}:{}", file, err.line, err.column);
    if !err.source_line.is_empty() {
        let underline = " ".repeat(err.column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", err.line, err.source_line);
        let _ = writeln!(diag, "  | {underline}^");
    }
    diag
}

/// Source-to-program compiler.
#[derive(Default)]
pub struct Assembler {
    registry: Option<Arc<InstructionRegistry>>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables custom instruction mnemonics from a registry.
    pub fn set_registry(&mut self, registry: Arc<InstructionRegistry>) {
        self.registry = Some(registry);
    }

    /// Parses and compiles source into a program.
    pub fn assemble(&self, source: &str) -> Result<Program, AsmError> {
        self.assemble_inner(source)
            .map_err(|err| err.with_source(source))
    }

    /// Reads a file and assembles it.
    pub fn assemble_file<P: AsRef<Path>>(&self, path: P) -> Result<Program, AsmError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| {
            AsmError::at(0, 0, format!("failed to read {}: {e}", path.display()))
        })?;
        self.assemble(&source).map_err(|mut err| {
            err.message = format!("{} (in file {})", err.message, path.display());
            err
        })
    }

    fn assemble_inner(&self, source: &str) -> Result<Program, AsmError> {
        let tokens = Lexer::new(source).tokenize()?;
        let statements = Parser::new(&tokens).parse()?;
        self.generate(&statements)
    }

    /// Emits instructions for the parsed statements and resolves labels.
    fn generate(&self, statements: &[Statement]) -> Result<Program, AsmError> {
        let custom_ops = self.custom_mnemonics();
        let mut builder = ProgramBuilder::new();
        let mut defined: HashSet<String> = HashSet::new();
        // First reference site per label, for unresolved-label reporting.
        let mut reference_sites: HashMap<String, (usize, usize)> = HashMap::new();

        for statement in statements {
            match &statement.kind {
                StatementKind::Label(name) => {
                    if !defined.insert(name.clone()) {
                        return Err(AsmError::at(
                            statement.line,
                            statement.column,
                            format!("duplicate label: {name}"),
                        ));
                    }
                    builder.label(name.clone());
                }
                StatementKind::Instruction { mnemonic, operand } => {
                    self.emit(
                        &mut builder,
                        &custom_ops,
                        &mut reference_sites,
                        statement,
                        mnemonic,
                        operand.as_ref(),
                    )?;
                }
            }
        }

        builder.build().map_err(|err| match err {
            VmError::UnresolvedLabel { ref label } => {
                let (line, column) = reference_sites.get(label).copied().unwrap_or((0, 0));
                AsmError::at(line, column, err.to_string())
            }
            other => AsmError::at(0, 0, other.to_string()),
        })
    }

    fn emit(
        &self,
        builder: &mut ProgramBuilder,
        custom_ops: &HashMap<String, u8>,
        reference_sites: &mut HashMap<String, (usize, usize)>,
        statement: &Statement,
        mnemonic: &str,
        operand: Option<&Operand>,
    ) -> Result<(), AsmError> {
        let canonical = mnemonic.to_ascii_uppercase();
        let at = |message: String| AsmError::at(statement.line, statement.column, message);

        if let Some(op) = Op::from_mnemonic(&canonical) {
            return match op.operand_kind() {
                OperandKind::None => match operand {
                    None => {
                        builder.instruction(op, 0);
                        Ok(())
                    }
                    Some(_) => Err(at(format!("{canonical} does not take an operand"))),
                },
                OperandKind::Float => match operand {
                    // The operand is an i32; fractional literals truncate
                    // toward zero (use PUSHI for integer constants).
                    Some(Operand::Int(v)) => {
                        builder.instruction(op, to_i32(*v, statement)?);
                        Ok(())
                    }
                    Some(Operand::Float(v)) => {
                        builder.instruction(op, *v as i32);
                        Ok(())
                    }
                    _ => Err(at(format!("{canonical} requires a numeric operand"))),
                },
                OperandKind::Int | OperandKind::Index => match operand {
                    Some(Operand::Int(v)) => {
                        builder.instruction(op, to_i32(*v, statement)?);
                        Ok(())
                    }
                    Some(Operand::Float(_)) => {
                        Err(at(format!("{canonical} requires an integer operand")))
                    }
                    _ => Err(at(format!("{canonical} requires a numeric operand"))),
                },
                OperandKind::Address => match operand {
                    Some(Operand::Label(name)) => {
                        reference_sites
                            .entry(name.clone())
                            .or_insert((statement.line, statement.column));
                        builder.jump_label(op, name.clone());
                        Ok(())
                    }
                    // Absolute numeric targets are accepted so disassembled
                    // output re-assembles.
                    Some(Operand::Int(v)) => {
                        builder.instruction(op, to_i32(*v, statement)?);
                        Ok(())
                    }
                    _ => Err(at(format!("{canonical} requires a label operand"))),
                },
            };
        }

        if let Some(&opcode) = custom_ops.get(&canonical) {
            return match operand {
                None => {
                    builder.custom(opcode, 0);
                    Ok(())
                }
                Some(Operand::Int(v)) => {
                    builder.custom(opcode, to_i32(*v, statement)?);
                    Ok(())
                }
                Some(_) => Err(at(format!(
                    "custom instruction {canonical} requires an integer operand"
                ))),
            };
        }

        Err(at(format!("unknown opcode '{mnemonic}'")))
    }

    /// Uppercased custom mnemonic table from the registry, if set.
    fn custom_mnemonics(&self) -> HashMap<String, u8> {
        match &self.registry {
            Some(registry) => registry
                .names()
                .into_iter()
                .map(|(opcode, name)| (name.to_ascii_uppercase(), opcode))
                .collect(),
            None => HashMap::new(),
        }
    }
}

/// Narrows an operand literal into the instruction's i32 slot.
fn to_i32(value: i64, statement: &Statement) -> Result<i32, AsmError> {
    i32::try_from(value).map_err(|_| {
        AsmError::at(
            statement.line,
            statement.column,
            format!("operand {value} out of range"),
        )
    })
}

/// Assembles source with the default (registry-less) assembler.
pub fn assemble(source: &str) -> Result<Program, AsmError> {
    Assembler::new().assemble(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VmError;
    use crate::isa::{Instruction, Op};
    use crate::vm::ExecContext;
    use std::io::Write as _;

    #[test]
    fn assembles_simple_program() {
        let program = assemble("PUSH 10\nPUSH 5\nADD\nHALT\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                Instruction::new(Op::Push, 10),
                Instruction::new(Op::Push, 5),
                Instruction::new(Op::Add, 0),
                Instruction::new(Op::Halt, 0),
            ]
        );
    }

    #[test]
    fn mnemonics_are_case_insensitive() {
        let program = assemble("push 1\nPuShI 2\nhalt").unwrap();
        assert_eq!(program.instructions()[0].opcode, Op::Push as u8);
        assert_eq!(program.instructions()[1].opcode, Op::Pushi as u8);
    }

    #[test]
    fn labels_resolve_forward_and_backward() {
        let source = "\
start:
    PUSH 1
    JMPZ done
    JMP start
done:
    HALT
";
        let program = assemble(source).unwrap();
        let code = program.instructions();
        assert_eq!(code[1], Instruction::new(Op::Jmpz, 3));
        assert_eq!(code[2], Instruction::new(Op::Jmp, 0));
        assert_eq!(program.symbol(0), Some("start"));
        assert_eq!(program.symbol(3), Some("done"));
    }

    #[test]
    fn label_names_are_case_sensitive() {
        let err = assemble("JMP End\nend:\nHALT").unwrap_err();
        assert!(err.message.contains("unresolved label: End"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn numeric_jump_targets_are_accepted() {
        let program = assemble("JMP 2\nHALT\nNOP").unwrap();
        assert_eq!(program.instructions()[0], Instruction::new(Op::Jmp, 2));
    }

    #[test]
    fn push_truncates_float_literals() {
        let program = assemble("PUSH 3.9\nPUSH -3.9").unwrap();
        assert_eq!(program.instructions()[0].operand, 3);
        assert_eq!(program.instructions()[1].operand, -3);
    }

    #[test]
    fn unknown_opcode_cites_line() {
        let err = assemble("NOP\nFROB 1\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unknown opcode 'FROB'"));
        assert_eq!(err.source_line, "FROB 1");
    }

    #[test]
    fn wrong_operand_kinds_are_rejected() {
        let err = assemble("ADD 1").unwrap_err();
        assert!(err.message.contains("does not take an operand"));

        let err = assemble("PUSH label").unwrap_err();
        assert!(err.message.contains("requires a numeric operand"));

        let err = assemble("PUSHI 1.5").unwrap_err();
        assert!(err.message.contains("requires an integer operand"));

        let err = assemble("JMP 1.5").unwrap_err();
        assert!(err.message.contains("requires a label operand"));
    }

    #[test]
    fn operand_out_of_range_is_rejected() {
        let err = assemble("PUSHI 3000000000").unwrap_err();
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let err = assemble("a:\nNOP\na:\nHALT").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("duplicate label: a"));
    }

    #[test]
    fn unresolved_label_cites_first_reference() {
        let err = assemble("NOP\nJMP missing\nHALT").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unresolved label: missing"));
    }

    #[test]
    fn multiple_labels_share_an_address() {
        let program = assemble("a:\nb:\nHALT").unwrap();
        // Both names bind to address 0; the symbol table keeps one of them.
        assert_eq!(program.instructions().len(), 1);
        assert!(program.symbol(0).is_some());
    }

    #[test]
    fn every_standard_mnemonic_assembles() {
        let source = "\
PUSH 1
PUSHI 1
POP
DUP
SWAP
OVER
ROT
ADD
SUB
MUL
DIV
MOD
NEG
ABS
INC
DEC
AND
OR
NOT
XOR
EQ
NE
GT
LT
GE
LE
LOAD 0
STORE 0
LOADD
STORED
JMP 0
JMPZ 0
JMPNZ 0
CALL 0
RET
HALT
NOP
SQRT
SIN
COS
TAN
ASIN
ACOS
ATAN
ATAN2
LOG
LOG10
EXP
POW
MIN
MAX
FLOOR
CEIL
ROUND
TRUNC
";
        let program = assemble(source).unwrap();
        assert_eq!(program.instructions().len(), 55);
    }

    struct Emit;

    impl crate::registry::InstructionHandler for Emit {
        fn execute(&self, _ctx: &mut ExecContext<'_>, _operand: i32) -> Result<(), VmError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "emit"
        }
    }

    #[test]
    fn registry_mnemonics_assemble_to_custom_opcodes() {
        let registry = Arc::new(InstructionRegistry::new());
        registry.register(200, Arc::new(Emit)).unwrap();

        let mut asm = Assembler::new();
        asm.set_registry(registry);

        let program = asm.assemble("EMIT 7\nemit\nHALT").unwrap();
        assert_eq!(program.instructions()[0], Instruction::custom(200, 7));
        assert_eq!(program.instructions()[1], Instruction::custom(200, 0));
    }

    #[test]
    fn custom_mnemonic_unknown_without_registry() {
        let err = assemble("EMIT 7").unwrap_err();
        assert!(err.message.contains("unknown opcode"));
    }

    #[test]
    fn assemble_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PUSHI 3\nPUSHI 4\nADD\nHALT").unwrap();

        let program = Assembler::new().assemble_file(file.path()).unwrap();
        assert_eq!(program.instructions().len(), 4);
    }

    #[test]
    fn assemble_file_reports_missing_path() {
        let err = Assembler::new()
            .assemble_file("/nonexistent/prog.svm")
            .unwrap_err();
        assert_eq!(err.line, 0);
        assert!(err.message.contains("failed to read"));
    }

    #[test]
    fn assemble_file_errors_carry_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "BOGUS").unwrap();

        let err = Assembler::new().assemble_file(file.path()).unwrap_err();
        assert!(err.message.contains("unknown opcode"));
        assert!(err.message.contains("in file"));
    }

    #[test]
    fn diagnostic_rendering_points_at_column() {
        let err = assemble("NOP\n  FROB\n").unwrap_err();
        let diag = render_diagnostic("prog.svm", &err);
        assert!(diag.contains("error: unknown opcode 'FROB'"));
        assert!(diag.contains("--> prog.svm:2:3"));
        assert!(diag.contains("   2 |   FROB"));
        assert!(diag.contains("  |   ^"));
    }

    #[test]
    fn empty_source_assembles_to_empty_program() {
        assert!(assemble("").unwrap().is_empty());
        assert!(assemble("; nothing here\n").unwrap().is_empty());
    }
}
