//! Fluent program construction.
//!
//! [`ProgramBuilder`] accumulates instructions and label definitions, then
//! resolves every label reference at [`build`](ProgramBuilder::build) time.
//! Forward references are allowed; an unbound name fails the build with
//! `UnresolvedLabel`.

use crate::errors::VmError;
use crate::isa::{Instruction, Op, CUSTOM_OPCODE_BASE};
use crate::program::{Program, ProgramMetadata};
use std::collections::HashMap;

/// An unresolved label reference: which instruction slot awaits which name.
struct LabelRef {
    label: String,
    index: usize,
}

/// Builder for [`Program`] values.
#[derive(Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
    references: Vec<LabelRef>,
    metadata: ProgramMetadata,
}

/// Generates the chainable no-operand emitters.
macro_rules! simple_ops {
    ( $( $(#[$doc:meta])* $method:ident => $op:ident ),* $(,)? ) => {
        $(
            $(#[$doc])*
            pub fn $method(&mut self) -> &mut Self {
                self.emit(Op::$op, 0)
            }
        )*
    };
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&mut self, op: Op, operand: i32) -> &mut Self {
        self.instructions.push(Instruction::new(op, operand));
        self
    }

    /// Appends an arbitrary standard instruction.
    pub fn instruction(&mut self, op: Op, operand: i32) -> &mut Self {
        self.emit(op, operand)
    }

    /// Appends a `PUSH`. The constant is truncated toward zero into the
    /// 32-bit operand, so fractional values lose their fraction; use
    /// [`push_int`](Self::push_int) for integer constants.
    pub fn push(&mut self, value: f64) -> &mut Self {
        self.emit(Op::Push, value as i32)
    }

    /// Appends a `PUSHI` (value wraps into the 32-bit operand).
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        self.emit(Op::Pushi, value as i32)
    }

    /// Appends a `LOAD` from the given static cell.
    pub fn load(&mut self, index: i32) -> &mut Self {
        self.emit(Op::Load, index)
    }

    /// Appends a `STORE` to the given static cell.
    pub fn store(&mut self, index: i32) -> &mut Self {
        self.emit(Op::Store, index)
    }

    simple_ops! {
        /// Appends a `POP`.
        pop => Pop,
        /// Appends a `DUP`.
        dup => Dup,
        /// Appends a `SWAP`.
        swap => Swap,
        /// Appends an `OVER`.
        over => Over,
        /// Appends a `ROT`.
        rot => Rot,
        /// Appends an `ADD`.
        add => Add,
        /// Appends a `SUB`.
        sub => Sub,
        /// Appends a `MUL`.
        mul => Mul,
        /// Appends a `DIV`.
        div => Div,
        /// Appends a `MOD`.
        modulo => Mod,
        /// Appends a `NEG`.
        neg => Neg,
        /// Appends an `ABS`.
        abs => Abs,
        /// Appends an `INC`.
        inc => Inc,
        /// Appends a `DEC`.
        dec => Dec,
        /// Appends an `AND`.
        and => And,
        /// Appends an `OR`.
        or => Or,
        /// Appends a `NOT`.
        not => Not,
        /// Appends an `XOR`.
        xor => Xor,
        /// Appends an `EQ`.
        eq => Eq,
        /// Appends a `NE`.
        ne => Ne,
        /// Appends a `GT`.
        gt => Gt,
        /// Appends a `LT`.
        lt => Lt,
        /// Appends a `GE`.
        ge => Ge,
        /// Appends a `LE`.
        le => Le,
        /// Appends a `LOADD` (dynamic load).
        loadd => Loadd,
        /// Appends a `STORED` (dynamic store).
        stored => Stored,
        /// Appends a `RET`.
        ret => Ret,
        /// Appends a `HALT`.
        halt => Halt,
        /// Appends a `NOP`.
        nop => Nop,
        /// Appends a `SQRT`.
        sqrt => Sqrt,
        /// Appends a `SIN`.
        sin => Sin,
        /// Appends a `COS`.
        cos => Cos,
        /// Appends a `TAN`.
        tan => Tan,
        /// Appends an `ASIN`.
        asin => Asin,
        /// Appends an `ACOS`.
        acos => Acos,
        /// Appends an `ATAN`.
        atan => Atan,
        /// Appends an `ATAN2`.
        atan2 => Atan2,
        /// Appends a `LOG`.
        log => Log,
        /// Appends a `LOG10`.
        log10 => Log10,
        /// Appends an `EXP`.
        exp => Exp,
        /// Appends a `POW`.
        pow => Pow,
        /// Appends a `MIN`.
        min => Min,
        /// Appends a `MAX`.
        max => Max,
        /// Appends a `FLOOR`.
        floor => Floor,
        /// Appends a `CEIL`.
        ceil => Ceil,
        /// Appends a `ROUND`.
        round => Round,
        /// Appends a `TRUNC`.
        trunc => Trunc,
    }

    /// Binds a label to the address of the next emitted instruction.
    /// Rebinding a name moves it; several labels may share one address.
    pub fn label(&mut self, name: impl Into<String>) -> &mut Self {
        self.labels.insert(name.into(), self.instructions.len());
        self
    }

    /// Appends a jump-family instruction targeting a label, recording the
    /// reference for resolution at build time.
    pub fn jump_label(&mut self, op: Op, label: impl Into<String>) -> &mut Self {
        self.references.push(LabelRef {
            label: label.into(),
            index: self.instructions.len(),
        });
        self.emit(op, 0)
    }

    /// Appends a `JMP` to a label.
    pub fn jmp(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump_label(Op::Jmp, label)
    }

    /// Appends a `JMPZ` to a label.
    pub fn jmpz(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump_label(Op::Jmpz, label)
    }

    /// Appends a `JMPNZ` to a label.
    pub fn jmpnz(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump_label(Op::Jmpnz, label)
    }

    /// Appends a `CALL` to a label.
    pub fn call(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump_label(Op::Call, label)
    }

    /// Appends a custom instruction (`opcode` must be `128..=255`).
    pub fn custom(&mut self, opcode: u8, operand: i32) -> &mut Self {
        debug_assert!(opcode >= CUSTOM_OPCODE_BASE, "custom opcode must be >= 128");
        self.instructions.push(Instruction::custom(opcode, operand));
        self
    }

    /// Attaches program metadata.
    pub fn metadata(&mut self, metadata: ProgramMetadata) -> &mut Self {
        self.metadata = metadata;
        self
    }

    /// Number of instructions emitted so far (the address of the next one).
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Resolves all label references and produces the final program with
    /// its symbol table.
    pub fn build(self) -> Result<Program, VmError> {
        let mut instructions = self.instructions;

        for reference in &self.references {
            let target = self.labels.get(&reference.label).copied().ok_or_else(|| {
                VmError::UnresolvedLabel {
                    label: reference.label.clone(),
                }
            })?;
            let operand = i32::try_from(target).map_err(|_| VmError::InvalidOperand {
                reason: format!("label {} address {target} exceeds operand range", reference.label),
            })?;
            instructions[reference.index].operand = operand;
        }

        let symbols: HashMap<usize, String> = self
            .labels
            .into_iter()
            .map(|(name, address)| (address, name))
            .collect();

        let mut program = Program::with_metadata(instructions, self.metadata);
        program.set_symbols(symbols);
        Ok(program)
    }
}
