//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the
//! canonical opcode table (name, number, mnemonic, operand kind) and
//! invokes a callback macro for code generation, so the engine, assembler,
//! and disassembler all derive from a single definition.
//!
//! Opcode numbers are part of the binary format and must not change:
//! standard opcodes occupy `0..128`, custom opcodes `128..256`.
//!
//! # Instruction format
//!
//! Every instruction is a fixed-width pair: one opcode byte and a 32-bit
//! little-endian signed operand (5 bytes encoded). Operand interpretation
//! is opcode-specific; see [`OperandKind`].

use crate::errors::VmError;
use std::fmt;
use stackvm_derive::BinaryCodec;

/// Lowest opcode value available to host-registered instructions.
pub const CUSTOM_OPCODE_BASE: u8 = 128;

/// How an opcode interprets its operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Operand unused (encoded as zero).
    None,
    /// Immediate pushed as a float. Fractional constants do not survive the
    /// i32 operand; they truncate toward zero (use `PUSHI` for integers).
    Float,
    /// Immediate pushed as an integer.
    Int,
    /// Static memory cell index.
    Index,
    /// Jump target: an instruction address, written as a label in assembly.
    Address,
}

/// Invokes a callback macro with the complete opcode table.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack (0-15)
            // =========================
            /// PUSH n ; push n as a float
            Push = 0, "PUSH", Float,
            /// PUSHI n ; push n as an integer
            Pushi = 1, "PUSHI", Int,
            /// POP ; discard the top of the stack
            Pop = 2, "POP", None,
            /// DUP ; duplicate the top of the stack
            Dup = 3, "DUP", None,
            /// SWAP ; exchange the top two values
            Swap = 4, "SWAP", None,
            /// OVER ; copy the second value to the top
            Over = 5, "OVER", None,
            /// ROT ; rotate the top three: (a b c) -> (b c a)
            Rot = 6, "ROT", None,
            // =========================
            // Arithmetic (16-31)
            // =========================
            /// ADD ; a b -> a + b (float)
            Add = 16, "ADD", None,
            /// SUB ; a b -> a - b (float)
            Sub = 17, "SUB", None,
            /// MUL ; a b -> a * b (float)
            Mul = 18, "MUL", None,
            /// DIV ; a b -> a / b (float), division by zero faults
            Div = 19, "DIV", None,
            /// MOD ; a b -> a % b (integer remainder)
            Mod = 20, "MOD", None,
            /// NEG ; a -> -a (float)
            Neg = 21, "NEG", None,
            /// ABS ; a -> |a| (float)
            Abs = 22, "ABS", None,
            /// INC ; a -> a + 1 (float)
            Inc = 23, "INC", None,
            /// DEC ; a -> a - 1 (float)
            Dec = 24, "DEC", None,
            // =========================
            // Logic (32-39)
            // =========================
            /// AND ; a b -> truthy(a) && truthy(b)
            And = 32, "AND", None,
            /// OR ; a b -> truthy(a) || truthy(b)
            Or = 33, "OR", None,
            /// NOT ; a -> !truthy(a)
            Not = 34, "NOT", None,
            /// XOR ; a b -> truthy(a) ^ truthy(b)
            Xor = 35, "XOR", None,
            // =========================
            // Comparison (40-47)
            // =========================
            /// EQ ; a b -> a == b (type-strict)
            Eq = 40, "EQ", None,
            /// NE ; a b -> a != b (type-strict)
            Ne = 41, "NE", None,
            /// GT ; a b -> a > b (numeric)
            Gt = 42, "GT", None,
            /// LT ; a b -> a < b (numeric)
            Lt = 43, "LT", None,
            /// GE ; a b -> a >= b (numeric)
            Ge = 44, "GE", None,
            /// LE ; a b -> a <= b (numeric)
            Le = 45, "LE", None,
            // =========================
            // Memory (48-55)
            // =========================
            /// LOAD k ; push memory[k]
            Load = 48, "LOAD", Index,
            /// STORE k ; memory[k] = pop()
            Store = 49, "STORE", Index,
            /// LOADD ; push memory[pop()]
            Loadd = 50, "LOADD", None,
            /// STORED ; v i -> memory[i] = v (pops value, then index)
            Stored = 51, "STORED", None,
            // =========================
            // Control flow (56-63)
            // =========================
            /// JMP t ; pc = t
            Jmp = 56, "JMP", Address,
            /// JMPZ t ; pop; jump if not truthy
            Jmpz = 57, "JMPZ", Address,
            /// JMPNZ t ; pop; jump if truthy
            Jmpnz = 58, "JMPNZ", Address,
            /// CALL t ; push return address, jump to t
            Call = 59, "CALL", Address,
            /// RET ; pop return address and jump (halts at top level)
            Ret = 60, "RET", None,
            /// HALT ; stop execution
            Halt = 61, "HALT", None,
            /// NOP ; no operation
            Nop = 62, "NOP", None,
            // =========================
            // Math (64-95)
            // =========================
            /// SQRT ; a -> sqrt(a)
            Sqrt = 64, "SQRT", None,
            /// SIN ; a -> sin(a), radians
            Sin = 65, "SIN", None,
            /// COS ; a -> cos(a), radians
            Cos = 66, "COS", None,
            /// TAN ; a -> tan(a), radians
            Tan = 67, "TAN", None,
            /// ASIN ; a -> asin(a)
            Asin = 68, "ASIN", None,
            /// ACOS ; a -> acos(a)
            Acos = 69, "ACOS", None,
            /// ATAN ; a -> atan(a)
            Atan = 70, "ATAN", None,
            /// ATAN2 ; y x -> atan2(y, x)
            Atan2 = 71, "ATAN2", None,
            /// LOG ; a -> ln(a)
            Log = 72, "LOG", None,
            /// LOG10 ; a -> log10(a)
            Log10 = 73, "LOG10", None,
            /// EXP ; a -> e^a
            Exp = 74, "EXP", None,
            /// POW ; a b -> a^b
            Pow = 75, "POW", None,
            /// MIN ; a b -> min(a, b)
            Min = 76, "MIN", None,
            /// MAX ; a b -> max(a, b)
            Max = 77, "MAX", None,
            /// FLOOR ; a -> floor(a)
            Floor = 78, "FLOOR", None,
            /// CEIL ; a -> ceil(a)
            Ceil = 79, "CEIL", None,
            /// ROUND ; a -> round to nearest, ties away from zero
            Round = 80, "ROUND", None,
            /// TRUNC ; a -> truncate toward zero
            Trunc = 81, "TRUNC", None,
        }
    };
}

macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $num:literal, $mnemonic:literal, $kind:ident
        ),* $(,)?
    ) => {
        /// A standard opcode.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Op {
            $(
                $(#[$doc])*
                $name = $num,
            )*
        }

        impl TryFrom<u8> for Op {
            type Error = VmError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $num => Ok(Op::$name), )*
                    _ => Err(VmError::InvalidInstruction { opcode: value }),
                }
            }
        }

        impl Op {
            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Op::$name => $mnemonic, )*
                }
            }

            /// Returns how this opcode interprets its operand.
            pub const fn operand_kind(&self) -> OperandKind {
                match self {
                    $( Op::$name => OperandKind::$kind, )*
                }
            }

            /// Looks up an opcode by its canonical (uppercase) mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Op> {
                match name {
                    $( $mnemonic => Some(Op::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl Op {
    /// True if the opcode is in the standard range (`0..128`).
    pub const fn is_standard(&self) -> bool {
        (*self as u8) < CUSTOM_OPCODE_BASE
    }
}

/// A single VM instruction: opcode byte plus 32-bit operand.
///
/// Encodes to exactly 5 bytes: the opcode followed by the operand in
/// little-endian order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, BinaryCodec)]
pub struct Instruction {
    pub opcode: u8,
    pub operand: i32,
}

impl Instruction {
    /// Creates an instruction for a standard opcode.
    pub fn new(op: Op, operand: i32) -> Self {
        Self {
            opcode: op as u8,
            operand,
        }
    }

    /// Creates an instruction for a custom opcode (`128..=255`).
    pub fn custom(opcode: u8, operand: i32) -> Self {
        debug_assert!(opcode >= CUSTOM_OPCODE_BASE, "custom opcode must be >= 128");
        Self { opcode, operand }
    }

    /// Resolves the opcode byte to a standard opcode, if it is one.
    pub fn op(&self) -> Option<Op> {
        Op::try_from(self.opcode).ok()
    }

    /// True if the opcode byte is in the custom range.
    pub fn is_custom(&self) -> bool {
        self.opcode >= CUSTOM_OPCODE_BASE
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.op() {
            Some(op) => op.mnemonic().to_string(),
            None if self.is_custom() => format!("CUSTOM_{}", self.opcode),
            None => format!("UNKNOWN_{}", self.opcode),
        };
        if self.operand != 0 {
            write!(f, "{} {}", name, self.operand)
        } else {
            write!(f, "{name}")
        }
    }
}
