//! Semantic micro-operations.
//!
//! Each machine instruction of a basic block is described by a short sequence
//! of register-transfer operations. The address resolution interpreter only
//! needs these to track pointer arithmetic and memory traffic, so the
//! vocabulary is small: moves, loads, stores, a handful of arithmetic
//! operators, and a conditional-skip guard ([`SemOp::If`]).
//!
//! Registers are either machine registers or per-instruction temporaries.
//! Temporaries do not survive the instruction they appear in.

use std::fmt;

use strum::{Display, EnumIter};

/// A register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reg {
    /// Architectural register, numbered by the front end.
    Machine(u16),
    /// Instruction-local temporary.
    Temp(u16),
}

impl Reg {
    /// Returns true for instruction-local temporaries.
    #[must_use]
    pub const fn is_temp(self) -> bool {
        matches!(self, Reg::Temp(_))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Machine(n) => write!(f, "r{n}"),
            Reg::Temp(n) => write!(f, "t{n}"),
        }
    }
}

/// Width and signedness of a memory transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum MemType {
    /// Signed byte.
    Int8,
    /// Unsigned byte.
    UInt8,
    /// Signed half-word.
    Int16,
    /// Unsigned half-word.
    UInt16,
    /// Signed word.
    Int32,
    /// Unsigned word.
    UInt32,
}

impl MemType {
    /// Returns the transfer size in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            MemType::Int8 | MemType::UInt8 => 1,
            MemType::Int16 | MemType::UInt16 => 2,
            MemType::Int32 | MemType::UInt32 => 4,
        }
    }

    /// Returns true if loaded values are sign-extended.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, MemType::Int8 | MemType::Int16 | MemType::Int32)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BinOp {
    /// Signed comparison producing a condition code.
    Cmp,
    /// Unsigned comparison producing a condition code.
    CmpU,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Left shift.
    Shl,
    /// Logical right shift.
    Shr,
    /// Arithmetic right shift.
    Asr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Signed multiplication.
    Mul,
    /// Unsigned multiplication.
    MulU,
    /// High word of a multiplication.
    MulH,
    /// Signed division.
    Div,
    /// Unsigned division.
    DivU,
    /// Signed remainder.
    Mod,
    /// Unsigned remainder.
    ModU,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum UnOp {
    /// Two's complement negation.
    Neg,
    /// Bitwise complement.
    Not,
}

/// One semantic micro-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemOp {
    /// No effect.
    Nop,
    /// Control transfer to the address held in a register.
    Branch(Reg),
    /// Trap or system call.
    Trap,
    /// End of the semantic sequence on this path.
    Cont,
    /// Conditionally executes the next `skip` operations; the condition
    /// register is not interpreted.
    If {
        /// Register holding the condition.
        cond: Reg,
        /// Number of following operations guarded by the condition.
        skip: usize,
    },
    /// `dst <- mem[addr]`
    Load {
        /// Destination register.
        dst: Reg,
        /// Register holding the address.
        addr: Reg,
        /// Transfer type.
        ty: MemType,
    },
    /// `mem[addr] <- src`
    Store {
        /// Source register.
        src: Reg,
        /// Register holding the address.
        addr: Reg,
        /// Transfer type.
        ty: MemType,
    },
    /// `dst <- <unknown>`
    Scratch(Reg),
    /// `dst <- src`
    Set {
        /// Destination register.
        dst: Reg,
        /// Source register.
        src: Reg,
    },
    /// `dst <- imm`
    SetI {
        /// Destination register.
        dst: Reg,
        /// Immediate value.
        imm: i32,
    },
    /// `dst <- op a`
    Unary {
        /// Operator.
        op: UnOp,
        /// Destination register.
        dst: Reg,
        /// Operand.
        a: Reg,
    },
    /// `dst <- a op b`
    Binary {
        /// Operator.
        op: BinOp,
        /// Destination register.
        dst: Reg,
        /// Left operand.
        a: Reg,
        /// Right operand.
        b: Reg,
    },
}

impl SemOp {
    /// Returns true for loads and stores.
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, SemOp::Load { .. } | SemOp::Store { .. })
    }
}

/// Inclusive address interval declared for an instruction whose accesses the
/// front end could bound without a precise address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessRange {
    /// Lowest accessed address.
    pub lo: u32,
    /// Highest accessed address.
    pub hi: u32,
}

/// A machine instruction as seen by the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the instruction.
    pub address: u32,
    /// Semantic description, executed in order.
    pub ops: Vec<SemOp>,
    /// Optional declared range of the memory accessed by this instruction.
    pub access_range: Option<AccessRange>,
}

impl Instruction {
    /// Creates an instruction from its address and semantic operations.
    #[must_use]
    pub fn new(address: u32, ops: Vec<SemOp>) -> Self {
        Self {
            address,
            ops,
            access_range: None,
        }
    }

    /// Attaches a declared access range.
    #[must_use]
    pub fn with_access_range(mut self, lo: u32, hi: u32) -> Self {
        self.access_range = Some(AccessRange { lo, hi });
        self
    }

    /// Returns true if the instruction reads or writes memory.
    #[must_use]
    pub fn accesses_memory(&self) -> bool {
        self.ops.iter().any(SemOp::is_memory)
    }
}
