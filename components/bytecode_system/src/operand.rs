//! Operand addressing.
//!
//! An instruction names every input and output by one raw index into a
//! single operand space laid out as
//!
//! ```text
//! [ registers | locals | constants | arguments ]
//! ```
//!
//! The executable records the cumulative boundaries once; classifying an
//! index is a chain of comparisons against them.

use core_types::{RuntimeError, RuntimeResult};
use std::fmt;

/// Largest raw operand index; instructions store indices in 29 bits.
pub const MAX_OPERAND_INDEX: u32 = 0x1FFF_FFFF;

/// Raw index into the operand space of one executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operand(u32);

impl Operand {
    /// Wraps a raw index.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not fit in 29 bits.
    pub fn new(index: u32) -> Self {
        assert!(index <= MAX_OPERAND_INDEX, "operand index {index:#x} exceeds 29 bits");
        Operand(index)
    }

    /// The raw index.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// What an operand refers to, with the index inside that category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Scratch register
    Register(u32),
    /// Named local variable
    Local(u32),
    /// Entry of the constant table
    Constant(u32),
    /// Incoming argument
    Argument(u32),
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandKind::Register(index) => write!(f, "reg{index}"),
            OperandKind::Local(index) => write!(f, "loc{index}"),
            OperandKind::Constant(index) => write!(f, "const{index}"),
            OperandKind::Argument(index) => write!(f, "arg{index}"),
        }
    }
}

/// Cumulative boundaries of the four operand categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperandLayout {
    number_of_registers: u32,
    registers_and_locals_count: u32,
    registers_and_locals_and_constants_count: u32,
    operand_count: u32,
}

impl OperandLayout {
    /// Computes the boundaries for the given category sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::MalformedExecutable`] if the total does not
    /// fit in the 29-bit operand space.
    pub fn new(registers: u32, locals: u32, constants: u32, arguments: u32) -> RuntimeResult<Self> {
        let overflow = || {
            RuntimeError::MalformedExecutable(format!(
                "operand space of {registers} registers, {locals} locals, {constants} constants and {arguments} arguments exceeds {MAX_OPERAND_INDEX:#x}"
            ))
        };
        let registers_and_locals_count = registers.checked_add(locals).ok_or_else(overflow)?;
        let registers_and_locals_and_constants_count =
            registers_and_locals_count.checked_add(constants).ok_or_else(overflow)?;
        let operand_count = registers_and_locals_and_constants_count
            .checked_add(arguments)
            .ok_or_else(overflow)?;
        if operand_count > MAX_OPERAND_INDEX + 1 {
            return Err(overflow());
        }
        Ok(OperandLayout {
            number_of_registers: registers,
            registers_and_locals_count,
            registers_and_locals_and_constants_count,
            operand_count,
        })
    }

    /// Number of registers; also the first local index.
    pub fn number_of_registers(&self) -> u32 {
        self.number_of_registers
    }

    /// First local index.
    pub fn local_index_base(&self) -> u32 {
        self.number_of_registers
    }

    /// First constant index.
    pub fn constant_index_base(&self) -> u32 {
        self.registers_and_locals_count
    }

    /// First argument index.
    pub fn argument_index_base(&self) -> u32 {
        self.registers_and_locals_and_constants_count
    }

    /// One past the last valid index.
    pub fn operand_count(&self) -> u32 {
        self.operand_count
    }

    /// Classifies `operand`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::OperandOutOfRange`] past the last argument.
    pub fn try_classify(&self, operand: Operand) -> RuntimeResult<OperandKind> {
        let index = operand.index();
        if index < self.number_of_registers {
            Ok(OperandKind::Register(index))
        } else if index < self.registers_and_locals_count {
            Ok(OperandKind::Local(index - self.number_of_registers))
        } else if index < self.registers_and_locals_and_constants_count {
            Ok(OperandKind::Constant(index - self.registers_and_locals_count))
        } else if index < self.operand_count {
            Ok(OperandKind::Argument(index - self.registers_and_locals_and_constants_count))
        } else {
            Err(RuntimeError::OperandOutOfRange {
                index,
                limit: self.operand_count,
            })
        }
    }

    /// Classifies `operand`, which the compiler guaranteed to be in range.
    ///
    /// # Panics
    ///
    /// Panics past the last argument.
    pub fn classify(&self, operand: Operand) -> OperandKind {
        match self.try_classify(operand) {
            Ok(kind) => kind,
            Err(error) => panic!("{error}"),
        }
    }

    /// The operand naming `kind`, if `kind` is inside this layout.
    pub fn operand_for(&self, kind: OperandKind) -> Option<Operand> {
        let (base, index, end) = match kind {
            OperandKind::Register(index) => (0, index, self.number_of_registers),
            OperandKind::Local(index) => (self.number_of_registers, index, self.registers_and_locals_count),
            OperandKind::Constant(index) => (
                self.registers_and_locals_count,
                index,
                self.registers_and_locals_and_constants_count,
            ),
            OperandKind::Argument(index) => (self.registers_and_locals_and_constants_count, index, self.operand_count),
        };
        let raw = base.checked_add(index)?;
        (raw < end).then(|| Operand::new(raw))
    }
}
