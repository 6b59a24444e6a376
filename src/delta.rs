//! Delta instructions: the reconstruction script for one file.
//!
//! A file update is expressed as an ordered stream of instructions. Applied
//! in order against the existing destination (the basis), the stream yields
//! the source bytes exactly.

use crate::error::Result;

/// One step of a reconstruction script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `len` bytes from the basis starting at `offset`.
    Copy {
        /// Byte offset in the basis file.
        offset: u64,
        /// Number of bytes to copy.
        len: u32,
    },
    /// Write these bytes directly.
    Literal(Vec<u8>),
}

impl Instruction {
    /// Copy instruction.
    #[must_use]
    pub const fn copy(offset: u64, len: u32) -> Self {
        Self::Copy { offset, len }
    }

    /// Literal instruction from a slice.
    #[must_use]
    pub fn literal(bytes: &[u8]) -> Self {
        Self::Literal(bytes.to_vec())
    }

    /// Whether this is a copy.
    #[must_use]
    pub const fn is_copy(&self) -> bool {
        matches!(self, Self::Copy { .. })
    }

    /// Whether this is a literal.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Number of output bytes this instruction produces.
    #[must_use]
    pub fn output_len(&self) -> u64 {
        match self {
            Self::Copy { len, .. } => u64::from(*len),
            Self::Literal(bytes) => bytes.len() as u64,
        }
    }
}

/// Consumer of an instruction stream.
///
/// The encoder hands instructions to a sink as it produces them, so a full
/// stream never has to be held in memory. The applier is a sink that writes
/// the reconstructed file; `Vec<Instruction>` is a sink that collects the
/// stream for inspection.
pub trait InstructionSink {
    /// Accept the next instruction of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot process the instruction; the
    /// encoder aborts on the first sink failure.
    fn emit(&mut self, instruction: Instruction) -> Result<()>;
}

impl InstructionSink for Vec<Instruction> {
    fn emit(&mut self, instruction: Instruction) -> Result<()> {
        self.push(instruction);
        Ok(())
    }
}
