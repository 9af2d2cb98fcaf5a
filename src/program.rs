//! Program module: the compiled, immutable form of a filter.

use std::collections::BTreeSet;

use crate::functions::FunctionDef;
use crate::ir::{Addr, Instruction};
use crate::pattern::Pattern;
use crate::range::RangeSpec;
use crate::schema::{FieldDescriptor, FieldId};
use crate::tree::FieldTree;
use crate::types::FieldValue;

/// One slot of the constant pool. Slots are assigned once and never move.
#[derive(Debug, Clone)]
pub enum Constant {
    Value(FieldValue),
    Field(FieldDescriptor),
    Range(RangeSpec),
    Function(FunctionDef),
    Pattern(Pattern),
}

/// A compiled filter: constants, instructions and the register count.
///
/// Immutable once built and safe to share across threads; each evaluation
/// brings its own register bank.
#[derive(Debug, Clone)]
pub struct Program {
    constants: Vec<Constant>,
    insns: Vec<Instruction>,
    num_registers: usize,
    interesting_fields: BTreeSet<FieldId>,
}

impl Program {
    pub(crate) fn new(
        constants: Vec<Constant>,
        insns: Vec<Instruction>,
        num_registers: usize,
        interesting_fields: BTreeSet<FieldId>,
    ) -> Self {
        Self { constants, insns, num_registers, interesting_fields }
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn constant(&self, addr: Addr) -> Option<&Constant> {
        self.constants.get(addr)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.insns
    }

    pub fn num_registers(&self) -> usize {
        self.num_registers
    }

    /// Every field id this program can read, same-name variants included.
    ///
    /// A dissector only has to keep these fields for the filter to work.
    pub fn interesting_fields(&self) -> &BTreeSet<FieldId> {
        &self.interesting_fields
    }

    /// Runs the program against one packet with a fresh register bank.
    pub fn evaluate<T: FieldTree + ?Sized>(&self, tree: &T) -> bool {
        crate::vm::evaluate(self, tree)
    }

    /// Human-readable listing of constants and instructions.
    pub fn dump(&self) -> String {
        self.to_string()
    }
}
