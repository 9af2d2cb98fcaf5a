//! Intermediate Representation (IR) for the filter VM.
//!
//! This module defines the bytecode instructions and their operands.

use std::borrow::Cow;
use std::fmt;

use crate::types::FieldValue;

/// Index of a VM register.
pub type Reg = usize;
/// Index into the program's constant pool.
pub type Addr = usize;
/// Index of an instruction; the only valid jump target form.
pub type InsnId = usize;

/// How a relation is applied across two multi-valued operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// Holds if at least one pairing satisfies the relation.
    Any,
    /// Holds if every pairing satisfies the relation.
    All,
}

impl Quantifier {
    pub fn name(self) -> &'static str {
        match self {
            Quantifier::Any => "ANY",
            Quantifier::All => "ALL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    BitwiseAnd,
    Contains,
}

impl Relation {
    pub fn name(self) -> &'static str {
        match self {
            Relation::Eq => "EQ",
            Relation::Ne => "NE",
            Relation::Gt => "GT",
            Relation::Ge => "GE",
            Relation::Lt => "LT",
            Relation::Le => "LE",
            Relation::BitwiseAnd => "BITWISE_AND",
            Relation::Contains => "CONTAINS",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Relation::Eq => "==",
            Relation::Ne => "!=",
            Relation::Gt => ">",
            Relation::Ge => ">=",
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::BitwiseAnd => "&",
            Relation::Contains => "contains",
        }
    }

    pub fn holds(self, a: &FieldValue, b: &FieldValue) -> bool {
        match self {
            Relation::Eq => a.is_eq(b),
            Relation::Ne => a.is_ne(b),
            Relation::Gt => a.is_gt(b),
            Relation::Ge => a.is_ge(b),
            Relation::Lt => a.is_lt(b),
            Relation::Le => a.is_le(b),
            Relation::BitwiseAnd => a.bitwise_and(b),
            Relation::Contains => a.contains(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    /// A literal value in the constant pool.
    Mem(Addr),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "reg#{}", r),
            Operand::Mem(a) => write!(f, "mem#{}", a),
        }
    }
}

/// A single instruction in the filter bytecode.
///
/// Every instruction except `MkRange` and the jumps sets the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Is the field (or a same-name variant) present?
    CheckExists { field: Addr },
    /// Load every occurrence of the field into `reg`, once per run.
    ReadTree { field: Addr, reg: Reg },
    CallFunction {
        func: Addr,
        result: Reg,
        args: [Option<Operand>; 2],
    },
    /// Slice every value of `src` into `dst`.
    MkRange { src: Operand, dst: Reg, range: Addr },
    Compare {
        quantifier: Quantifier,
        relation: Relation,
        lhs: Operand,
        rhs: Operand,
    },
    AnyMatches { lhs: Operand, pattern: Addr },
    /// Any value of `lhs` within the inclusive `[low, high]` bound.
    AnyInSet2 { lhs: Operand, low: Addr, high: Addr },
    Not,
    Return,
    IfTrueGoto(InsnId),
    IfFalseGoto(InsnId),
}

impl Instruction {
    pub fn mnemonic(&self) -> Cow<'static, str> {
        match self {
            Instruction::CheckExists { .. } => "CHECK_EXISTS".into(),
            Instruction::ReadTree { .. } => "READ_TREE".into(),
            Instruction::CallFunction { .. } => "CALL_FUNCTION".into(),
            Instruction::MkRange { .. } => "MK_RANGE".into(),
            Instruction::Compare { quantifier, relation, .. } => {
                format!("{}_{}", quantifier.name(), relation.name()).into()
            }
            Instruction::AnyMatches { .. } => "ANY_MATCHES".into(),
            Instruction::AnyInSet2 { .. } => "ANY_INSET2".into(),
            Instruction::Not => "NOT".into(),
            Instruction::Return => "RETURN".into(),
            Instruction::IfTrueGoto(_) => "IF_TRUE_GOTO".into(),
            Instruction::IfFalseGoto(_) => "IF_FALSE_GOTO".into(),
        }
    }

    /// Whether this is the register-vs-constant form of a test.
    pub fn is_const_form(&self) -> bool {
        match self {
            Instruction::Compare { rhs, .. } => matches!(rhs, Operand::Mem(_)),
            Instruction::AnyMatches { .. } | Instruction::AnyInSet2 { .. } => true,
            _ => false,
        }
    }

    pub fn jump_target(&self) -> Option<InsnId> {
        match self {
            Instruction::IfTrueGoto(t) | Instruction::IfFalseGoto(t) => Some(*t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonics() {
        let cmp = Instruction::Compare {
            quantifier: Quantifier::All,
            relation: Relation::BitwiseAnd,
            lhs: Operand::Reg(0),
            rhs: Operand::Mem(1),
        };
        assert_eq!(cmp.mnemonic(), "ALL_BITWISE_AND");
        assert!(cmp.is_const_form());
        assert_eq!(Instruction::IfFalseGoto(3).mnemonic(), "IF_FALSE_GOTO");
        assert_eq!(Instruction::IfFalseGoto(3).jump_target(), Some(3));
        assert_eq!(Instruction::Not.jump_target(), None);
    }

    #[test]
    fn test_relation_holds() {
        let a = FieldValue::Int(6);
        let b = FieldValue::Int(4);
        assert!(Relation::Gt.holds(&a, &b));
        assert!(Relation::BitwiseAnd.holds(&a, &b));
        assert!(!Relation::Eq.holds(&a, &b));
        assert!(Relation::Ne.holds(&a, &b));
    }

    #[test]
    fn test_operand_display() {
        assert_eq!(Operand::Reg(2).to_string(), "reg#2");
        assert_eq!(Operand::Mem(7).to_string(), "mem#7");
    }
}
