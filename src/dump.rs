//! Dump module: human-readable listing of a compiled program.

use std::fmt;

use crate::ir::Instruction;
use crate::program::{Constant, Program};

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Value(v) => write!(f, "<{}> {}", v.get_type(), v),
            Constant::Field(field) => write!(f, "<FIELD> {}", field.abbrev()),
            Constant::Range(range) => write!(f, "<RANGE> {}", range),
            Constant::Function(def) => write!(f, "<FUNCTION> {}", def.name()),
            Constant::Pattern(pattern) => write!(f, "<PATTERN> {}", pattern),
        }
    }
}

fn operands(insn: &Instruction) -> String {
    match insn {
        Instruction::CheckExists { field } => format!("mem#{}", field),
        Instruction::ReadTree { field, reg } => format!("mem#{} -> reg#{}", field, reg),
        Instruction::CallFunction { func, result, args } => {
            let args: Vec<String> = args.iter().flatten().map(ToString::to_string).collect();
            format!("mem#{}({}) -> reg#{}", func, args.join(", "), result)
        }
        Instruction::MkRange { src, dst, range } => format!("{}[mem#{}] -> reg#{}", src, range, dst),
        Instruction::Compare { relation, lhs, rhs, .. } => format!("{} {} {}", lhs, relation.symbol(), rhs),
        Instruction::AnyMatches { lhs, pattern } => format!("{} matches mem#{}", lhs, pattern),
        Instruction::AnyInSet2 { lhs, low, high } => format!("{} in {{mem#{}..mem#{}}}", lhs, low, high),
        Instruction::IfTrueGoto(target) | Instruction::IfFalseGoto(target) => target.to_string(),
        Instruction::Not | Instruction::Return => String::new(),
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Constants:")?;
        for (addr, constant) in self.constants().iter().enumerate() {
            writeln!(f, "{:04} {}", addr, constant)?;
        }
        writeln!(f)?;
        writeln!(f, "Instructions:")?;
        for (id, insn) in self.instructions().iter().enumerate() {
            let ops = operands(insn);
            if ops.is_empty() {
                writeln!(f, "{:04} {}", id, insn.mnemonic())?;
            } else {
                writeln!(f, "{:04} {:<16}{}", id, insn.mnemonic(), ops)?;
            }
        }
        Ok(())
    }
}
