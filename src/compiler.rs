//! Compiler module: generates VM bytecode from a resolved filter tree.
//!
//! Code generation is a single walk over the tree. Forward jumps are emitted as
//! holes and patched once their target is known; afterwards a peephole pass
//! collapses chains of jumps so that flat `and`/`or` trees exit in one hop.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::ir::{Addr, InsnId, Instruction, Operand, Quantifier, Reg, Relation};
use crate::pattern::Pattern;
use crate::program::{Constant, Program};
use crate::schema::{FieldDescriptor, FieldId};
use crate::syntax::{Entity, SetElement, TestNode};

const UNPATCHED: InsnId = InsnId::MAX;

/// A forward jump whose target is filled in later.
#[derive(Debug, Clone, Copy)]
struct JumpHole(InsnId);

/// Compiles a resolved filter tree into a program.
///
/// The tree is consumed: literals, ranges, patterns and function definitions
/// move into the constant pool. Shapes the semantic checker should have
/// rejected (such as a non-literal set range bound) panic.
pub fn compile(root: TestNode) -> Program {
    let mut gen = CodeGen::default();
    gen.gen_test(root);
    gen.append(Instruction::Return);
    collapse_jumps(&mut gen.insns);
    gen.finish()
}

#[derive(Default)]
struct CodeGen {
    constants: Vec<Constant>,
    insns: Vec<Instruction>,
    next_register: Reg,
    /// Canonical field id -> constant slot of its descriptor.
    field_addrs: HashMap<FieldId, Addr>,
    /// Canonical field id -> register its values are read into.
    field_regs: HashMap<FieldId, Reg>,
    interesting_fields: BTreeSet<FieldId>,
    /// Registers loaded and non-empty on every path reaching the current point.
    known: HashSet<Reg>,
}

impl CodeGen {
    fn append(&mut self, insn: Instruction) -> InsnId {
        self.insns.push(insn);
        self.insns.len() - 1
    }

    fn append_const(&mut self, constant: Constant) -> Addr {
        self.constants.push(constant);
        self.constants.len() - 1
    }

    fn new_register(&mut self) -> Reg {
        let reg = self.next_register;
        self.next_register += 1;
        reg
    }

    fn append_jump(&mut self, if_true: bool) -> JumpHole {
        let insn = if if_true {
            Instruction::IfTrueGoto(UNPATCHED)
        } else {
            Instruction::IfFalseGoto(UNPATCHED)
        };
        JumpHole(self.append(insn))
    }

    /// Points every hole at the next instruction to be emitted.
    fn patch(&mut self, holes: Vec<JumpHole>) {
        let target = self.insns.len();
        for JumpHole(id) in holes {
            match &mut self.insns[id] {
                Instruction::IfTrueGoto(t) | Instruction::IfFalseGoto(t) => {
                    assert_eq!(*t, UNPATCHED, "jump {} patched twice", id);
                    *t = target;
                }
                other => unreachable!("jump hole {} holds {:?}", id, other),
            }
        }
    }

    /// Constant slot of the field's descriptor, shared by every same-name variant.
    fn field_constant(&mut self, field: FieldDescriptor) -> Addr {
        let canonical = field.canonical_id();
        self.interesting_fields.extend(field.variants().iter().copied());
        if let Some(&addr) = self.field_addrs.get(&canonical) {
            return addr;
        }
        let addr = self.append_const(Constant::Field(field));
        self.field_addrs.insert(canonical, addr);
        addr
    }

    fn gen_test(&mut self, node: TestNode) {
        match node {
            TestNode::Exists(field) => {
                let addr = self.field_constant(field);
                self.append(Instruction::CheckExists { field: addr });
            }
            TestNode::Not(inner) => {
                let entry = self.known.clone();
                self.gen_test(*inner);
                self.append(Instruction::Not);
                self.known = entry;
            }
            TestNode::And(lhs, rhs) => {
                self.gen_test(*lhs);
                let hole = self.append_jump(false);
                self.gen_test(*rhs);
                self.patch(vec![hole]);
            }
            TestNode::Or(lhs, rhs) => {
                let entry = self.known.clone();
                self.gen_test(*lhs);
                let hole = self.append_jump(true);
                let lhs_true = std::mem::replace(&mut self.known, entry);
                self.gen_test(*rhs);
                self.patch(vec![hole]);
                self.known.retain(|reg| lhs_true.contains(reg));
            }
            TestNode::Relation { quantifier, relation, lhs, rhs } => {
                self.gen_relation(quantifier, relation, lhs, rhs);
            }
            TestNode::Matches { lhs, pattern } => self.gen_matches(lhs, pattern),
            TestNode::In { lhs, set } => self.gen_in(lhs, set),
        }
    }

    fn gen_relation(&mut self, quantifier: Quantifier, relation: Relation, lhs: Entity, rhs: Entity) {
        let mut jumps = Vec::new();
        let lhs = self.gen_entity(lhs, &mut jumps);
        let rhs = self.gen_entity(rhs, &mut jumps);
        self.append(Instruction::Compare { quantifier, relation, lhs, rhs });
        // A missing operand makes the relation false: land just past it.
        self.patch(jumps);
    }

    fn gen_matches(&mut self, lhs: Entity, pattern: Pattern) {
        let mut jumps = Vec::new();
        let lhs = self.gen_entity(lhs, &mut jumps);
        let pattern = self.append_const(Constant::Pattern(pattern));
        self.append(Instruction::AnyMatches { lhs, pattern });
        self.patch(jumps);
    }

    /// `lhs in {...}`: an or-chain of per-element tests that loads `lhs` once.
    fn gen_in(&mut self, lhs: Entity, set: Vec<SetElement>) {
        assert!(!set.is_empty(), "membership test against an empty set");
        let mut jumps = Vec::new();
        let lhs = self.gen_entity(lhs, &mut jumps);
        let entry = self.known.clone();
        let last = set.len() - 1;

        for (i, element) in set.into_iter().enumerate() {
            let mut element_jumps = Vec::new();
            match element {
                SetElement::Single(entity) => {
                    let rhs = self.gen_entity(entity, &mut element_jumps);
                    self.append(Instruction::Compare {
                        quantifier: Quantifier::Any,
                        relation: Relation::Eq,
                        lhs,
                        rhs,
                    });
                }
                SetElement::Range(low, high) => {
                    let low = self.bound_constant(low);
                    let high = self.bound_constant(high);
                    self.append(Instruction::AnyInSet2 { lhs, low, high });
                }
            }
            if i < last {
                jumps.push(self.append_jump(true));
            }
            // A missing element value just moves on to the next element.
            self.patch(element_jumps);
            self.known = entry.clone();
        }
        self.patch(jumps);
    }

    fn bound_constant(&mut self, bound: Entity) -> Addr {
        match bound {
            Entity::Literal(lit) => self.append_const(Constant::Value(lit.into_value())),
            other => panic!("set range bound `{}` is not a literal", other.text()),
        }
    }

    /// Emits code producing `entity` and returns where its values live.
    ///
    /// Loads that can come up empty push a hole onto `jumps`; the caller
    /// patches it to wherever "operand missing" should continue.
    fn gen_entity(&mut self, entity: Entity, jumps: &mut Vec<JumpHole>) -> Operand {
        match entity {
            Entity::Field(field) => Operand::Reg(self.gen_read_tree(field, jumps)),
            Entity::Literal(lit) => Operand::Mem(self.append_const(Constant::Value(lit.into_value()))),
            Entity::Range(node) => {
                let src = self.gen_entity(node.entity, jumps);
                let range = self.append_const(Constant::Range(node.range));
                let dst = self.new_register();
                self.append(Instruction::MkRange { src, dst, range });
                Operand::Reg(dst)
            }
            Entity::Function(call) => {
                let (def, params) = call.into_parts();
                let func = self.append_const(Constant::Function(def));
                let result = self.new_register();

                let mut param_jumps = Vec::new();
                let mut args = [None, None];
                for (i, param) in params.into_iter().enumerate() {
                    assert!(i < args.len(), "function call with more than {} arguments", args.len());
                    args[i] = Some(self.gen_entity(param, &mut param_jumps));
                }
                self.append(Instruction::CallFunction { func, result, args });

                // A missing parameter fails the call through the same exit.
                self.patch(param_jumps);
                jumps.push(self.append_jump(false));
                Operand::Reg(result)
            }
        }
    }

    fn gen_read_tree(&mut self, field: FieldDescriptor, jumps: &mut Vec<JumpHole>) -> Reg {
        let canonical = field.canonical_id();
        let addr = self.field_constant(field);
        let reg = match self.field_regs.get(&canonical) {
            Some(&reg) => reg,
            None => {
                let reg = self.new_register();
                self.field_regs.insert(canonical, reg);
                reg
            }
        };
        if self.known.contains(&reg) {
            return reg;
        }
        self.append(Instruction::ReadTree { field: addr, reg });
        jumps.push(self.append_jump(false));
        self.known.insert(reg);
        reg
    }

    fn finish(self) -> Program {
        let len = self.insns.len();
        for (id, insn) in self.insns.iter().enumerate() {
            if let Some(target) = insn.jump_target() {
                assert!(target < len, "jump {} targets {} outside the program", id, target);
            }
        }
        tracing::debug!(
            instructions = len,
            constants = self.constants.len(),
            registers = self.next_register,
            fields = self.interesting_fields.len(),
            "compiled filter program"
        );
        Program::new(self.constants, self.insns, self.next_register, self.interesting_fields)
    }
}

/// Retargets each conditional jump past instructions that cannot change the
/// outcome once the jump is taken:
/// - a jump of the opposite kind is never taken, so it is stepped over;
/// - a jump of the same kind is always taken, so its target is followed;
/// - re-reading the register read right before the jump yields the same
///   accumulator, so it is stepped over.
fn collapse_jumps(insns: &mut [Instruction]) {
    for id in 0..insns.len() {
        let (if_true, mut target) = match insns[id] {
            Instruction::IfTrueGoto(t) => (true, t),
            Instruction::IfFalseGoto(t) => (false, t),
            _ => continue,
        };
        let prev_read = match id.checked_sub(1).map(|p| &insns[p]) {
            Some(Instruction::ReadTree { reg, .. }) => Some(*reg),
            _ => None,
        };
        loop {
            match insns[target] {
                Instruction::IfTrueGoto(next) | Instruction::IfFalseGoto(next) => {
                    let same_kind = matches!(insns[target], Instruction::IfTrueGoto(_)) == if_true;
                    target = if same_kind { next } else { target + 1 };
                }
                Instruction::ReadTree { reg, .. } if Some(reg) == prev_read => target += 1,
                _ => break,
            }
        }
        insns[id] = if if_true {
            Instruction::IfTrueGoto(target)
        } else {
            Instruction::IfFalseGoto(target)
        };
    }
}
