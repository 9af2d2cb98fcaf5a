//! VM module: the register-based interpreter for compiled filter programs.
//!
//! Execution keeps a single boolean accumulator. Tests set it, conditional
//! jumps read it, and `RETURN` yields it. Registers hold the values of fields
//! read from the packet tree, byte slices and function results.

use crate::functions::FunctionDef;
use crate::ir::{Addr, Instruction, Operand, Quantifier, Reg, Relation};
use crate::pattern::Pattern;
use crate::program::{Constant, Program};
use crate::range::RangeSpec;
use crate::schema::FieldDescriptor;
use crate::tree::FieldTree;
use crate::types::FieldValue;

/// One register slot for the duration of a single evaluation.
enum Register<'t> {
    Empty,
    /// Field values read from the tree.
    Borrowed(Vec<&'t FieldValue>),
    /// Values computed during this run, held in the bank's buffer for this register.
    Owned,
}

/// Register storage that outlives a single evaluation.
///
/// Holds the load flags and the buffers for computed values, never references
/// into a packet, so one bank can serve packet after packet while the caller
/// refills the same tree. One bank serves one evaluation at a time; it is
/// cleared on entry and whenever a program returns.
pub struct RegisterBank {
    attempted: Vec<bool>,
    owned: Vec<Vec<FieldValue>>,
}

impl RegisterBank {
    pub fn new(num_registers: usize) -> Self {
        let mut bank = Self { attempted: Vec::new(), owned: Vec::new() };
        bank.grow(num_registers);
        bank
    }

    /// Drops every computed value and forgets which fields were loaded.
    pub fn reset(&mut self) {
        self.attempted.iter_mut().for_each(|a| *a = false);
        self.owned.iter_mut().for_each(Vec::clear);
    }

    fn grow(&mut self, num_registers: usize) {
        if self.attempted.len() < num_registers {
            self.attempted.resize(num_registers, false);
            self.owned.resize_with(num_registers, Vec::new);
        }
    }
}

/// A read-only view of the values an operand stands for.
#[derive(Clone, Copy)]
enum Values<'a> {
    Refs(&'a [&'a FieldValue]),
    Vals(&'a [FieldValue]),
    One(&'a FieldValue),
}

impl<'a> Values<'a> {
    fn len(self) -> usize {
        match self {
            Values::Refs(v) => v.len(),
            Values::Vals(v) => v.len(),
            Values::One(_) => 1,
        }
    }

    fn get(self, i: usize) -> &'a FieldValue {
        match self {
            Values::Refs(v) => v[i],
            Values::Vals(v) => &v[i],
            Values::One(v) => v,
        }
    }

    fn iter(self) -> impl Iterator<Item = &'a FieldValue> {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Evaluates `program` against one packet with a fresh register bank.
pub fn evaluate<T: FieldTree + ?Sized>(program: &Program, tree: &T) -> bool {
    let mut bank = RegisterBank::new(program.num_registers());
    evaluate_with(program, &mut bank, tree)
}

/// Evaluates `program` reusing `bank` for its registers.
///
/// Leaves the bank empty on return, so the same bank can serve the next
/// packet. Evaluation never fails: a missing field or a failed function call
/// is a `false` test result.
pub fn evaluate_with<T: FieldTree + ?Sized>(program: &Program, bank: &mut RegisterBank, tree: &T) -> bool {
    bank.reset();
    bank.grow(program.num_registers());
    let mut regs: Vec<Register<'_>> = std::iter::repeat_with(|| Register::Empty)
        .take(program.num_registers())
        .collect();

    let insns = program.instructions();
    let mut accum = true;
    let mut pc = 0;

    while let Some(insn) = insns.get(pc) {
        match insn {
            Instruction::CheckExists { field } => {
                let field = field_constant(program, *field);
                accum = field.variants().iter().any(|&id| tree.has_field(id));
            }
            Instruction::ReadTree { field, reg } => {
                accum = read_tree(program, bank, &mut regs, tree, *field, *reg);
            }
            Instruction::CallFunction { func, result, args } => {
                let def = function_constant(program, *func);
                let output = {
                    let arg_values: Vec<Vec<&FieldValue>> = args
                        .iter()
                        .flatten()
                        .map(|op| operand(program, &regs, &bank.owned, *op).iter().collect())
                        .collect();
                    let arg_slices: Vec<&[&FieldValue]> = arg_values.iter().map(Vec::as_slice).collect();
                    def.call(&arg_slices)
                };
                match output {
                    Some(values) if !values.is_empty() => {
                        bank.owned[*result] = values;
                        regs[*result] = Register::Owned;
                        accum = true;
                    }
                    _ => {
                        tracing::trace!(function = def.name(), "filter function produced no values");
                        regs[*result] = Register::Empty;
                        accum = false;
                    }
                }
            }
            Instruction::MkRange { src, dst, range } => {
                let range = range_constant(program, *range);
                let mut sliced = std::mem::take(&mut bank.owned[*dst]);
                sliced.clear();
                sliced.extend(operand(program, &regs, &bank.owned, *src).iter().map(|v| {
                    match v.slice(range) {
                        Some(s) => s,
                        None => panic!("{} value {} cannot be sliced", v.get_type(), v),
                    }
                }));
                bank.owned[*dst] = sliced;
                regs[*dst] = Register::Owned;
            }
            Instruction::Compare { quantifier, relation, lhs, rhs } => {
                let lhs = operand(program, &regs, &bank.owned, *lhs);
                let rhs = operand(program, &regs, &bank.owned, *rhs);
                accum = compare(*quantifier, *relation, lhs, rhs);
            }
            Instruction::AnyMatches { lhs, pattern } => {
                let pattern = pattern_constant(program, *pattern);
                accum = operand(program, &regs, &bank.owned, *lhs)
                    .iter()
                    .any(|v| v.matches(pattern));
            }
            Instruction::AnyInSet2 { lhs, low, high } => {
                let low = value_constant(program, *low);
                let high = value_constant(program, *high);
                accum = operand(program, &regs, &bank.owned, *lhs)
                    .iter()
                    .any(|v| v.is_ge(low) && v.is_le(high));
            }
            Instruction::Not => accum = !accum,
            Instruction::Return => {
                bank.reset();
                tracing::trace!(result = accum, "filter evaluated");
                return accum;
            }
            Instruction::IfTrueGoto(target) => {
                if accum {
                    pc = *target;
                    continue;
                }
            }
            Instruction::IfFalseGoto(target) => {
                if !accum {
                    pc = *target;
                    continue;
                }
            }
        }
        pc += 1;
    }

    panic!("program ran past its last instruction ({})", insns.len());
}

/// Loads every occurrence of a field into `reg`, at most once per run.
fn read_tree<'t, T: FieldTree + ?Sized>(
    program: &Program,
    bank: &mut RegisterBank,
    regs: &mut [Register<'t>],
    tree: &'t T,
    field: Addr,
    reg: Reg,
) -> bool {
    if !bank.attempted[reg] {
        bank.attempted[reg] = true;
        let field = field_constant(program, field);
        let values: Vec<&'t FieldValue> = field
            .variants()
            .iter()
            .flat_map(move |&id| tree.field_values(id))
            .collect();
        if !values.is_empty() {
            regs[reg] = Register::Borrowed(values);
        }
    }
    !matches!(regs[reg], Register::Empty)
}

/// Applies `relation` across every pairing of `lhs` and `rhs` values.
///
/// `Any` stops at the first pairing that holds, `All` at the first that does
/// not. `All` over no pairings at all holds.
fn compare(quantifier: Quantifier, relation: Relation, lhs: Values<'_>, rhs: Values<'_>) -> bool {
    let want_all = quantifier == Quantifier::All;
    for a in lhs.iter() {
        for b in rhs.iter() {
            let holds = relation.holds(a, b);
            if want_all && !holds {
                return false;
            }
            if !want_all && holds {
                return true;
            }
        }
    }
    want_all
}

fn operand<'a>(
    program: &'a Program,
    regs: &'a [Register<'_>],
    owned: &'a [Vec<FieldValue>],
    op: Operand,
) -> Values<'a> {
    match op {
        Operand::Reg(r) => match &regs[r] {
            Register::Empty => Values::Vals(&[]),
            Register::Borrowed(v) => Values::Refs(v),
            Register::Owned => Values::Vals(&owned[r]),
        },
        Operand::Mem(addr) => Values::One(value_constant(program, addr)),
    }
}

fn value_constant(program: &Program, addr: Addr) -> &FieldValue {
    match program.constant(addr) {
        Some(Constant::Value(v)) => v,
        other => panic!("mem#{} is not a value constant: {:?}", addr, other),
    }
}

fn field_constant(program: &Program, addr: Addr) -> &FieldDescriptor {
    match program.constant(addr) {
        Some(Constant::Field(f)) => f,
        other => panic!("mem#{} is not a field constant: {:?}", addr, other),
    }
}

fn range_constant(program: &Program, addr: Addr) -> &RangeSpec {
    match program.constant(addr) {
        Some(Constant::Range(r)) => r,
        other => panic!("mem#{} is not a range constant: {:?}", addr, other),
    }
}

fn function_constant(program: &Program, addr: Addr) -> &FunctionDef {
    match program.constant(addr) {
        Some(Constant::Function(f)) => f,
        other => panic!("mem#{} is not a function constant: {:?}", addr, other),
    }
}

fn pattern_constant(program: &Program, addr: Addr) -> &Pattern {
    match program.constant(addr) {
        Some(Constant::Pattern(p)) => p,
        other => panic!("mem#{} is not a pattern constant: {:?}", addr, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::functions::{FilterFunction, FunctionRegistry, register_builtins};
    use crate::range::RangeItem;
    use crate::schema::{FieldId, FieldRegistry, FieldRegistryBuilder};
    use crate::syntax::{Entity, FunctionCall, SetElement, TestNode};
    use crate::tree::PacketTree;
    use crate::types::FieldType;
    use std::cell::Cell;
    use std::collections::BTreeSet;

    fn registry() -> FieldRegistry {
        FieldRegistryBuilder::new()
            .field("port", FieldType::Int)
            .field("name", FieldType::Str)
            .field("data", FieldType::Bytes)
            .field("port", FieldType::Int)
            .build()
    }

    fn field(reg: &FieldRegistry, name: &str) -> Entity {
        Entity::field(reg.lookup(name).unwrap())
    }

    fn int(i: i64) -> Entity {
        Entity::literal(FieldValue::Int(i))
    }

    /// Wraps a tree and counts the queries made against it.
    struct CountingTree<'a> {
        inner: &'a PacketTree,
        has_field: Cell<usize>,
        field_values: Cell<usize>,
    }

    impl<'a> CountingTree<'a> {
        fn new(inner: &'a PacketTree) -> Self {
            Self { inner, has_field: Cell::new(0), field_values: Cell::new(0) }
        }
    }

    impl FieldTree for CountingTree<'_> {
        fn has_field(&self, id: FieldId) -> bool {
            self.has_field.set(self.has_field.get() + 1);
            self.inner.has_field(id)
        }

        fn field_values(&self, id: FieldId) -> &[FieldValue] {
            self.field_values.set(self.field_values.get() + 1);
            self.inner.field_values(id)
        }
    }

    #[test]
    fn test_any_and_all_equality() {
        let reg = registry();
        let mut tree = PacketTree::new();
        tree.add_by_name("port", FieldValue::Int(80), &reg).unwrap();
        tree.add_by_name("port", FieldValue::Int(443), &reg).unwrap();

        let any = compile(TestNode::any_eq(field(&reg, "port"), int(443)));
        let all = compile(TestNode::all(Relation::Eq, field(&reg, "port"), int(443)));
        let all_ne = compile(TestNode::all(Relation::Ne, field(&reg, "port"), int(22)));
        assert!(any.evaluate(&tree));
        assert!(!all.evaluate(&tree));
        assert!(all_ne.evaluate(&tree));
    }

    #[test]
    fn test_read_tree_collects_variants() {
        let reg = registry();
        let mut tree = PacketTree::new();
        tree.add(&reg.descriptor(3).unwrap(), FieldValue::Int(53)).unwrap();

        let program = compile(TestNode::any_eq(field(&reg, "port"), int(53)));
        assert!(program.evaluate(&tree));
        let exists = compile(TestNode::exists(reg.lookup("port").unwrap()));
        assert!(exists.evaluate(&tree));
    }

    #[test]
    fn test_missing_field_is_false_and_not_is_true() {
        let reg = registry();
        let tree = PacketTree::new();
        let program = compile(TestNode::any_eq(field(&reg, "port"), int(80)));
        assert!(!program.evaluate(&tree));
        let negated = compile(TestNode::not(TestNode::any_eq(field(&reg, "port"), int(80))));
        assert!(negated.evaluate(&tree));
    }

    #[test]
    fn test_exists_does_not_read_values() {
        let reg = registry();
        let packet = PacketTree::new();
        let tree = CountingTree::new(&packet);
        let program = compile(TestNode::exists(reg.lookup("port").unwrap()));
        assert!(!program.evaluate(&tree));
        assert_eq!(tree.field_values.get(), 0);
        assert_eq!(tree.has_field.get(), 2);
    }

    #[test]
    fn test_read_tree_is_memoized() {
        let reg = registry();
        let mut packet = PacketTree::new();
        packet.add_by_name("port", FieldValue::Int(2), &reg).unwrap();
        let tree = CountingTree::new(&packet);
        // The second READ_TREE of the or-branch hits the memo.
        let program = compile(TestNode::or(
            TestNode::any_eq(field(&reg, "port"), int(1)),
            TestNode::any_eq(field(&reg, "port"), int(2)),
        ));
        assert!(program.evaluate(&tree));
        assert_eq!(tree.field_values.get(), 2);
    }

    #[test]
    fn test_range_slices_every_value() {
        let reg = registry();
        let mut tree = PacketTree::new();
        tree.add_by_name("data", FieldValue::Bytes(vec![1, 2, 3]), &reg).unwrap();
        tree.add_by_name("data", FieldValue::Bytes(vec![9, 2, 7]), &reg).unwrap();
        let sliced = || Entity::range(field(&reg, "data"), RangeSpec::new(vec![RangeItem::single(1)]));

        let all = compile(TestNode::all(Relation::Eq, sliced(), Entity::literal(FieldValue::Bytes(vec![2]))));
        assert!(all.evaluate(&tree));
        let any = compile(TestNode::any_eq(sliced(), Entity::literal(FieldValue::Bytes(vec![3]))));
        assert!(!any.evaluate(&tree));
    }

    #[test]
    fn test_range_past_the_end_is_truncated() {
        let reg = registry();
        let mut tree = PacketTree::new();
        tree.add_by_name("data", FieldValue::Bytes(vec![1, 2]), &reg).unwrap();
        let sliced = || Entity::range(field(&reg, "data"), RangeSpec::new(vec![RangeItem::length(0, 4)]));

        let program = compile(TestNode::any_eq(sliced(), Entity::literal(FieldValue::Bytes(vec![1, 2, 3, 4]))));
        assert!(!program.evaluate(&tree));
        let short = compile(TestNode::any_eq(sliced(), Entity::literal(FieldValue::Bytes(vec![1, 2]))));
        assert!(short.evaluate(&tree));

        let beyond = Entity::range(field(&reg, "data"), RangeSpec::new(vec![RangeItem::single(7)]));
        let program = compile(TestNode::any_eq(beyond, Entity::literal(FieldValue::Bytes(vec![]))));
        assert!(program.evaluate(&tree));
    }

    #[test]
    #[should_panic(expected = "cannot be sliced")]
    fn test_slicing_an_int_panics() {
        let reg = registry();
        let mut tree = PacketTree::new();
        tree.add_by_name("port", FieldValue::Int(80), &reg).unwrap();
        let sliced = Entity::range(field(&reg, "port"), RangeSpec::new(vec![RangeItem::single(0)]));
        let program = compile(TestNode::any_eq(sliced, Entity::literal(FieldValue::Bytes(vec![0]))));
        program.evaluate(&tree);
    }

    #[test]
    fn test_function_results() {
        let reg = registry();
        let mut functions = FunctionRegistry::new();
        register_builtins(&mut functions);
        let mut tree = PacketTree::new();
        tree.add_by_name("name", FieldValue::Str("Example".into()), &reg).unwrap();

        let lower = FunctionCall::new(functions.get("lower").unwrap().clone(), vec![field(&reg, "name")]).unwrap();
        let program = compile(TestNode::any_eq(
            Entity::function(lower),
            Entity::literal(FieldValue::Str("example".into())),
        ));
        assert!(program.evaluate(&tree));

        // lower() of an Int has no values: the call fails.
        let lower = FunctionCall::new(functions.get("lower").unwrap().clone(), vec![int(3)]).unwrap();
        let program = compile(TestNode::not(TestNode::any_eq(Entity::function(lower), int(3))));
        assert!(program.evaluate(&tree));
    }

    struct Failing;

    impl FilterFunction for Failing {
        fn call(&self, _args: &[&[&FieldValue]]) -> Option<Vec<FieldValue>> {
            None
        }
    }

    #[test]
    fn test_function_failure_is_false() {
        let reg = registry();
        let def = FunctionDef::new("fail", 0, 0, Failing).unwrap();
        let call = FunctionCall::new(def, vec![]).unwrap();
        let program = compile(TestNode::any_eq(Entity::function(call), field(&reg, "port")));
        let mut tree = PacketTree::new();
        tree.add_by_name("port", FieldValue::Int(1), &reg).unwrap();
        assert!(!program.evaluate(&tree));
    }

    #[test]
    fn test_in_set_with_interval() {
        let reg = registry();
        let program = compile(TestNode::in_set(
            field(&reg, "port"),
            vec![SetElement::Single(int(80)), SetElement::Range(int(1000), int(2000))],
        ));
        for (port, expected) in [(80, true), (1000, true), (1500, true), (2000, true), (2001, false), (81, false)] {
            let mut tree = PacketTree::new();
            tree.add_by_name("port", FieldValue::Int(port), &reg).unwrap();
            assert_eq!(program.evaluate(&tree), expected, "port {}", port);
        }
    }

    #[test]
    fn test_matches() {
        let reg = registry();
        let mut tree = PacketTree::new();
        tree.add_by_name("name", FieldValue::Str("www.example.org".into()), &reg).unwrap();
        let program = compile(TestNode::matches(field(&reg, "name"), Pattern::new(r"example\.(org|com)$").unwrap()));
        assert!(program.evaluate(&tree));
    }

    #[test]
    fn test_bank_reuse_with_refilled_tree() {
        let reg = registry();
        let program = compile(TestNode::and(
            TestNode::any_eq(field(&reg, "port"), int(80)),
            TestNode::any_eq(
                Entity::range(field(&reg, "data"), RangeSpec::new(vec![RangeItem::single(0)])),
                Entity::literal(FieldValue::Bytes(vec![7])),
            ),
        ));
        let mut bank = RegisterBank::new(program.num_registers());
        let mut tree = PacketTree::new();
        let mut results = Vec::new();
        for (port, first) in [(80, 7), (80, 8), (22, 7), (80, 7)] {
            tree.clear();
            tree.add_by_name("port", FieldValue::Int(port), &reg).unwrap();
            tree.add_by_name("data", FieldValue::Bytes(vec![first, 0]), &reg).unwrap();
            results.push(evaluate_with(&program, &mut bank, &tree));
        }
        assert_eq!(results, vec![true, false, false, true]);
    }

    #[test]
    fn test_vacuous_all() {
        let empty: [FieldValue; 0] = [];
        let one = FieldValue::Int(1);
        assert!(compare(Quantifier::All, Relation::Eq, Values::Vals(&empty), Values::One(&one)));
        assert!(!compare(Quantifier::Any, Relation::Eq, Values::Vals(&empty), Values::One(&one)));
    }

    #[test]
    #[should_panic(expected = "ran past its last instruction")]
    fn test_missing_return_panics() {
        let program = Program::new(Vec::new(), vec![Instruction::Not], 0, BTreeSet::new());
        evaluate(&program, &PacketTree::new());
    }
}
