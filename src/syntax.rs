//! Syntax module: the resolved filter tree handed to the code generator.
//!
//! By the time a tree reaches this crate every field name is bound to a
//! [`FieldDescriptor`], literals are typed and patterns are compiled. The code
//! generator consumes the tree by value and moves literal, range, function and
//! pattern payloads into the program's constant pool.

use crate::functions::FunctionDef;
use crate::ir::{Quantifier, Relation};
use crate::pattern::Pattern;
use crate::range::RangeSpec;
use crate::schema::FieldDescriptor;
use crate::types::FieldValue;
use crate::WirevmError;

/// A typed literal together with the text it was written as.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    value: FieldValue,
    text: String,
}

impl Literal {
    pub fn new(value: FieldValue, text: impl Into<String>) -> Self {
        Self { value, text: text.into() }
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_value(self) -> FieldValue {
        self.value
    }
}

/// `entity[range]`
#[derive(Debug, Clone)]
pub struct RangeNode {
    pub entity: Entity,
    pub range: RangeSpec,
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    def: FunctionDef,
    args: Vec<Entity>,
}

impl FunctionCall {
    pub fn new(def: FunctionDef, args: Vec<Entity>) -> Result<Self, WirevmError> {
        if !def.accepts(args.len()) {
            return Err(WirevmError::Function(format!(
                "'{}' does not take {} argument(s)",
                def.name(),
                args.len()
            )));
        }
        Ok(Self { def, args })
    }

    pub fn def(&self) -> &FunctionDef {
        &self.def
    }

    pub fn args(&self) -> &[Entity] {
        &self.args
    }

    pub fn into_parts(self) -> (FunctionDef, Vec<Entity>) {
        (self.def, self.args)
    }
}

/// A value participating in a test.
#[derive(Debug, Clone)]
pub enum Entity {
    Field(FieldDescriptor),
    Literal(Literal),
    Range(Box<RangeNode>),
    Function(FunctionCall),
}

impl Entity {
    pub fn field(field: FieldDescriptor) -> Self {
        Entity::Field(field)
    }

    /// A literal whose source text is its display form.
    pub fn literal(value: FieldValue) -> Self {
        let text = value.to_string();
        Entity::Literal(Literal::new(value, text))
    }

    pub fn range(entity: Entity, range: RangeSpec) -> Self {
        Entity::Range(Box::new(RangeNode { entity, range }))
    }

    pub fn function(call: FunctionCall) -> Self {
        Entity::Function(call)
    }

    /// Source-like text for diagnostics.
    pub fn text(&self) -> String {
        match self {
            Entity::Field(f) => f.abbrev().to_string(),
            Entity::Literal(lit) => lit.text().to_string(),
            Entity::Range(node) => format!("{}[{}]", node.entity.text(), node.range),
            Entity::Function(call) => {
                let args: Vec<_> = call.args.iter().map(Entity::text).collect();
                format!("{}({})", call.def.name(), args.join(", "))
            }
        }
    }
}

/// One member of an `in {...}` set.
#[derive(Debug, Clone)]
pub enum SetElement {
    Single(Entity),
    /// Inclusive `low..high`; both bounds must be literals.
    Range(Entity, Entity),
}

#[derive(Debug, Clone)]
pub enum TestNode {
    Exists(FieldDescriptor),
    Not(Box<TestNode>),
    And(Box<TestNode>, Box<TestNode>),
    Or(Box<TestNode>, Box<TestNode>),
    Relation {
        quantifier: Quantifier,
        relation: Relation,
        lhs: Entity,
        rhs: Entity,
    },
    Matches {
        lhs: Entity,
        pattern: Pattern,
    },
    In {
        lhs: Entity,
        set: Vec<SetElement>,
    },
}

impl TestNode {
    pub fn exists(field: FieldDescriptor) -> Self {
        TestNode::Exists(field)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: TestNode) -> Self {
        TestNode::Not(Box::new(inner))
    }

    pub fn and(lhs: TestNode, rhs: TestNode) -> Self {
        TestNode::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: TestNode, rhs: TestNode) -> Self {
        TestNode::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn relation(quantifier: Quantifier, relation: Relation, lhs: Entity, rhs: Entity) -> Self {
        TestNode::Relation { quantifier, relation, lhs, rhs }
    }

    pub fn any(relation: Relation, lhs: Entity, rhs: Entity) -> Self {
        Self::relation(Quantifier::Any, relation, lhs, rhs)
    }

    pub fn all(relation: Relation, lhs: Entity, rhs: Entity) -> Self {
        Self::relation(Quantifier::All, relation, lhs, rhs)
    }

    /// `lhs == rhs`
    pub fn any_eq(lhs: Entity, rhs: Entity) -> Self {
        Self::any(Relation::Eq, lhs, rhs)
    }

    pub fn matches(lhs: Entity, pattern: Pattern) -> Self {
        TestNode::Matches { lhs, pattern }
    }

    pub fn in_set(lhs: Entity, set: Vec<SetElement>) -> Self {
        TestNode::In { lhs, set }
    }
}
