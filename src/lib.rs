//! Wirevm: a bytecode compiler and register VM for packet display filters.
//!
//! A filter arrives here already parsed and semantically checked: field names are
//! bound to [`FieldDescriptor`]s, literals carry typed [`FieldValue`]s and regexes
//! are compiled [`Pattern`]s. [`compile`] turns that [`TestNode`] tree into an
//! immutable [`Program`] (constant pool + instructions), and [`evaluate`] runs the
//! program against one packet's [`FieldTree`] at a time.
//!
//! # Architecture
//! - Field registry and per-type value operations (`schema`, `types`, `range`, `pattern`)
//! - Resolved syntax tree (`syntax`)
//! - Code generation with jump-chain collapsing (`compiler`)
//! - Instruction set and compiled programs (`ir`, `program`, `dump`)
//! - Register-based interpreter (`vm`)
//! - Registered filter functions (`functions`)

mod types;
mod range;
mod pattern;
mod schema;
mod functions;
mod tree;
mod syntax;
mod ir;
mod program;
mod compiler;
mod vm;
mod dump;

pub use types::*;
pub use range::*;
pub use pattern::*;
pub use schema::*;
pub use functions::*;
pub use tree::*;
pub use syntax::*;
pub use ir::*;
pub use program::*;
pub use compiler::*;
pub use vm::*;

use thiserror::Error;

/// Unified error type for Wirevm construction APIs.
///
/// Compiling and evaluating a filter never fails: missing fields and failed
/// function calls are plain `false` results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WirevmError {
    #[error("Field not found: {0}")]
    FieldNotFound(String),
    #[error("Type mismatch for field '{field}': expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Function error: {0}")]
    Function(String),
}
