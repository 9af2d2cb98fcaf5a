//! Functions module: defines built-in and user-defined filter functions.
//!
//! A function receives one value list per argument (a field may occur many times
//! in a packet) and produces a new value list, or `None` on failure.

use crate::types::FieldValue;
use crate::WirevmError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The most arguments a filter function can take.
pub const MAX_FUNCTION_ARGS: usize = 2;

pub trait FilterFunction: Send + Sync {
    fn call(&self, args: &[&[&FieldValue]]) -> Option<Vec<FieldValue>>;
}

/// A named function with its arity bounds; stored in the constant pool.
#[derive(Clone)]
pub struct FunctionDef {
    name: String,
    min_args: usize,
    max_args: usize,
    function: Arc<dyn FilterFunction>,
}

impl FunctionDef {
    pub fn new<F>(name: impl Into<String>, min_args: usize, max_args: usize, func: F) -> Result<Self, WirevmError>
    where
        F: FilterFunction + 'static,
    {
        let name = name.into();
        if min_args > max_args || max_args > MAX_FUNCTION_ARGS {
            return Err(WirevmError::Function(format!(
                "'{}' declares {}..={} arguments, at most {} are supported",
                name, min_args, max_args, MAX_FUNCTION_ARGS
            )));
        }
        Ok(Self { name, min_args, max_args, function: Arc::new(func) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self, nargs: usize) -> bool {
        (self.min_args..=self.max_args).contains(&nargs)
    }

    pub fn call(&self, args: &[&[&FieldValue]]) -> Option<Vec<FieldValue>> {
        self.function.call(args)
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self { functions: HashMap::new() }
    }

    pub fn register(&mut self, def: FunctionDef) {
        if let Some(old) = self.functions.insert(def.name.clone(), def) {
            tracing::debug!(function = %old.name, "replacing registered filter function");
        }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }
}

fn ascii_map(value: &FieldValue, upper: bool) -> Option<FieldValue> {
    match value {
        FieldValue::Str(s) if upper => Some(FieldValue::Str(s.to_ascii_uppercase())),
        FieldValue::Str(s) => Some(FieldValue::Str(s.to_ascii_lowercase())),
        FieldValue::Bytes(b) if upper => Some(FieldValue::Bytes(b.to_ascii_uppercase())),
        FieldValue::Bytes(b) => Some(FieldValue::Bytes(b.to_ascii_lowercase())),
        _ => None,
    }
}

macro_rules! builtin_functions {
    ($( $name:ident: $func_name:expr, ($min:expr, $max:expr), $args:ident => $body:block ),* $(,)?) => {
        $(
            pub struct $name;
            impl FilterFunction for $name {
                fn call(&self, $args: &[&[&FieldValue]]) -> Option<Vec<FieldValue>> $body
            }
        )*
        pub fn register_builtins(reg: &mut FunctionRegistry) {
            $(
                if let Ok(def) = FunctionDef::new($func_name, $min, $max, $name) {
                    reg.register(def);
                }
            )*
        }
    };
}

builtin_functions! {
    LenFunction: "len", (1, 1), args => {
        let vals = args.first()?;
        Some(vals.iter()
            .filter_map(|v| v.as_bytes().map(|b| FieldValue::Int(b.len() as i64)))
            .collect())
    },
    CountFunction: "count", (1, 1), args => {
        let vals = args.first()?;
        Some(vec![FieldValue::Int(vals.len() as i64)])
    },
    UpperFunction: "upper", (1, 1), args => {
        let vals = args.first()?;
        Some(vals.iter().filter_map(|v| ascii_map(v, true)).collect())
    },
    LowerFunction: "lower", (1, 1), args => {
        let vals = args.first()?;
        Some(vals.iter().filter_map(|v| ascii_map(v, false)).collect())
    },
    StringFunction: "string", (1, 1), args => {
        let vals = args.first()?;
        Some(vals.iter()
            .map(|v| match v {
                FieldValue::Str(s) => FieldValue::Str(s.clone()),
                other => FieldValue::Str(other.to_string()),
            })
            .collect())
    },
}
