//! Tree module: the per-packet field tree a compiled filter is evaluated against.
//!
//! The VM only needs two queries from a dissection engine, captured by the
//! [`FieldTree`] trait. [`PacketTree`] is a simple in-memory implementation.

use crate::types::FieldValue;
use crate::schema::{FieldDescriptor, FieldId, FieldRegistry};
use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use crate::WirevmError;

pub trait FieldTree {
    /// Whether the field occurs at least once, without materializing values.
    fn has_field(&self, id: FieldId) -> bool;

    /// All occurrences of exactly this field id, in dissection order.
    fn field_values(&self, id: FieldId) -> &[FieldValue];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketTree {
    values: HashMap<FieldId, Vec<FieldValue>>,
}

impl PacketTree {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Appends one occurrence of `field`, checking its type.
    pub fn add(&mut self, field: &FieldDescriptor, value: FieldValue) -> Result<(), WirevmError> {
        if value.get_type() != field.ftype() {
            return Err(WirevmError::TypeMismatch {
                field: field.abbrev().to_string(),
                expected: field.ftype(),
                actual: value.get_type(),
            });
        }
        self.values.entry(field.id()).or_default().push(value);
        Ok(())
    }

    /// Appends one occurrence of the canonical field registered as `abbrev`.
    pub fn add_by_name(&mut self, abbrev: &str, value: FieldValue, registry: &FieldRegistry) -> Result<(), WirevmError> {
        let field = registry
            .lookup(abbrev)
            .ok_or_else(|| WirevmError::FieldNotFound(abbrev.to_string()))?;
        self.add(&field, value)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn values(&self) -> &HashMap<FieldId, Vec<FieldValue>> {
        &self.values
    }
}

impl FieldTree for PacketTree {
    fn has_field(&self, id: FieldId) -> bool {
        self.values.get(&id).is_some_and(|v| !v.is_empty())
    }

    fn field_values(&self, id: FieldId) -> &[FieldValue] {
        self.values.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}
