//! Schema module: the registry of dissectable fields.
//!
//! Fields are registered by abbreviation (`ip.addr`, `tcp.port`). Registering an
//! abbreviation twice creates a second field with the same name; filters treat all
//! same-name fields as one.

use crate::types::FieldType;
use std::collections::HashMap;
use serde::{Serialize, Deserialize};

/// Unique identifier for a field in the registry.
pub type FieldId = usize;

/// A resolved reference to one registered field.
///
/// Carries the full chain of same-name ids, so code generation can rewind to
/// the canonical (first registered) field without consulting the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    id: FieldId,
    abbrev: String,
    ftype: FieldType,
    same_name: Vec<FieldId>,
}

impl FieldDescriptor {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn abbrev(&self) -> &str {
        &self.abbrev
    }

    pub fn ftype(&self) -> FieldType {
        self.ftype
    }

    /// Id of the first field registered under this name.
    pub fn canonical_id(&self) -> FieldId {
        self.same_name[0]
    }

    /// Every field id sharing this name, in registration order.
    pub fn variants(&self) -> &[FieldId] {
        &self.same_name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldEntry {
    abbrev: String,
    ftype: FieldType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRegistry {
    fields: Vec<FieldEntry>, // index = FieldId
    by_name: HashMap<String, Vec<FieldId>>,
}

impl FieldRegistry {
    /// Canonical descriptor for `abbrev`, if registered.
    pub fn lookup(&self, abbrev: &str) -> Option<FieldDescriptor> {
        let ids = self.by_name.get(abbrev)?;
        self.descriptor(ids[0])
    }

    /// Descriptor for a specific field id (any same-name variant).
    pub fn descriptor(&self, id: FieldId) -> Option<FieldDescriptor> {
        let entry = self.fields.get(id)?;
        let same_name = self.by_name.get(&entry.abbrev)?.clone();
        Some(FieldDescriptor {
            id,
            abbrev: entry.abbrev.clone(),
            ftype: entry.ftype,
            same_name,
        })
    }

    /// Get the field name for a given field ID, if it exists.
    pub fn field_name(&self, id: FieldId) -> Option<&str> {
        self.fields.get(id).map(|e| e.abbrev.as_str())
    }

    /// Get the total number of registered fields, variants included.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FieldRegistryBuilder {
    fields: Vec<(String, FieldType)>,
}

impl FieldRegistryBuilder {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn field(mut self, abbrev: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push((abbrev.into(), ty));
        self
    }

    pub fn build(self) -> FieldRegistry {
        let mut fields = Vec::with_capacity(self.fields.len());
        let mut by_name: HashMap<String, Vec<FieldId>> = HashMap::new();
        for (abbrev, ftype) in self.fields {
            let id = fields.len();
            let ids = by_name.entry(abbrev.clone()).or_default();
            if !ids.is_empty() {
                tracing::debug!(field = %abbrev, id, "registering same-name field variant");
            }
            ids.push(id);
            fields.push(FieldEntry { abbrev, ftype });
        }
        FieldRegistry { fields, by_name }
    }
}
