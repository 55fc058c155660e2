//! Schemas - Field types, bound relationships and the model registry

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::relationships::Relationship;

pub mod field;
pub mod path;
pub mod registry;

pub use field::FieldType;
pub use path::EmbedTree;
pub use registry::{ModelRegistry, RegistryBuilder};

/// Description of a model: storage source, primary key, typed fields and
/// the relationships bound under their field names
#[derive(Debug, Clone)]
pub struct Schema {
    model: String,
    source: Option<String>,
    key: Option<String>,
    fields: IndexMap<String, FieldType>,
    relations: IndexMap<String, Relationship>,
}

impl Schema {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            source: None,
            key: None,
            fields: IndexMap::new(),
            relations: IndexMap::new(),
        }
    }

    /// Set the storage source (table) name
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the primary key field
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Declare a typed field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Storage source, the model name until the registry resolves it
    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.model)
    }

    pub fn key_name(&self) -> &str {
        self.key.as_deref().unwrap_or("id")
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Relationship bound under `name`
    pub fn relation(&self, name: &str) -> ModelResult<&Relationship> {
        self.relations.get(name).ok_or_else(|| {
            ModelError::Lookup(format!(
                "No relation `'{}'` defined on `{}`.",
                name, self.model
            ))
        })
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.relations.iter().map(|(name, rel)| (name.as_str(), rel))
    }

    /// Cast a raw value of `field`; undeclared fields pass through
    pub fn cast(&self, field: &str, value: Value) -> ModelResult<Value> {
        match self.field_type(field) {
            Some(field_type) => field_type.cast(value).map_err(|err| match err {
                ModelError::Cast(message) => {
                    ModelError::Cast(format!("{}.{}: {}", self.model, field, message))
                }
                other => other,
            }),
            None => Ok(value),
        }
    }

    /// Cast every declared field of a raw row
    pub fn cast_row(&self, row: Map<String, Value>) -> ModelResult<Map<String, Value>> {
        row.into_iter()
            .map(|(field, value)| {
                let value = self.cast(&field, value)?;
                Ok((field, value))
            })
            .collect()
    }

    /// Same model, source, key and relations, without typed fields
    pub fn generic(&self) -> Schema {
        Schema {
            model: self.model.clone(),
            source: self.source.clone(),
            key: self.key.clone(),
            fields: IndexMap::new(),
            relations: self.relations.clone(),
        }
    }

    pub(crate) fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub(crate) fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub(crate) fn set_source(&mut self, source: String) {
        self.source = Some(source);
    }

    pub(crate) fn set_key(&mut self, key: String) {
        self.key = Some(key);
    }

    pub(crate) fn bind(&mut self, relationship: Relationship) {
        self.relations
            .insert(relationship.name().to_string(), relationship);
    }

    pub(crate) fn relation_mut(&mut self, name: &str) -> Option<&mut Relationship> {
        self.relations.get_mut(name)
    }
}
