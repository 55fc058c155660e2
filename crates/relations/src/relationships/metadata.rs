//! Relationship Metadata - Kinds, key mappings, link modes and projections

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// Many-to-one: the "from" model holds the foreign key
    BelongsTo,
    /// One-to-one: the "to" model holds the foreign key
    HasOne,
    /// One-to-many: the "to" model holds the foreign key
    HasMany,
    /// Many-to-many through a junction model
    HasManyThrough,
}

impl RelationshipType {
    /// Returns true if this relationship yields a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::HasManyThrough)
    }

    /// Returns true if the "from" model owns the foreign key
    pub fn owns_foreign_key(self) -> bool {
        matches!(self, Self::BelongsTo)
    }

    /// Returns true for composite relations built from two others
    pub fn is_composite(self) -> bool {
        matches!(self, Self::HasManyThrough)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BelongsTo => "belongsTo",
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::HasManyThrough => "hasManyThrough",
        }
    }
}

/// How two models are linked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Link {
    /// Foreign key based linking
    #[default]
    Key,
    /// The "from" row stores a list of keys (reserved)
    KeyList,
    /// Related data is embedded in the "from" row (reserved)
    Embedded,
    /// Related data is contained by the "from" row (reserved)
    Contained,
}

/// Field projection applied to related fetches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fields {
    /// Every field
    #[default]
    All,
    /// Only the listed fields
    Only(Vec<String>),
}

impl Fields {
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Fields::Only(fields.into_iter().map(Into::into).collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Fields::All)
    }

    /// Make sure a field survives the projection
    pub fn including(&self, field: &str) -> Fields {
        match self {
            Fields::All => Fields::All,
            Fields::Only(fields) => {
                let mut fields = fields.clone();
                if !fields.iter().any(|f| f == field) {
                    fields.push(field.to_string());
                }
                Fields::Only(fields)
            }
        }
    }

    /// Check whether a field is part of the projection
    pub fn contains(&self, field: &str) -> bool {
        match self {
            Fields::All => true,
            Fields::Only(fields) => fields.iter().any(|f| f == field),
        }
    }
}

/// Side of a key mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    From,
    To,
}

/// Key mapping: a "from" field correlated with a "to" field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keys {
    pub from: String,
    pub to: String,
}

impl Keys {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn get(&self, side: Side) -> &str {
        match side {
            Side::From => &self.from,
            Side::To => &self.to,
        }
    }

    pub(crate) fn validate(&self) -> ModelResult<()> {
        if self.from.is_empty() || self.to.is_empty() {
            return Err(ModelError::Configuration(
                "Relationship keys can't be empty".to_string(),
            ));
        }
        Ok(())
    }
}
