//! Configuration - Typed options for the registry, relationships and operations
//!
//! Every option bag of the relations engine is an explicit struct with its
//! defaults spelled out in a `Default` impl and `with_*` builders.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::relationships::metadata::{Fields, Keys, Link, RelationshipType};
use crate::value::Conditions;

/// How fetched rows are materialised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hydration {
    /// Schema-bound entities
    #[default]
    Entity,
    /// Plain JSON object rows
    Array,
    /// Entities bound to a generic, field-less schema
    Object,
}

impl FromStr for Hydration {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entity" => Ok(Hydration::Entity),
            "array" => Ok(Hydration::Array),
            "object" => Ok(Hydration::Object),
            other => Err(ModelError::Configuration(format!(
                "Unknown hydration mode `{}`",
                other
            ))),
        }
    }
}

/// Engine wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    /// Hydration used by finders when none is requested
    pub default_hydration: Hydration,
    /// Maximum depth of a dotted embed path
    pub max_embed_depth: usize,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            default_hydration: Hydration::Entity,
            max_embed_depth: 10,
        }
    }
}

impl OrmConfig {
    /// Read overrides from `RELATIONS_HYDRATION` and `RELATIONS_MAX_EMBED_DEPTH`
    pub fn from_env() -> ModelResult<Self> {
        let mut config = Self::default();

        if let Ok(hydration) = std::env::var("RELATIONS_HYDRATION") {
            config.default_hydration = hydration.parse()?;
        }

        if let Ok(depth) = std::env::var("RELATIONS_MAX_EMBED_DEPTH") {
            config.max_embed_depth = depth.trim().parse().map_err(|_| {
                ModelError::Configuration(format!(
                    "RELATIONS_MAX_EMBED_DEPTH must be a positive integer, got `{}`",
                    depth
                ))
            })?;
        }

        Ok(config)
    }

    pub fn with_default_hydration(mut self, hydration: Hydration) -> Self {
        self.default_hydration = hydration;
        self
    }

    pub fn with_max_embed_depth(mut self, depth: usize) -> Self {
        self.max_embed_depth = depth;
        self
    }
}

/// Options used to construct a relationship
///
/// `from` and `to` are mandatory for the simple variants; `through` and
/// `using` take the place of `to` for has-many-through.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipConfig {
    pub kind: RelationshipType,
    pub from: Option<String>,
    pub to: Option<String>,
    pub through: Option<String>,
    pub using: Option<String>,
    pub keys: Option<Keys>,
    pub name: Option<String>,
    pub link: Link,
    pub fields: Fields,
}

impl RelationshipConfig {
    pub fn new(kind: RelationshipType) -> Self {
        Self {
            kind,
            from: None,
            to: None,
            through: None,
            using: None,
            keys: None,
            name: None,
            link: Link::Key,
            fields: Fields::All,
        }
    }

    /// The "from" model holds a key referencing the "to" model
    pub fn belongs_to(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(RelationshipType::BelongsTo).named(name).to(to)
    }

    /// The "to" model holds a key referencing the "from" model, one row
    pub fn has_one(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(RelationshipType::HasOne).named(name).to(to)
    }

    /// The "to" model holds a key referencing the "from" model, many rows
    pub fn has_many(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(RelationshipType::HasMany).named(name).to(to)
    }

    /// Composite relation walking `through` then `using`
    pub fn has_many_through(
        name: impl Into<String>,
        through: impl Into<String>,
        using: impl Into<String>,
    ) -> Self {
        Self::new(RelationshipType::HasManyThrough)
            .named(name)
            .through(through)
            .using(using)
    }

    pub fn from(mut self, model: impl Into<String>) -> Self {
        self.from = Some(model.into());
        self
    }

    pub fn to(mut self, model: impl Into<String>) -> Self {
        self.to = Some(model.into());
        self
    }

    pub fn through(mut self, relation: impl Into<String>) -> Self {
        self.through = Some(relation.into());
        self
    }

    pub fn using(mut self, relation: impl Into<String>) -> Self {
        self.using = Some(relation.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the default key mapping (`from` field, `to` field)
    pub fn keys(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.keys = Some(Keys::new(from, to));
        self
    }

    pub fn link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// The name, dropping empty strings
    pub(crate) fn name_option(&self) -> Option<&str> {
        non_empty(&self.name)
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Options of a single batch fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub hydration: Hydration,
    pub conditions: Conditions,
    pub fields: Fields,
}

impl FetchOptions {
    pub fn new(hydration: Hydration) -> Self {
        Self {
            hydration,
            ..Default::default()
        }
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }
}

/// Options of an embed call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedOptions {
    /// Hydration of the related rows; defaults to the hydration of the
    /// collection being embedded on
    pub hydration: Option<Hydration>,
    /// Extra conditions per dotted relation path
    constraints: HashMap<String, Conditions>,
}

impl EmbedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hydration(mut self, hydration: Hydration) -> Self {
        self.hydration = Some(hydration);
        self
    }

    /// Restrict the batch fetch of the relation at `path`
    pub fn constrain(mut self, path: impl Into<String>, conditions: Conditions) -> Self {
        self.constraints.insert(path.into(), conditions);
        self
    }

    pub fn constraint(&self, path: &str) -> Option<&Conditions> {
        self.constraints.get(path)
    }
}

/// Options of a cascading save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    /// Dotted relation paths saved along with the entity
    pub embed: Vec<String>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embed<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.embed = paths.into_iter().map(Into::into).collect();
        self
    }
}
