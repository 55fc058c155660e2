//! Relationship - Closed sum of the four relationship kinds
//!
//! The kind is chosen once, when a schema binds the relation; every call
//! afterwards dispatches on the enum.

use std::collections::HashMap;

use serde_json::Value;

use super::belongs_to::BelongsTo;
use super::has_many::HasMany;
use super::has_many_through::HasManyThrough;
use super::has_one::HasOne;
use super::metadata::{Fields, Keys, Link, RelationshipType, Side};
use crate::collection::CollectionRef;
use crate::config::{non_empty, FetchOptions, RelationshipConfig};
use crate::conventions::Conventions;
use crate::error::{ModelError, ModelResult};
use crate::model::EntityRef;
use crate::orm::Orm;
use crate::schema::EmbedTree;
use crate::value::Conditions;

/// Callback run on a freshly fetched related collection before it is
/// attached, used to embed nested paths
pub type EmbedHook<'h> = Box<dyn FnOnce(&CollectionRef) -> ModelResult<()> + 'h>;

/// Resolved options shared by every relationship kind
#[derive(Debug, Clone)]
pub struct RelationshipMeta {
    pub(crate) name: String,
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) keys: Keys,
    pub(crate) link: Link,
    pub(crate) fields: Fields,
    pub(crate) conventions: Conventions,
}

impl RelationshipMeta {
    /// Conditions selecting the "to" rows matching `entity`
    pub(crate) fn match_conditions(&self, entity: &EntityRef) -> ModelResult<(String, Value)> {
        let value = entity
            .try_borrow()
            .map_err(|_| ModelError::DataIntegrity(format!("Entity of `'{}'` is in use.", self.name)))?
            .get_value(&self.keys.from)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| {
                ModelError::DataIntegrity(format!(
                    "The `'{}'` key is missing from the `{}` entity.",
                    self.keys.from, self.from
                ))
            })?;
        Ok((self.keys.to.clone(), value))
    }
}

/// Name resolution available while relationships are built
pub(crate) struct Naming<'a> {
    pub conventions: &'a Conventions,
    /// Primary key of every registered model
    pub primary_keys: &'a HashMap<String, String>,
}

impl Naming<'_> {
    pub fn primary_key(&self, model: &str) -> ModelResult<String> {
        match self.primary_keys.get(model) {
            Some(key) => Ok(key.clone()),
            None => self.conventions.primary_key(model),
        }
    }
}

/// `from` and `to` of a simple relationship, both mandatory
pub(crate) fn required_ends(config: &RelationshipConfig) -> ModelResult<(String, String)> {
    let from = non_empty(&config.from).ok_or_else(|| {
        ModelError::Configuration("The relationship `'from'` option can't be empty.".to_string())
    })?;
    let to = non_empty(&config.to).ok_or_else(|| {
        ModelError::Configuration("The relationship `'to'` option can't be empty.".to_string())
    })?;
    Ok((from.to_string(), to.to_string()))
}

/// A relationship bound on a schema
#[derive(Debug, Clone)]
pub enum Relationship {
    BelongsTo(BelongsTo),
    HasOne(HasOne),
    HasMany(HasMany),
    HasManyThrough(HasManyThrough),
}

impl Relationship {
    /// Build a simple (non composite) relationship
    pub(crate) fn new(config: RelationshipConfig, naming: &Naming<'_>) -> ModelResult<Self> {
        match config.kind {
            RelationshipType::BelongsTo => BelongsTo::new(config, naming).map(Self::BelongsTo),
            RelationshipType::HasOne => HasOne::new(config, naming).map(Self::HasOne),
            RelationshipType::HasMany => HasMany::new(config, naming).map(Self::HasMany),
            RelationshipType::HasManyThrough => Err(ModelError::Configuration(
                "A hasManyThrough relationship needs resolved `'through'` and `'using'` relations."
                    .to_string(),
            )),
        }
    }

    pub fn meta(&self) -> &RelationshipMeta {
        match self {
            Self::BelongsTo(rel) => &rel.meta,
            Self::HasOne(rel) => &rel.meta,
            Self::HasMany(rel) => &rel.meta,
            Self::HasManyThrough(rel) => &rel.meta,
        }
    }

    /// Field name the related data is stored under
    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn from(&self) -> &str {
        &self.meta().from
    }

    pub fn to(&self) -> &str {
        &self.meta().to
    }

    pub fn keys(&self) -> &Keys {
        &self.meta().keys
    }

    /// Key field of one side
    pub fn key(&self, side: Side) -> &str {
        self.meta().keys.get(side)
    }

    pub fn link(&self) -> Link {
        self.meta().link
    }

    pub fn fields(&self) -> &Fields {
        &self.meta().fields
    }

    pub fn conventions(&self) -> &Conventions {
        &self.meta().conventions
    }

    pub fn relationship_type(&self) -> RelationshipType {
        match self {
            Self::BelongsTo(_) => RelationshipType::BelongsTo,
            Self::HasOne(_) => RelationshipType::HasOne,
            Self::HasMany(_) => RelationshipType::HasMany,
            Self::HasManyThrough(_) => RelationshipType::HasManyThrough,
        }
    }

    /// Relation of the "from" model leading to the junction model
    pub fn through(&self) -> Option<&str> {
        match self {
            Self::HasManyThrough(rel) => Some(rel.through()),
            _ => None,
        }
    }

    /// Relation of the junction model leading to the target
    pub fn using(&self) -> Option<&str> {
        match self {
            Self::HasManyThrough(rel) => Some(rel.using()),
            _ => None,
        }
    }

    /// True for a hasMany serving as the junction leg of a hasManyThrough
    pub fn is_junction(&self) -> bool {
        match self {
            Self::HasMany(rel) => rel.is_junction(),
            _ => false,
        }
    }

    /// True for a hasManyThrough whose targets live behind a [`Through`] view
    ///
    /// [`Through`]: crate::collection::Through
    pub fn is_pivot(&self) -> bool {
        match self {
            Self::HasManyThrough(rel) => rel.is_pivot(),
            _ => false,
        }
    }

    pub(crate) fn mark_junction(&mut self) {
        if let Self::HasMany(rel) = self {
            rel.set_junction(true);
        }
    }

    /// Conditions selecting the related rows of a single entity
    pub fn match_conditions(&self, entity: &EntityRef) -> ModelResult<Conditions> {
        match self {
            Self::HasManyThrough(rel) => Err(ModelError::Configuration(format!(
                "The hasManyThrough relation `'{}'` has no direct match conditions.",
                rel.meta.name
            ))),
            _ => {
                let (field, value) = self.meta().match_conditions(entity)?;
                Ok(Conditions::new().eq(field, value))
            }
        }
    }

    /// Eager load the relation on every item of `collection` with one batch fetch
    pub fn embed(
        &self,
        orm: &Orm,
        collection: &CollectionRef,
        options: &FetchOptions,
    ) -> ModelResult<()> {
        self.embed_with(orm, collection, options, None)
    }

    /// Same as [`Relationship::embed`], running `hook` on the fetched related
    /// collection before it is attached
    pub fn embed_with(
        &self,
        orm: &Orm,
        collection: &CollectionRef,
        options: &FetchOptions,
        hook: Option<EmbedHook<'_>>,
    ) -> ModelResult<()> {
        if self.link() != Link::Key {
            tracing::debug!(
                "Skipping embed of `{}`: {:?} links are not resolved by key",
                self.name(),
                self.link()
            );
            return Ok(());
        }

        match self {
            Self::BelongsTo(rel) => rel.embed(orm, collection, options, hook),
            Self::HasOne(rel) => rel.embed(orm, collection, options, hook),
            Self::HasMany(rel) => rel.embed(orm, collection, options, hook),
            Self::HasManyThrough(rel) => rel.embed(orm, collection, options, hook),
        }
    }

    /// Persist the related data of `entity`, cascading into `tree`
    pub fn save(&self, orm: &Orm, entity: &EntityRef, tree: &EmbedTree) -> ModelResult<bool> {
        match self {
            Self::BelongsTo(rel) => rel.save(orm, entity, tree),
            Self::HasOne(rel) => rel.save(orm, entity, tree),
            Self::HasMany(rel) => rel.save(orm, entity, tree),
            Self::HasManyThrough(_) => Ok(true),
        }
    }

    /// Propagate key values between `entity` and its related data without
    /// persisting anything
    pub fn broadcast(&self, entity: &EntityRef) -> ModelResult<bool> {
        match self {
            Self::BelongsTo(rel) => rel.broadcast(entity),
            Self::HasOne(rel) => rel.broadcast(entity),
            Self::HasMany(rel) => rel.broadcast(entity),
            Self::HasManyThrough(_) => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming_keys() -> HashMap<String, String> {
        let mut keys = HashMap::new();
        keys.insert("Gallery".to_string(), "id".to_string());
        keys.insert("Tag".to_string(), "tag_id".to_string());
        keys
    }

    #[test]
    fn test_missing_from_or_to_fails_fast() {
        let conventions = Conventions::new();
        let keys = naming_keys();
        let naming = Naming {
            conventions: &conventions,
            primary_keys: &keys,
        };

        let err = Relationship::new(RelationshipConfig::belongs_to("gallery", "Gallery"), &naming)
            .unwrap_err();
        assert!(err.is_configuration());

        let err = Relationship::new(
            RelationshipConfig::new(RelationshipType::HasMany).from("Gallery"),
            &naming,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_default_names_and_keys() {
        let conventions = Conventions::new();
        let keys = naming_keys();
        let naming = Naming {
            conventions: &conventions,
            primary_keys: &keys,
        };

        let belongs = Relationship::new(
            RelationshipConfig::new(RelationshipType::BelongsTo)
                .from("Image")
                .to("Gallery"),
            &naming,
        )
        .unwrap();
        assert_eq!(belongs.name(), "gallery");
        assert_eq!(belongs.keys(), &Keys::new("gallery_id", "id"));

        let has_many = Relationship::new(
            RelationshipConfig::new(RelationshipType::HasMany)
                .from("Gallery")
                .to("Image"),
            &naming,
        )
        .unwrap();
        assert_eq!(has_many.name(), "images");
        assert_eq!(has_many.key(Side::From), "id");
        assert_eq!(has_many.key(Side::To), "gallery_id");
        assert!(!has_many.is_junction());

        let has_one = Relationship::new(
            RelationshipConfig::new(RelationshipType::HasOne)
                .from("Image")
                .to("Tag"),
            &naming,
        )
        .unwrap();
        assert_eq!(has_one.name(), "tag");
        assert_eq!(has_one.keys(), &Keys::new("id", "image_id"));

        // A registered primary key wins over the `key` rule
        let to_tag = Relationship::new(
            RelationshipConfig::new(RelationshipType::BelongsTo)
                .from("Image")
                .to("Tag"),
            &naming,
        )
        .unwrap();
        assert_eq!(to_tag.keys(), &Keys::new("tag_id", "tag_id"));
        assert_eq!(to_tag.relationship_type(), RelationshipType::BelongsTo);
        assert_eq!(to_tag.through(), None);
    }

    #[test]
    fn test_explicit_options_override_conventions() {
        let conventions = Conventions::new();
        let keys = naming_keys();
        let naming = Naming {
            conventions: &conventions,
            primary_keys: &keys,
        };

        let rel = Relationship::new(
            RelationshipConfig::has_many("pictures", "Image")
                .from("Gallery")
                .keys("uid", "album_uid")
                .link(Link::Embedded)
                .fields(Fields::only(["id", "name"])),
            &naming,
        )
        .unwrap();
        assert_eq!(rel.name(), "pictures");
        assert_eq!(rel.keys(), &Keys::new("uid", "album_uid"));
        assert_eq!(rel.link(), Link::Embedded);
        assert!(rel.fields().contains("name"));
        assert!(rel.conventions().has("source"));

        let err = Relationship::new(
            RelationshipConfig::has_many("pictures", "Image")
                .from("Gallery")
                .keys("", "album_uid"),
            &naming,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
