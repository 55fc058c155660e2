//! BelongsTo Relationship - The "from" model holds the foreign key

use serde_json::Value;

use super::loader::embed_one;
use super::metadata::Keys;
use super::relation::{required_ends, EmbedHook, Naming, RelationshipMeta};
use crate::collection::CollectionRef;
use crate::config::{FetchOptions, RelationshipConfig};
use crate::error::{ModelError, ModelResult};
use crate::model::{EntityRef, Slot};
use crate::orm::Orm;
use crate::schema::EmbedTree;

/// BelongsTo relationship - child model references its owner
#[derive(Debug, Clone)]
pub struct BelongsTo {
    pub(crate) meta: RelationshipMeta,
}

impl BelongsTo {
    /// Default keys are `{reference(to): primary key of to}`
    pub(crate) fn new(config: RelationshipConfig, naming: &Naming<'_>) -> ModelResult<Self> {
        let (from, to) = required_ends(&config)?;
        let name = match config.name_option() {
            Some(name) => name.to_string(),
            None => naming.conventions.field_name(&to)?,
        };
        let keys = match config.keys {
            Some(keys) => keys,
            None => Keys::new(naming.conventions.foreign_key(&to)?, naming.primary_key(&to)?),
        };
        keys.validate()?;

        Ok(Self {
            meta: RelationshipMeta {
                name,
                from,
                to,
                keys,
                link: config.link,
                fields: config.fields,
                conventions: naming.conventions.clone(),
            },
        })
    }

    pub(crate) fn embed(
        &self,
        orm: &Orm,
        collection: &CollectionRef,
        options: &FetchOptions,
        hook: Option<EmbedHook<'_>>,
    ) -> ModelResult<()> {
        tracing::debug!(
            "Embedding belongsTo `{}` ({} -> {})",
            self.meta.name,
            self.meta.from,
            self.meta.to
        );
        let duplicates = embed_one(&self.meta, orm, collection, options, hook)?;
        for (position, count) in duplicates {
            tracing::warn!(
                "{} `{}` rows share the primary key referenced by item {} through `{}`, keeping the last",
                count,
                self.meta.to,
                position,
                self.meta.name
            );
        }
        Ok(())
    }

    /// Save the owner first, then copy its key into the foreign key field
    pub(crate) fn save(&self, orm: &Orm, entity: &EntityRef, tree: &EmbedTree) -> ModelResult<bool> {
        let Some(related) = self.related(entity) else {
            return Ok(true);
        };
        let saved = orm.save_tree(&related, tree)?;
        self.broadcast(entity)?;
        Ok(saved)
    }

    /// Copy the owner key into the foreign key field
    pub(crate) fn broadcast(&self, entity: &EntityRef) -> ModelResult<bool> {
        let Some(related) = self.related(entity) else {
            return Ok(true);
        };
        let key = related
            .borrow()
            .get_value(&self.meta.keys.to)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| {
                ModelError::DataIntegrity(format!(
                    "The `'{}'` key is missing from related data.",
                    self.meta.keys.to
                ))
            })?;
        entity.borrow_mut().set_value(&self.meta.keys.from, key);
        Ok(true)
    }

    fn related(&self, entity: &EntityRef) -> Option<EntityRef> {
        match entity.borrow().get(&self.meta.name) {
            Some(Slot::One(related)) => Some(related.clone()),
            _ => None,
        }
    }

    /// Foreign key value held by `entity`
    pub fn foreign_key_value(&self, entity: &EntityRef) -> Option<Value> {
        entity
            .borrow()
            .get_value(&self.meta.keys.from)
            .filter(|value| !value.is_null())
            .cloned()
    }
}
