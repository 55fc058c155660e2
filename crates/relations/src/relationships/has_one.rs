//! HasOne Relationship - The "to" model holds the foreign key, one row

use super::loader::embed_one;
use super::metadata::Keys;
use super::relation::{required_ends, EmbedHook, Naming, RelationshipMeta};
use crate::collection::CollectionRef;
use crate::config::{FetchOptions, RelationshipConfig};
use crate::error::{ModelError, ModelResult};
use crate::model::{EntityRef, Slot};
use crate::orm::Orm;
use crate::schema::EmbedTree;

/// HasOne relationship - parent model owns a single related model
#[derive(Debug, Clone)]
pub struct HasOne {
    pub(crate) meta: RelationshipMeta,
}

impl HasOne {
    /// Default keys are `{primary key of from: reference(from)}`
    pub(crate) fn new(config: RelationshipConfig, naming: &Naming<'_>) -> ModelResult<Self> {
        let (from, to) = required_ends(&config)?;
        let name = match config.name_option() {
            Some(name) => name.to_string(),
            None => naming.conventions.field_name(&to)?,
        };
        let keys = match config.keys {
            Some(keys) => keys,
            None => Keys::new(naming.primary_key(&from)?, naming.conventions.foreign_key(&from)?),
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

    /// Several related rows sharing one foreign key leave the last one attached
    pub(crate) fn embed(
        &self,
        orm: &Orm,
        collection: &CollectionRef,
        options: &FetchOptions,
        hook: Option<EmbedHook<'_>>,
    ) -> ModelResult<()> {
        tracing::debug!(
            "Embedding hasOne `{}` ({} -> {})",
            self.meta.name,
            self.meta.from,
            self.meta.to
        );
        let duplicates = embed_one(&self.meta, orm, collection, options, hook)?;
        for (position, count) in duplicates {
            tracing::warn!(
                "hasOne `{}` matched {} `{}` rows for item {}, the last one wins",
                self.meta.name,
                count,
                self.meta.to,
                position
            );
        }
        Ok(())
    }

    /// Point the related entity to `entity`, then save it
    pub(crate) fn save(&self, orm: &Orm, entity: &EntityRef, tree: &EmbedTree) -> ModelResult<bool> {
        let Some(related) = self.related(entity) else {
            return Ok(true);
        };
        self.broadcast(entity)?;
        let saved = orm.save_tree(&related, tree)?;

        if related.borrow().key_value().is_none() {
            let key = related.borrow().schema().key_name().to_string();
            return Err(ModelError::DataIntegrity(format!(
                "The `'{}'` key is missing from related data.",
                key
            )));
        }
        Ok(saved)
    }

    /// Copy the key of `entity` into the foreign key of the related entity
    pub(crate) fn broadcast(&self, entity: &EntityRef) -> ModelResult<bool> {
        let Some(related) = self.related(entity) else {
            return Ok(true);
        };
        let (field, value) = self.meta.match_conditions(entity)?;
        related.borrow_mut().set_value(&field, value);
        Ok(true)
    }

    fn related(&self, entity: &EntityRef) -> Option<EntityRef> {
        match entity.borrow().get(&self.meta.name) {
            Some(Slot::One(related)) => Some(related.clone()),
            _ => None,
        }
    }
}
