//! HasMany Relationship - The "to" model holds the foreign key, many rows

use indexmap::IndexMap;
use serde_json::Value;

use super::loader::{attach, correlate, Attachment};
use super::metadata::Keys;
use super::relation::{required_ends, EmbedHook, Naming, RelationshipMeta};
use crate::collection::CollectionRef;
use crate::config::{FetchOptions, Hydration, RelationshipConfig};
use crate::error::ModelResult;
use crate::model::{EntityRef, Slot};
use crate::orm::Orm;
use crate::schema::EmbedTree;
use crate::value::{index_key, Conditions};

/// HasMany relationship - parent model has many related models
#[derive(Debug, Clone)]
pub struct HasMany {
    pub(crate) meta: RelationshipMeta,
    junction: bool,
}

impl HasMany {
    /// Default name is `multiple(field(to))`, default keys as for hasOne
    pub(crate) fn new(config: RelationshipConfig, naming: &Naming<'_>) -> ModelResult<Self> {
        let (from, to) = required_ends(&config)?;
        let name = match config.name_option() {
            Some(name) => name.to_string(),
            None => {
                let field = naming.conventions.field_name(&to)?;
                naming.conventions.apply("multiple", &field)?
            }
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
            junction: false,
        })
    }

    /// When true, dropped associations are deleted instead of orphaned
    pub fn is_junction(&self) -> bool {
        self.junction
    }

    pub(crate) fn set_junction(&mut self, junction: bool) {
        self.junction = junction;
    }

    /// Every fetched row is appended to the list of the item it references,
    /// in fetch order
    pub(crate) fn embed(
        &self,
        orm: &Orm,
        collection: &CollectionRef,
        options: &FetchOptions,
        hook: Option<EmbedHook<'_>>,
    ) -> ModelResult<()> {
        tracing::debug!(
            "Embedding hasMany `{}` ({} -> {})",
            self.meta.name,
            self.meta.from,
            self.meta.to
        );
        let correlation = correlate(&self.meta, orm, collection, options, hook)?;
        let related = correlation.related_items();

        let attachments: Vec<Attachment> = (0..correlation.sources.len())
            .map(|position| {
                Attachment::Many(
                    correlation
                        .matches(position)
                        .iter()
                        .map(|&index| related[index].clone())
                        .collect(),
                )
            })
            .collect();

        attach(
            collection,
            &self.meta.name,
            correlation.related_schema(),
            options.hydration,
            attachments,
        )
    }

    /// Reconcile the stored rows with the current list.
    ///
    /// The rows stored before the save are fetched and indexed by primary
    /// key. Every listed entity gets the foreign key and is saved, leaving
    /// the index; whatever is left was dropped from the list and is deleted
    /// (junction) or has its foreign key cleared (plain hasMany).
    pub(crate) fn save(&self, orm: &Orm, entity: &EntityRef, tree: &EmbedTree) -> ModelResult<bool> {
        let Some(collection) = self.related(entity) else {
            return Ok(true);
        };
        let (field, value) = self.meta.match_conditions(entity)?;

        let previous = orm.all(
            &self.meta.to,
            &FetchOptions::new(Hydration::Entity)
                .with_conditions(Conditions::new().eq(field.clone(), value.clone())),
        )?;
        let mut stale: IndexMap<String, EntityRef> = previous
            .borrow()
            .entities()
            .into_iter()
            .filter_map(|row| {
                let key = row.borrow().key_value().and_then(|key| index_key(&key))?;
                Some((key, row))
            })
            .collect();

        let members = collection.borrow().entities();
        let mut success = true;
        for member in &members {
            let key = member.borrow().key_value().and_then(|key| index_key(&key));
            if let Some(key) = key {
                stale.shift_remove(&key);
            }
            member.borrow_mut().set_value(&field, value.clone());
            success &= orm.save_tree(member, tree)?;
        }

        for (key, orphan) in stale {
            if self.junction {
                tracing::debug!(
                    "Deleting junction `{}` row `{}` dropped from `{}`",
                    self.meta.to,
                    key,
                    self.meta.name
                );
                success &= orm.delete(&orphan)?;
            } else {
                tracing::debug!(
                    "Detaching `{}` row `{}` dropped from `{}`",
                    self.meta.to,
                    key,
                    self.meta.name
                );
                orphan.borrow_mut().set_value(&field, Value::Null);
                success &= orm.save_tree(&orphan, &EmbedTree::new())?;
            }
        }

        collection.borrow_mut().amend(true);
        Ok(success)
    }

    /// Copy the key of `entity` into every listed entity
    pub(crate) fn broadcast(&self, entity: &EntityRef) -> ModelResult<bool> {
        let Some(collection) = self.related(entity) else {
            return Ok(true);
        };
        let (field, value) = self.meta.match_conditions(entity)?;
        for member in collection.borrow().entities() {
            member.borrow_mut().set_value(&field, value.clone());
        }
        Ok(true)
    }

    fn related(&self, entity: &EntityRef) -> Option<CollectionRef> {
        match entity.borrow().get(&self.meta.name) {
            Some(Slot::Many(collection)) => Some(collection.clone()),
            _ => None,
        }
    }
}
