//! Batch Loading - Index, fetch once, correlate, attach
//!
//! Every simple relationship embeds the same way: index the source collection
//! by its "from" key, fetch every related row whose "to" key is in that
//! distinct set with a single call, index the result by the "to" key and join
//! both indexes in one pass over the source collection.

use std::rc::Rc;

use serde_json::Value;

use super::relation::{EmbedHook, RelationshipMeta};
use crate::collection::{Collection, CollectionRef, Item, KeyIndex};
use crate::config::{FetchOptions, Hydration};
use crate::error::{ModelError, ModelResult};
use crate::model::Slot;
use crate::orm::Orm;
use crate::schema::Schema;
use crate::value::Condition;

/// Fetched related data, indexed by the "to" key
pub(crate) struct Correlation {
    pub related: CollectionRef,
    pub index: KeyIndex,
    /// Source positions with the "from" key value of each
    pub sources: Vec<Option<Value>>,
}

impl Correlation {
    /// Related positions matching source `position`
    pub fn matches(&self, position: usize) -> &[usize] {
        self.sources
            .get(position)
            .and_then(Option::as_ref)
            .and_then(|value| self.index.get(value))
            .unwrap_or(&[])
    }

    pub fn related_items(&self) -> Vec<Item> {
        self.related.borrow().items()
    }

    pub fn related_schema(&self) -> Option<Rc<Schema>> {
        self.related.borrow().schema().cloned()
    }
}

/// Related data to store on one source item
pub(crate) enum Attachment {
    Null,
    One(Item),
    Many(Vec<Item>),
}

/// Run the single batch fetch of a relation for `collection`
pub(crate) fn correlate(
    meta: &RelationshipMeta,
    orm: &Orm,
    collection: &CollectionRef,
    options: &FetchOptions,
    hook: Option<EmbedHook<'_>>,
) -> ModelResult<Correlation> {
    let (sources, values) = {
        let source = collection.borrow();
        let sources: Vec<Option<Value>> = source
            .iter()
            .map(|(_, item)| item.value(&meta.keys.from))
            .collect();
        (sources, source.index_by(&meta.keys.from).values())
    };

    let mut conditions = options.conditions.clone();
    conditions.insert(meta.keys.to.clone(), Condition::In(values));
    let fetch = FetchOptions {
        hydration: options.hydration,
        conditions,
        fields: options.fields.including(&meta.keys.to),
    };

    let related = orm.all(&meta.to, &fetch)?;
    if let Some(hook) = hook {
        hook(&related)?;
    }
    let index = related.borrow().index_by(&meta.keys.to);

    tracing::debug!(
        "Correlated {} `{}` row(s) with {} `{}` item(s) through `{}`",
        related.borrow().len(),
        meta.to,
        sources.len(),
        meta.from,
        meta.name
    );

    Ok(Correlation {
        related,
        index,
        sources,
    })
}

/// Store one attachment per source item under `name`
pub(crate) fn attach(
    collection: &CollectionRef,
    name: &str,
    schema: Option<Rc<Schema>>,
    hydration: Hydration,
    attachments: Vec<Attachment>,
) -> ModelResult<()> {
    let items = collection.borrow().items();
    for (position, (item, attachment)) in items.iter().zip(attachments).enumerate() {
        match item {
            Item::Entity(entity) => {
                let slot = match attachment {
                    Attachment::Null => Slot::null(),
                    Attachment::One(Item::Entity(related)) => Slot::One(related),
                    Attachment::One(Item::Row(row)) => Slot::Value(row),
                    Attachment::Many(related) => {
                        let mut related = Collection::from_items(schema.clone(), related, true);
                        related.set_hydration(hydration);
                        Slot::Many(related.into_ref())
                    }
                };
                entity
                    .try_borrow_mut()
                    .map_err(|_| {
                        ModelError::DataIntegrity(format!(
                            "Can't attach `'{}'` on an entity in use.",
                            name
                        ))
                    })?
                    .set(name, slot);
            }
            Item::Row(_) => {
                let value = match attachment {
                    Attachment::Null => Value::Null,
                    Attachment::One(related) => related.to_value(),
                    Attachment::Many(related) => {
                        Value::Array(related.iter().map(Item::to_value).collect())
                    }
                };
                if let Some(Value::Object(row)) = collection.borrow_mut().row_mut(position) {
                    row.insert(name.to_string(), value);
                }
            }
        }
    }
    Ok(())
}

/// Embed a single-valued relation; with several matches the last one wins
pub(crate) fn embed_one(
    meta: &RelationshipMeta,
    orm: &Orm,
    collection: &CollectionRef,
    options: &FetchOptions,
    hook: Option<EmbedHook<'_>>,
) -> ModelResult<Vec<(usize, usize)>> {
    let correlation = correlate(meta, orm, collection, options, hook)?;
    let related = correlation.related_items();

    let mut duplicates = Vec::new();
    let attachments: Vec<Attachment> = (0..correlation.sources.len())
        .map(|position| {
            let matches = correlation.matches(position);
            if matches.len() > 1 {
                duplicates.push((position, matches.len()));
            }
            match matches.last() {
                Some(&index) => Attachment::One(related[index].clone()),
                None => Attachment::Null,
            }
        })
        .collect();

    attach(
        collection,
        &meta.name,
        correlation.related_schema(),
        options.hydration,
        attachments,
    )?;
    Ok(duplicates)
}
