//! HasManyThrough Relationship - Many-to-many through a junction model
//!
//! `from --(through: hasMany)--> junction --(using: belongsTo)--> to`. The
//! effective `to` and `keys` come from the `using` relation. Embedding loads
//! the junction rows, then their targets, and exposes the targets in junction
//! row order.
//!
//! Either leg may itself be a collection relation (`through` a
//! hasManyThrough, `using` a hasMany or hasManyThrough). Those compositions
//! have no pivot rows to write through, so their targets are flattened into a
//! plain collection instead of a [`Through`] view.

use serde_json::Value;

use super::relation::{EmbedHook, RelationshipMeta};
use super::{Relationship, RelationshipType};
use crate::collection::{Collection, CollectionRef, Item, Through};
use crate::config::{non_empty, FetchOptions, RelationshipConfig};
use crate::conventions::Conventions;
use crate::error::{ModelError, ModelResult};
use crate::model::{EntityRef, Slot};
use crate::orm::Orm;

/// HasManyThrough relationship - a read-only composite of two relations
#[derive(Debug, Clone)]
pub struct HasManyThrough {
    pub(crate) meta: RelationshipMeta,
    through: String,
    using: String,
    junction: String,
    pivot: bool,
}

impl HasManyThrough {
    /// Build from the already bound `through` relation of the "from" model
    /// and the `using` relation of the junction model
    pub(crate) fn new(
        config: RelationshipConfig,
        conventions: &Conventions,
        through: &Relationship,
        using: &Relationship,
    ) -> ModelResult<Self> {
        let from = non_empty(&config.from).ok_or_else(|| {
            ModelError::Configuration("The relationship `'from'` option can't be empty.".to_string())
        })?;
        let through_name = non_empty(&config.through).ok_or_else(|| {
            ModelError::Configuration(
                "The relationship `'through'` option can't be empty.".to_string(),
            )
        })?;
        let using_name = non_empty(&config.using).ok_or_else(|| {
            ModelError::Configuration("The relationship `'using'` option can't be empty.".to_string())
        })?;

        let name = match config.name_option() {
            Some(name) => name.to_string(),
            None => conventions.apply("multiple", using_name)?,
        };
        let keys = match config.keys {
            Some(keys) => keys,
            None => using.keys().clone(),
        };
        keys.validate()?;

        Ok(Self {
            meta: RelationshipMeta {
                name,
                from: from.to_string(),
                to: using.to().to_string(),
                keys,
                link: config.link,
                fields: config.fields,
                conventions: conventions.clone(),
            },
            through: through_name.to_string(),
            using: using_name.to_string(),
            junction: through.to().to_string(),
            pivot: through.relationship_type() == RelationshipType::HasMany
                && matches!(
                    using.relationship_type(),
                    RelationshipType::BelongsTo | RelationshipType::HasOne
                ),
        })
    }

    pub fn through(&self) -> &str {
        &self.through
    }

    pub fn using(&self) -> &str {
        &self.using
    }

    /// Model of the junction rows
    pub fn junction(&self) -> &str {
        &self.junction
    }

    /// True when `through` is a hasMany and `using` a single-valued relation,
    /// so the targets can be read and written through a [`Through`] view
    pub fn is_pivot(&self) -> bool {
        self.pivot
    }

    /// Embed the junction rows (one fetch), their targets (one fetch), then
    /// expose the targets on every item
    pub(crate) fn embed(
        &self,
        orm: &Orm,
        collection: &CollectionRef,
        options: &FetchOptions,
        hook: Option<EmbedHook<'_>>,
    ) -> ModelResult<()> {
        tracing::debug!(
            "Embedding hasManyThrough `{}` ({} -> {} -> {})",
            self.meta.name,
            self.meta.from,
            self.junction,
            self.meta.to
        );

        let schema = orm.models().schema(&self.meta.from)?;
        let through = schema.relation(&self.through)?;
        let junction_schema = orm.models().schema(&self.junction)?;
        let using = junction_schema.relation(&self.using)?;

        let through_options = FetchOptions::new(options.hydration);
        through.embed_with(
            orm,
            collection,
            &through_options,
            Some(Box::new(|junction: &CollectionRef| {
                using.embed_with(orm, junction, options, hook)
            })),
        )?;

        let target_schema = orm.models().schema(&self.meta.to)?;
        let items = collection.borrow().items();
        for (position, item) in items.iter().enumerate() {
            match item {
                Item::Entity(entity) => {
                    let slot = if self.pivot {
                        Slot::Through(Through::view(
                            entity,
                            &self.through,
                            &self.using,
                            junction_schema.clone(),
                        )?)
                    } else {
                        let targets = self.flatten(entity)?;
                        let schema = targets
                            .iter()
                            .find_map(Item::as_entity)
                            .map(|target| target.borrow().schema().clone())
                            .unwrap_or_else(|| target_schema.clone());
                        let mut related = Collection::from_items(Some(schema), targets, true);
                        related.set_hydration(options.hydration);
                        Slot::Many(related.into_ref())
                    };
                    entity
                        .try_borrow_mut()
                        .map_err(|_| {
                            ModelError::DataIntegrity(format!(
                                "Can't attach `'{}'` on an entity in use.",
                                self.meta.name
                            ))
                        })?
                        .set(&self.meta.name, slot);
                }
                Item::Row(_) => {
                    let mut collection = collection.borrow_mut();
                    if let Some(Value::Object(row)) = collection.row_mut(position) {
                        let targets: Vec<Value> = row
                            .get(&self.through)
                            .and_then(Value::as_array)
                            .map(|rows| {
                                rows.iter()
                                    .filter_map(|row| row.get(&self.using))
                                    .flat_map(targets_of)
                                    .collect()
                            })
                            .unwrap_or_default();
                        row.insert(self.meta.name.clone(), Value::Array(targets));
                    }
                }
            }
        }
        Ok(())
    }

    /// Targets reached from every junction row of `entity`, in junction order
    fn flatten(&self, entity: &EntityRef) -> ModelResult<Vec<Item>> {
        let junction = entity.borrow().get(&self.through).cloned();
        let rows = match &junction {
            Some(Slot::Many(rows)) => rows.borrow().items(),
            Some(Slot::Through(view)) => view.items()?,
            _ => Vec::new(),
        };

        let mut targets = Vec::new();
        for row in rows {
            let target = match &row {
                Item::Entity(row) => row.borrow().get(&self.using).cloned(),
                Item::Row(row) => row.get(&self.using).cloned().map(Slot::Value),
            };
            match target {
                Some(Slot::One(target)) => targets.push(Item::Entity(target)),
                Some(Slot::Many(related)) => targets.extend(related.borrow().items()),
                Some(Slot::Through(view)) => targets.extend(
                    view.items()?
                        .into_iter()
                        .filter(|target| !matches!(target, Item::Row(Value::Null))),
                ),
                Some(Slot::Value(value)) => {
                    targets.extend(targets_of(&value).into_iter().map(Item::Row))
                }
                None => {}
            }
        }
        Ok(targets)
    }
}

/// Non-null targets held by a junction row field, a list or a single row
fn targets_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(values) => values.iter().filter(|value| !value.is_null()).cloned().collect(),
        Value::Null => Vec::new(),
        value => vec![value.clone()],
    }
}
