//! Orm Context - Batch finders, eager loading and cascading persistence
//!
//! An [`Orm`] ties a frozen [`ModelRegistry`] to a [`DataSource`]. Every
//! relationship operation receives it to fetch related rows and to save or
//! delete entities.

use std::rc::Rc;

use serde_json::Value;

use crate::collection::{Collection, CollectionRef, Item};
use crate::config::{EmbedOptions, FetchOptions, Hydration, OrmConfig, SaveOptions};
use crate::error::{ModelError, ModelResult};
use crate::model::{EntityRef, Slot};
use crate::relationships::{EmbedHook, Relationship, RelationshipType};
use crate::schema::{EmbedTree, ModelRegistry, Schema};
use crate::store::{DataSource, Row};
use crate::value::Conditions;

/// Relations engine bound to a data source
pub struct Orm {
    models: ModelRegistry,
    source: Rc<dyn DataSource>,
    config: OrmConfig,
}

impl std::fmt::Debug for Orm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("models", &self.models.models())
            .field("config", &self.config)
            .finish()
    }
}

impl Orm {
    pub fn new(models: ModelRegistry, source: Rc<dyn DataSource>) -> Self {
        Self {
            models,
            source,
            config: OrmConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn source(&self) -> &Rc<dyn DataSource> {
        &self.source
    }

    /// Build a new, not yet persisted entity from raw data
    pub fn create(&self, model: &str, data: Value) -> ModelResult<EntityRef> {
        self.models.create(model, data, false)
    }

    /// Fetch options using the configured default hydration
    pub fn options(&self) -> FetchOptions {
        FetchOptions::new(self.config.default_hydration)
    }

    /// Batch finder: every `model` row matching `options.conditions`, hydrated
    pub fn all(&self, model: &str, options: &FetchOptions) -> ModelResult<CollectionRef> {
        let schema = self.models.schema(model)?;
        let rows = self.source.fetch_all(
            schema.source_name(),
            &options.conditions,
            &options.fields,
        )?;
        tracing::debug!(
            "Fetched {} `{}` row(s) from `{}` as {:?}",
            rows.len(),
            model,
            schema.source_name(),
            options.hydration
        );

        let (schema, items) = match options.hydration {
            Hydration::Entity => {
                let items = self.hydrate(&schema, rows)?;
                (schema, items)
            }
            Hydration::Object => {
                let generic = self.models.generic_schema(model)?;
                let items = self.hydrate(&generic, rows)?;
                (generic, items)
            }
            Hydration::Array => {
                let items = rows
                    .into_iter()
                    .map(|row| Ok(Item::Row(Value::Object(schema.cast_row(row)?))))
                    .collect::<ModelResult<Vec<_>>>()?;
                (schema, items)
            }
        };

        let mut collection = Collection::from_items(Some(schema), items, true);
        collection.set_hydration(options.hydration);
        Ok(collection.into_ref())
    }

    /// Fetch a single entity by primary key
    pub fn find(&self, model: &str, id: impl Into<Value>) -> ModelResult<Option<EntityRef>> {
        let schema = self.models.schema(model)?;
        let options = FetchOptions::new(Hydration::Entity)
            .with_conditions(Conditions::new().eq(schema.key_name(), id));
        let collection = self.all(model, &options)?;
        let found = collection.borrow().get_at(0).and_then(Item::as_entity).cloned();
        Ok(found)
    }

    fn hydrate(&self, schema: &Rc<Schema>, rows: Vec<Row>) -> ModelResult<Vec<Item>> {
        rows.into_iter()
            .map(|row| self.models.hydrate(schema, row).map(Item::Entity))
            .collect()
    }

    /// Eager load dotted relation `paths` on every item of `collection`,
    /// one batch fetch per relation and level
    pub fn embed<S: AsRef<str>>(
        &self,
        collection: &CollectionRef,
        paths: &[S],
        options: &EmbedOptions,
    ) -> ModelResult<()> {
        let (model, current) = {
            let collection = collection.borrow();
            let model = collection.model().map(str::to_string).ok_or_else(|| {
                ModelError::Configuration(
                    "Can't embed relations on a collection without schema.".to_string(),
                )
            })?;
            (model, collection.hydration())
        };

        let tree = self.models.expand(&model, paths)?;
        if tree.depth() > self.config.max_embed_depth {
            return Err(ModelError::Configuration(format!(
                "Embed paths on `{}` are {} levels deep, the maximum is {}.",
                model,
                tree.depth(),
                self.config.max_embed_depth
            )));
        }

        let hydration = options.hydration.unwrap_or(current);
        self.embed_tree(&model, collection, &tree, "", hydration, options)
    }

    fn embed_tree(
        &self,
        model: &str,
        collection: &CollectionRef,
        tree: &EmbedTree,
        prefix: &str,
        hydration: Hydration,
        options: &EmbedOptions,
    ) -> ModelResult<()> {
        let schema = self.models.schema(model)?;
        for (name, child) in tree.children() {
            let relation = schema.relation(name)?;
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            };

            let mut fetch = FetchOptions::new(hydration).with_fields(relation.fields().clone());
            if let Some(conditions) = options.constraint(&path) {
                fetch = fetch.with_conditions(conditions.clone());
            }

            // Nested paths run on the related collection before it is attached
            let hook: Option<EmbedHook<'_>> = if child.is_empty() {
                None
            } else {
                let to = relation.to().to_string();
                Some(Box::new(move |related: &CollectionRef| {
                    self.embed_tree(&to, related, child, &path, hydration, options)
                }))
            };
            relation.embed_with(self, collection, &fetch, hook)?;
        }
        Ok(())
    }

    /// Eager load `paths` on a single entity
    pub fn embed_entity<S: AsRef<str>>(
        &self,
        entity: &EntityRef,
        paths: &[S],
        options: &EmbedOptions,
    ) -> ModelResult<()> {
        let schema = entity.borrow().schema().clone();
        let mut collection = Collection::with_schema(schema);
        collection.push(entity.clone());
        let collection = collection.into_ref();

        let result = self.embed(&collection, paths, options);
        collection.borrow_mut().clear();
        result
    }

    /// Lazy load a single relation of `entity` and return what was attached
    pub fn load(&self, entity: &EntityRef, name: &str) -> ModelResult<Slot> {
        self.embed_entity(entity, &[name], &EmbedOptions::new())?;
        let slot = entity.borrow().get(name).cloned().unwrap_or_else(Slot::null);
        Ok(slot)
    }

    /// Save `entity`, cascading into the relations named by `options.embed`
    pub fn save(&self, entity: &EntityRef, options: &SaveOptions) -> ModelResult<bool> {
        let model = entity.borrow().model().to_string();
        let tree = self.models.expand(&model, &options.embed)?;
        self.save_tree(entity, &tree)
    }

    /// Owners (belongsTo) are saved before the entity so their keys can be
    /// copied in, every other relation after it
    pub(crate) fn save_tree(&self, entity: &EntityRef, tree: &EmbedTree) -> ModelResult<bool> {
        let schema = entity.borrow().schema().clone();
        let relations = tree
            .children()
            .map(|(name, child)| Ok((schema.relation(name)?, child)))
            .collect::<ModelResult<Vec<(&Relationship, &EmbedTree)>>>()?;
        let (owners, dependents): (Vec<_>, Vec<_>) = relations
            .into_iter()
            .partition(|(relation, _)| relation.relationship_type() == RelationshipType::BelongsTo);

        let mut success = true;
        for (relation, child) in owners {
            success &= relation.save(self, entity, child)?;
        }
        success &= self.persist(entity)?;
        for (relation, child) in dependents {
            success &= relation.save(self, entity, child)?;
        }
        Ok(success)
    }

    /// Insert a new entity or update the modified fields of a persisted one
    fn persist(&self, entity: &EntityRef) -> ModelResult<bool> {
        let (schema, exists) = {
            let entity = entity.borrow();
            (entity.schema().clone(), entity.exists())
        };

        if !exists {
            let row = entity.borrow().to_row();
            let stored = self
                .source
                .insert(schema.source_name(), schema.key_name(), row)?;
            let stored = schema.cast_row(stored)?;
            let key = stored.get(schema.key_name()).cloned().unwrap_or_default();
            tracing::debug!("Inserted `{}` row `{}`", schema.model(), key);
            entity.borrow_mut().amend(Some(stored), true);
            return Ok(true);
        }

        let fields = entity.borrow().modified_fields();
        if fields.is_empty() {
            return Ok(true);
        }
        let (id, changes) = {
            let entity = entity.borrow();
            let changes: Row = fields
                .iter()
                .map(|field| (field.clone(), entity.value(field)))
                .collect();
            (entity.key_value(), changes)
        };
        let id = id.ok_or_else(|| {
            ModelError::DataIntegrity(format!(
                "Can't update a `{}` entity without `'{}'` key.",
                schema.model(),
                schema.key_name()
            ))
        })?;

        let updated = self
            .source
            .update(schema.source_name(), schema.key_name(), &id, changes)?;
        tracing::debug!(
            "Updated `{}` row `{}`: {}",
            schema.model(),
            id,
            fields.join(", ")
        );
        entity.borrow_mut().amend(None, true);
        Ok(updated)
    }

    /// Delete the stored row of `entity`
    pub fn delete(&self, entity: &EntityRef) -> ModelResult<bool> {
        let (schema, id) = {
            let entity = entity.borrow();
            (entity.schema().clone(), entity.key_value())
        };
        let id = id.ok_or_else(|| {
            ModelError::DataIntegrity(format!(
                "Can't delete a `{}` entity without `'{}'` key.",
                schema.model(),
                schema.key_name()
            ))
        })?;

        let deleted = self
            .source
            .delete(schema.source_name(), schema.key_name(), &id)?;
        tracing::debug!("Deleted `{}` row `{}`: {}", schema.model(), id, deleted);
        entity.borrow_mut().set_exists(false);
        Ok(deleted)
    }
}
