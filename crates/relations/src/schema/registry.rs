//! Model Registry - Schemas and relationship bindings, built fail-fast
//!
//! All schemas are declared first, then relationships are bound by model
//! name. [`RegistryBuilder::build`] constructs every relationship, resolving
//! has-many-through bindings once the relations they compose exist, and
//! freezes the result in a [`ModelRegistry`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::path::EmbedTree;
use super::Schema;
use crate::collection::{Collection, CollectionKey, CollectionRef, Item, Through, ThroughConfig};
use crate::config::{non_empty, RelationshipConfig};
use crate::conventions::Conventions;
use crate::error::{ModelError, ModelResult};
use crate::model::{Entity, EntityRef, Slot};
use crate::relationships::relation::Naming;
use crate::relationships::{HasManyThrough, Relationship, RelationshipType};

/// Collects schemas and relationship bindings
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    conventions: Conventions,
    schemas: IndexMap<String, Schema>,
    bindings: Vec<(String, RelationshipConfig)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }

    /// Register a schema
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.insert(schema.model().to_string(), schema);
        self
    }

    /// Bind a relationship on `model`; `from` defaults to `model`
    pub fn bind(mut self, model: impl Into<String>, config: RelationshipConfig) -> Self {
        self.bindings.push((model.into(), config));
        self
    }

    /// Build every relationship and freeze the schemas
    pub fn build(self) -> ModelResult<ModelRegistry> {
        let RegistryBuilder {
            conventions,
            mut schemas,
            bindings,
        } = self;

        for schema in schemas.values_mut() {
            if !schema.has_source() {
                let source = conventions.source(schema.model())?;
                schema.set_source(source);
            }
            if !schema.has_key() {
                let key = conventions.primary_key(schema.model())?;
                schema.set_key(key);
            }
        }

        let primary_keys: HashMap<String, String> = schemas
            .iter()
            .map(|(model, schema)| (model.clone(), schema.key_name().to_string()))
            .collect();
        let naming = Naming {
            conventions: &conventions,
            primary_keys: &primary_keys,
        };

        let mut composites = Vec::new();
        for (model, mut config) in bindings {
            if non_empty(&config.from).is_none() {
                config.from = Some(model.clone());
            }
            if !schemas.contains_key(&model) {
                return Err(unknown_model(&model));
            }

            if config.kind == RelationshipType::HasManyThrough {
                composites.push((model, config));
                continue;
            }

            if let Some(to) = non_empty(&config.to) {
                if !schemas.contains_key(to) {
                    return Err(unknown_model(to));
                }
            }
            let relationship = Relationship::new(config, &naming)?;
            tracing::debug!(
                "Bound {} `{}` on `{}`",
                relationship.relationship_type().as_str(),
                relationship.name(),
                model
            );
            if let Some(schema) = schemas.get_mut(&model) {
                schema.bind(relationship);
            }
        }

        // hasManyThrough may compose other hasManyThrough relations, resolve in passes
        while !composites.is_empty() {
            let mut pending = Vec::new();
            let mut progressed = false;

            for (model, mut config) in composites {
                let Some(through_name) = non_empty(&config.through).map(str::to_string) else {
                    return Err(ModelError::Configuration(format!(
                        "The hasManyThrough relation on `{}` needs a `'through'` option.",
                        model
                    )));
                };
                if non_empty(&config.using).is_none() {
                    let name = config.name_option().ok_or_else(|| {
                        ModelError::Configuration(format!(
                            "The hasManyThrough relation `'{}'` on `{}` needs a `'using'` option or a name.",
                            through_name, model
                        ))
                    })?;
                    config.using = Some(conventions.using_name(name)?);
                }
                let using_name = config.using.clone().unwrap_or_default();

                let through = schemas
                    .get(&model)
                    .and_then(|schema| schema.relation(&through_name).ok())
                    .cloned();
                let using = through
                    .as_ref()
                    .and_then(|through| schemas.get(through.to()))
                    .and_then(|junction| junction.relation(&using_name).ok())
                    .cloned();

                let (Some(through), Some(using)) = (through, using) else {
                    pending.push((model, config));
                    continue;
                };

                let relationship = Relationship::HasManyThrough(HasManyThrough::new(
                    config,
                    &conventions,
                    &through,
                    &using,
                )?);
                tracing::debug!(
                    "Bound hasManyThrough `{}` on `{}` through `{}`",
                    relationship.name(),
                    model,
                    through_name
                );
                if let Some(schema) = schemas.get_mut(&model) {
                    // Only pivot rows are owned by the composition
                    if relationship.is_pivot() {
                        if let Some(through) = schema.relation_mut(&through_name) {
                            through.mark_junction();
                        }
                    }
                    schema.bind(relationship);
                }
                progressed = true;
            }

            if !progressed {
                let unresolved: Vec<String> = pending
                    .iter()
                    .map(|(model, config)| {
                        format!(
                            "{}.{}",
                            model,
                            config.name_option().unwrap_or_default()
                        )
                    })
                    .collect();
                return Err(ModelError::Lookup(format!(
                    "Unable to resolve the `'through'`/`'using'` relations of {}.",
                    unresolved.join(", ")
                )));
            }
            composites = pending;
        }

        Ok(ModelRegistry {
            schemas: schemas
                .into_iter()
                .map(|(model, schema)| (model, Rc::new(schema)))
                .collect(),
            generic: RefCell::new(HashMap::new()),
            conventions,
        })
    }
}

fn unknown_model(model: &str) -> ModelError {
    ModelError::Lookup(format!("Unknown model `{}`.", model))
}

/// Frozen set of schemas, with entity construction and relation-aware casting
#[derive(Debug)]
pub struct ModelRegistry {
    schemas: HashMap<String, Rc<Schema>>,
    generic: RefCell<HashMap<String, Rc<Schema>>>,
    conventions: Conventions,
}

impl ModelRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn schema(&self, model: &str) -> ModelResult<Rc<Schema>> {
        self.schemas
            .get(model)
            .cloned()
            .ok_or_else(|| unknown_model(model))
    }

    /// Field-less twin of a schema, used for object hydration
    pub fn generic_schema(&self, model: &str) -> ModelResult<Rc<Schema>> {
        if let Some(schema) = self.generic.borrow().get(model) {
            return Ok(schema.clone());
        }
        let schema = Rc::new(self.schema(model)?.generic());
        self.generic
            .borrow_mut()
            .insert(model.to_string(), schema.clone());
        Ok(schema)
    }

    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    /// Build an entity from raw data, nested relation data included
    pub fn create(&self, model: &str, data: Value, exists: bool) -> ModelResult<EntityRef> {
        let schema = self.schema(model)?;
        let Value::Object(data) = data else {
            return Err(ModelError::Cast(format!(
                "`{}` data must be an object, got `{}`",
                model, data
            )));
        };

        let entity = Entity::new(schema).into_ref();
        for (field, raw) in data {
            self.assign(&entity, &field, raw, exists)?;
        }
        if exists {
            entity.borrow_mut().amend(None, true);
        }
        Ok(entity)
    }

    /// Build a persisted entity from a fetched scalar row
    pub fn hydrate(&self, schema: &Rc<Schema>, row: Map<String, Value>) -> ModelResult<EntityRef> {
        let row = schema.cast_row(row)?;
        Ok(Entity::with_data(schema.clone(), row, true).into_ref())
    }

    /// Assign a raw value to a field of `entity`.
    ///
    /// Scalar fields are cast to their declared type. Relation fields accept
    /// an object (single relations), an array (hasMany) or an array of
    /// targets (hasManyThrough, reconciled against the junction rows).
    pub fn assign(&self, entity: &EntityRef, field: &str, raw: Value, exists: bool) -> ModelResult<()> {
        let schema = entity.borrow().schema().clone();
        let Ok(relation) = schema.relation(field) else {
            let value = schema.cast(field, raw)?;
            entity.borrow_mut().set_value(field, value);
            return Ok(());
        };

        if raw.is_null() {
            entity.borrow_mut().set(field, Slot::null());
            return Ok(());
        }

        match relation.relationship_type() {
            RelationshipType::BelongsTo | RelationshipType::HasOne => {
                let related = self.create(relation.to(), raw, exists)?;
                entity.borrow_mut().set(field, Slot::One(related));
            }
            RelationshipType::HasMany => {
                let collection = self.collection(relation.to(), raw, exists)?;
                entity.borrow_mut().set(field, Slot::Many(collection));
            }
            RelationshipType::HasManyThrough => {
                let Value::Array(targets) = raw else {
                    return Err(relation_shape(field, &raw));
                };
                let targets = targets
                    .into_iter()
                    .map(|target| self.create(relation.to(), target, exists))
                    .collect::<ModelResult<Vec<_>>>()?;

                if !relation.is_pivot() {
                    let targets = targets.into_iter().map(Item::Entity).collect();
                    let collection =
                        Collection::from_items(Some(self.schema(relation.to())?), targets, exists);
                    entity
                        .borrow_mut()
                        .set(field, Slot::Many(collection.into_ref()));
                    return Ok(());
                }

                let through = relation.through().unwrap_or_default().to_string();
                let using = relation.using().unwrap_or_default().to_string();
                let junction_model = schema.relation(&through)?.to().to_string();
                let view = Through::new(ThroughConfig {
                    parent: entity.clone(),
                    through,
                    using,
                    junction: self.schema(&junction_model)?,
                    data: Some(targets),
                })?;
                entity.borrow_mut().set(field, Slot::Through(view));
            }
        }
        Ok(())
    }

    /// Append raw data to a collection, casting it through the collection schema
    pub fn append(&self, collection: &CollectionRef, raw: Value) -> ModelResult<CollectionKey> {
        let schema = collection.borrow().schema().cloned();
        let item = match (schema, raw) {
            (Some(schema), raw @ Value::Object(_)) => {
                Item::Entity(self.create(schema.model(), raw, false)?)
            }
            (None, _) => {
                return Err(ModelError::Configuration(
                    "Can't cast data for a collection without schema.".to_string(),
                ))
            }
            (Some(schema), other) => {
                return Err(ModelError::Cast(format!(
                    "Can't append `{}` to a `{}` collection",
                    other,
                    schema.model()
                )))
            }
        };
        let key = collection.borrow_mut().push(item);
        Ok(key)
    }

    /// Expand dotted paths from `model`, checking every segment names a relation
    pub fn expand<S: AsRef<str>>(&self, model: &str, paths: &[S]) -> ModelResult<EmbedTree> {
        let tree = EmbedTree::from_paths(paths);
        self.validate(model, &tree)?;
        Ok(tree)
    }

    fn validate(&self, model: &str, tree: &EmbedTree) -> ModelResult<()> {
        let schema = self.schema(model)?;
        for (name, child) in tree.children() {
            let relation = schema.relation(name)?;
            self.validate(relation.to(), child)?;
        }
        Ok(())
    }

    fn collection(&self, model: &str, raw: Value, exists: bool) -> ModelResult<CollectionRef> {
        let Value::Array(items) = raw else {
            return Err(relation_shape(model, &raw));
        };
        let schema = self.schema(model)?;
        let mut collection = Collection::with_schema(schema);
        for raw in items {
            let item = match raw {
                raw @ Value::Object(_) => Item::Entity(self.create(model, raw, exists)?),
                other => return Err(relation_shape(model, &other)),
            };
            collection.push(item);
        }
        if exists {
            collection.amend(true);
        }
        Ok(collection.into_ref())
    }
}

fn relation_shape(field: &str, raw: &Value) -> ModelError {
    ModelError::Cast(format!("Invalid related data for `{}`: `{}`", field, raw))
}
