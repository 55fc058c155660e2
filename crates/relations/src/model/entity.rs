//! Entity - Schema-bound record holding scalar fields and related data
//!
//! A relation field of an entity is either absent (never fetched), null
//! (fetched, no match), a single related entity, a collection of related
//! entities, or a through view. Whenever a related entity or collection is
//! placed in or removed from a field, its [`Parents`] map is updated so the
//! back-references always mirror the forward references.
//!
//! Back-references are plain ids, forward references are strong: a graph whose
//! forward references form a cycle (an entity holding itself, two entities
//! holding each other) is only freed once one of those fields is unset.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::parents::{ObjectId, ParentHandle, Parents};
use crate::collection::{CollectionRef, Through};
use crate::schema::Schema;

/// Shared handle to an entity
pub type EntityRef = Rc<RefCell<Entity>>;

/// Content of an entity field
#[derive(Debug, Clone)]
pub enum Slot {
    /// Scalar or raw JSON value; `Null` marks a fetched relation without match
    Value(Value),
    /// belongsTo / hasOne
    One(EntityRef),
    /// hasMany
    Many(CollectionRef),
    /// hasManyThrough
    Through(Through),
}

impl Slot {
    pub fn null() -> Self {
        Slot::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Slot::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Slot::One(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Slot::Many(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_through(&self) -> Option<&Through> {
        match self {
            Slot::Through(through) => Some(through),
            _ => None,
        }
    }

    fn to_value_in(&self, ancestors: &mut Vec<ObjectId>) -> Value {
        match self {
            Slot::Value(value) => value.clone(),
            Slot::One(entity) => entity
                .try_borrow()
                .map(|entity| entity.to_value_in(ancestors))
                .unwrap_or(Value::Null),
            Slot::Many(collection) => collection
                .try_borrow()
                .map(|collection| collection.to_value_in(ancestors))
                .unwrap_or(Value::Null),
            Slot::Through(through) => through.to_value_in(ancestors),
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Value(value)
    }
}

impl From<EntityRef> for Slot {
    fn from(entity: EntityRef) -> Self {
        Slot::One(entity)
    }
}

/// A typed, schema-bound record
pub struct Entity {
    id: ObjectId,
    schema: Rc<Schema>,
    data: IndexMap<String, Slot>,
    original: IndexMap<String, Value>,
    exists: bool,
    parents: Parents,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .data
            .iter()
            .map(|(name, slot)| match slot {
                Slot::Value(value) => format!("{}={}", name, value),
                Slot::One(_) => format!("{}=<entity>", name),
                Slot::Many(_) => format!("{}=<collection>", name),
                Slot::Through(_) => format!("{}=<through>", name),
            })
            .collect();
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("model", &self.schema.model())
            .field("exists", &self.exists)
            .field("fields", &fields)
            .finish()
    }
}

impl Entity {
    /// Create a new, not yet persisted entity
    pub fn new(schema: Rc<Schema>) -> Self {
        Self {
            id: ObjectId::next(),
            schema,
            data: IndexMap::new(),
            original: IndexMap::new(),
            exists: false,
            parents: Parents::new(),
        }
    }

    /// Create an entity from scalar data; persisted data starts clean
    pub fn with_data(schema: Rc<Schema>, data: Map<String, Value>, exists: bool) -> Self {
        let mut entity = Self::new(schema);
        for (field, value) in data {
            entity.set_value(&field, value);
        }
        if exists {
            entity.amend(None, true);
        }
        entity
    }

    pub fn into_ref(self) -> EntityRef {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Handle under which this entity registers itself on its children
    pub fn handle(&self) -> ParentHandle {
        ParentHandle::Entity(self.id)
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> &str {
        self.schema.model()
    }

    /// Primary key value, if set and not null
    pub fn key_value(&self) -> Option<Value> {
        self.get_value(self.schema.key_name())
            .filter(|value| !value.is_null())
            .cloned()
    }

    pub fn has(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Slot> {
        self.data.get(field)
    }

    /// Scalar value of a field
    pub fn get_value(&self, field: &str) -> Option<&Value> {
        self.data.get(field).and_then(Slot::as_value)
    }

    /// Scalar value of a field, null when absent or relational
    pub fn value(&self, field: &str) -> Value {
        self.get_value(field).cloned().unwrap_or(Value::Null)
    }

    /// Related entity stored under `field`
    pub fn related(&self, field: &str) -> Option<EntityRef> {
        self.data.get(field).and_then(Slot::as_entity).cloned()
    }

    /// Related collection stored under `field`
    pub fn collection(&self, field: &str) -> Option<CollectionRef> {
        self.data.get(field).and_then(Slot::as_collection).cloned()
    }

    /// Through view stored under `field`
    pub fn through(&self, field: &str) -> Option<Through> {
        self.data.get(field).and_then(Slot::as_through).cloned()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_value(&mut self, field: &str, value: impl Into<Value>) {
        self.set(field, Slot::Value(value.into()));
    }

    /// Store a slot, keeping the parents maps of old and new content in sync
    pub fn set(&mut self, field: &str, slot: Slot) {
        if let Some(previous) = self.data.get(field).cloned() {
            self.unlink(field, &previous);
        }
        self.link(field, &slot);
        self.data.insert(field.to_string(), slot);
    }

    /// Remove a field, disconnecting whatever it referenced
    pub fn unset(&mut self, field: &str) -> Option<Slot> {
        let previous = self.data.shift_remove(field)?;
        self.unlink(field, &previous);
        Some(previous)
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// True when a scalar changed since the last amend or any related data is dirty
    pub fn modified(&self) -> bool {
        let mut seen = HashSet::new();
        self.modified_in(&mut seen)
    }

    pub(crate) fn modified_in(&self, seen: &mut HashSet<ObjectId>) -> bool {
        if !seen.insert(self.id) {
            return false;
        }

        for (field, slot) in &self.data {
            let dirty = match slot {
                Slot::Value(value) => {
                    !self.schema.has_relation(field) && self.original.get(field) != Some(value)
                }
                Slot::One(entity) => entity
                    .try_borrow()
                    .map(|entity| entity.modified_in(seen))
                    .unwrap_or(false),
                Slot::Many(collection) => collection
                    .try_borrow()
                    .map(|collection| collection.modified_in(seen))
                    .unwrap_or(false),
                // The junction collection behind the view is checked on its own field
                Slot::Through(_) => false,
            };
            if dirty {
                return true;
            }
        }

        self.original
            .keys()
            .any(|field| !matches!(self.data.get(field), Some(Slot::Value(_))))
    }

    /// Names of the scalar fields that differ from the last amend
    pub fn modified_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .data
            .iter()
            .filter_map(|(field, slot)| match slot {
                Slot::Value(value)
                    if !self.schema.has_relation(field)
                        && self.original.get(field) != Some(value) =>
                {
                    Some(field.clone())
                }
                _ => None,
            })
            .collect();
        for field in self.original.keys() {
            if !matches!(self.data.get(field), Some(Slot::Value(_))) {
                fields.push(field.clone());
            }
        }
        fields
    }

    /// Merge scalar data and mark the current state as persisted (or not)
    pub fn amend(&mut self, data: Option<Map<String, Value>>, exists: bool) {
        if let Some(data) = data {
            for (field, value) in data {
                self.set_value(&field, value);
            }
        }
        self.original = self
            .data
            .iter()
            .filter(|(field, _)| !self.schema.has_relation(field))
            .filter_map(|(field, slot)| slot.as_value().map(|v| (field.clone(), v.clone())))
            .collect();
        self.exists = exists;
    }

    /// Scalar fields, as sent to the data source
    pub fn to_row(&self) -> Map<String, Value> {
        self.data
            .iter()
            .filter(|(field, _)| !self.schema.has_relation(field))
            .filter_map(|(field, slot)| slot.as_value().map(|v| (field.clone(), v.clone())))
            .collect()
    }

    /// Export the entity and its loaded relations as JSON
    pub fn to_value(&self) -> Value {
        let mut ancestors = Vec::new();
        self.to_value_in(&mut ancestors)
    }

    pub(crate) fn to_value_in(&self, ancestors: &mut Vec<ObjectId>) -> Value {
        if ancestors.contains(&self.id) {
            return Value::Null;
        }
        ancestors.push(self.id);
        let map: Map<String, Value> = self
            .data
            .iter()
            .map(|(field, slot)| (field.clone(), slot.to_value_in(ancestors)))
            .collect();
        ancestors.pop();
        Value::Object(map)
    }

    pub fn parents(&self) -> &Parents {
        &self.parents
    }

    pub(crate) fn parents_mut(&mut self) -> &mut Parents {
        &mut self.parents
    }

    /// Forget every back-reference registered on this entity
    pub fn disconnect(&mut self) {
        self.parents.clear();
    }

    fn link(&mut self, field: &str, slot: &Slot) {
        let handle = self.handle();
        let me: *const Entity = self;
        match slot {
            Slot::One(child) => {
                if std::ptr::eq(child.as_ptr() as *const Entity, me) {
                    self.parents.insert(handle, field);
                } else if let Ok(mut child) = child.try_borrow_mut() {
                    child.parents.insert(handle, field);
                } else {
                    tracing::warn!("Skipped back-reference `{}` on a borrowed entity", field);
                }
            }
            Slot::Many(collection) => {
                if let Ok(mut collection) = collection.try_borrow_mut() {
                    collection.parents_mut().insert(handle, field);
                } else {
                    tracing::warn!("Skipped back-reference `{}` on a borrowed collection", field);
                }
            }
            Slot::Value(_) | Slot::Through(_) => {}
        }
    }

    fn unlink(&mut self, field: &str, slot: &Slot) {
        let handle = self.handle();
        let me: *const Entity = self;
        match slot {
            Slot::One(child) => {
                if std::ptr::eq(child.as_ptr() as *const Entity, me) {
                    self.parents.remove_if(handle, field);
                } else if let Ok(mut child) = child.try_borrow_mut() {
                    child.parents.remove_if(handle, field);
                }
            }
            Slot::Many(collection) => {
                if let Ok(mut collection) = collection.try_borrow_mut() {
                    collection.parents_mut().remove_if(handle, field);
                }
            }
            Slot::Value(_) | Slot::Through(_) => {}
        }
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        let handle = self.handle();
        for slot in self.data.values() {
            match slot {
                Slot::One(child) => {
                    if let Ok(mut child) = child.try_borrow_mut() {
                        child.parents.remove(handle);
                    }
                }
                Slot::Many(collection) => {
                    if let Ok(mut collection) = collection.try_borrow_mut() {
                        collection.parents_mut().remove(handle);
                    }
                }
                Slot::Value(_) | Slot::Through(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;
    use crate::schema::{FieldType, Schema};
    use serde_json::json;

    fn schema(model: &str) -> Rc<Schema> {
        Rc::new(
            Schema::new(model)
                .field("id", FieldType::Integer)
                .field("name", FieldType::String),
        )
    }

    #[test]
    fn test_with_data_persisted_is_clean() {
        let data = json!({"id": 1, "name": "amiga"});
        let entity = Entity::with_data(schema("Tag"), data.as_object().unwrap().clone(), true);
        assert!(entity.exists());
        assert!(!entity.modified());
        assert_eq!(entity.key_value(), Some(json!(1)));
    }

    #[test]
    fn test_modified_tracking() {
        let data = json!({"id": 1, "name": "amiga"});
        let mut entity = Entity::with_data(schema("Tag"), data.as_object().unwrap().clone(), true);

        entity.set_value("name", "atari");
        assert!(entity.modified());
        assert_eq!(entity.modified_fields(), vec!["name".to_string()]);

        entity.amend(None, true);
        assert!(!entity.modified());

        entity.unset("name");
        assert!(entity.modified());
    }

    #[test]
    fn test_nested_dirty_entity_marks_parent_modified() {
        let gallery = Entity::with_data(schema("Gallery"), Map::new(), true).into_ref();
        let image = Entity::with_data(schema("Image"), Map::new(), true).into_ref();
        image.borrow_mut().set("gallery", Slot::One(gallery.clone()));
        assert!(!image.borrow().modified());

        gallery.borrow_mut().set_value("name", "Holidays");
        assert!(image.borrow().modified());
    }

    #[test]
    fn test_set_and_unset_keep_parents_symmetric() {
        let gallery = Entity::new(schema("Gallery")).into_ref();
        let image = Entity::new(schema("Image")).into_ref();
        let handle = image.borrow().handle();

        image.borrow_mut().set("gallery", Slot::One(gallery.clone()));
        assert_eq!(gallery.borrow().parents().get(handle), Some("gallery"));

        let replacement = Entity::new(schema("Gallery")).into_ref();
        image.borrow_mut().set("gallery", Slot::One(replacement.clone()));
        assert!(!gallery.borrow().parents().contains(handle));
        assert!(replacement.borrow().parents().contains(handle));

        image.borrow_mut().unset("gallery");
        assert!(replacement.borrow().parents().is_empty());
    }

    #[test]
    fn test_shared_child_has_multiple_parents() {
        let gallery = Entity::new(schema("Gallery")).into_ref();
        let first = Entity::new(schema("Image")).into_ref();
        let second = Entity::new(schema("Image")).into_ref();

        first.borrow_mut().set("gallery", Slot::One(gallery.clone()));
        second.borrow_mut().set("gallery", Slot::One(gallery.clone()));
        assert_eq!(gallery.borrow().parents().len(), 2);

        drop(first);
        assert_eq!(gallery.borrow().parents().len(), 1);
        assert!(gallery.borrow().parents().contains(second.borrow().handle()));
    }

    #[test]
    fn test_collection_slot_registers_parent() {
        let gallery = Entity::new(schema("Gallery")).into_ref();
        let images = Collection::new().into_ref();
        gallery.borrow_mut().set("images", Slot::Many(images.clone()));

        let handle = gallery.borrow().handle();
        assert_eq!(images.borrow().parents().get(handle), Some("images"));
    }

    #[test]
    fn test_self_reference_and_cycle_safe_export() {
        let entity = Entity::new(schema("Node")).into_ref();
        entity.borrow_mut().set_value("id", 1);
        entity.borrow_mut().set("parent", Slot::One(entity.clone()));

        let handle = entity.borrow().handle();
        assert!(entity.borrow().parents().contains(handle));
        assert_eq!(entity.borrow().to_value(), json!({"id": 1, "parent": null}));

        assert_eq!(Rc::strong_count(&entity), 2);

        entity.borrow_mut().unset("parent");
        assert!(entity.borrow().parents().is_empty());
        assert_eq!(Rc::strong_count(&entity), 1);
    }

    #[test]
    fn test_to_row_skips_relations() {
        let mut entity = Entity::new(schema("Image"));
        entity.set_value("id", 3);
        entity.set("gallery", Slot::null());
        let row = entity.to_row();
        assert_eq!(row.get("id"), Some(&json!(3)));
        // `gallery` is not a declared relation of this bare schema, so it stays
        assert_eq!(row.get("gallery"), Some(&Value::Null));
    }
}
