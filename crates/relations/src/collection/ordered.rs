//! Ordered Collection - Keyed container of entities or raw rows
//!
//! Keys are integers or strings and keep insertion order. Every entity placed
//! in a collection registers the collection (and its key) in its parents map,
//! and every removal undoes it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::cursor::Cursor;
use super::index::KeyIndex;
use crate::config::Hydration;
use crate::error::{ModelError, ModelResult};
use crate::model::{EntityRef, ObjectId, ParentHandle, Parents};
use crate::schema::Schema;

/// Shared handle to a collection
pub type CollectionRef = Rc<RefCell<Collection>>;

/// Key of a collection element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKey {
    Index(i64),
    Name(String),
}

impl CollectionKey {
    pub fn is_index(&self) -> bool {
        matches!(self, CollectionKey::Index(_))
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKey::Index(index) => write!(f, "{}", index),
            CollectionKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for CollectionKey {
    fn from(index: i64) -> Self {
        CollectionKey::Index(index)
    }
}

impl From<&str> for CollectionKey {
    fn from(name: &str) -> Self {
        match name.parse::<i64>() {
            Ok(index) => CollectionKey::Index(index),
            Err(_) => CollectionKey::Name(name.to_string()),
        }
    }
}

impl TryFrom<&Value> for CollectionKey {
    type Error = ModelError;

    fn try_from(value: &Value) -> ModelResult<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(CollectionKey::Index).ok_or_else(|| {
                ModelError::Configuration(format!("Invalid index type `{}`", number))
            }),
            Value::String(name) => Ok(CollectionKey::from(name.as_str())),
            Value::Bool(flag) => Ok(CollectionKey::Index(i64::from(*flag))),
            other => Err(ModelError::Configuration(format!(
                "Invalid index type `{}`",
                other
            ))),
        }
    }
}

/// Collection element: a hydrated entity or a raw row
#[derive(Debug, Clone)]
pub enum Item {
    Entity(EntityRef),
    Row(Value),
}

impl Item {
    /// Value of a scalar field of the element
    pub fn value(&self, field: &str) -> Option<Value> {
        match self {
            Item::Entity(entity) => entity
                .try_borrow()
                .ok()
                .and_then(|entity| entity.get_value(field).cloned()),
            Item::Row(row) => row.get(field).cloned(),
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Item::Entity(entity) => Some(entity),
            Item::Row(_) => None,
        }
    }

    pub fn as_row(&self) -> Option<&Value> {
        match self {
            Item::Row(row) => Some(row),
            Item::Entity(_) => None,
        }
    }

    /// Identity for entities, equality for rows
    pub fn same(&self, other: &Item) -> bool {
        match (self, other) {
            (Item::Entity(a), Item::Entity(b)) => Rc::ptr_eq(a, b),
            (Item::Row(a), Item::Row(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut ancestors = Vec::new();
        self.to_value_in(&mut ancestors)
    }

    pub(crate) fn to_value_in(&self, ancestors: &mut Vec<ObjectId>) -> Value {
        match self {
            Item::Entity(entity) => entity
                .try_borrow()
                .map(|entity| entity.to_value_in(ancestors))
                .unwrap_or(Value::Null),
            Item::Row(row) => row.clone(),
        }
    }

    pub(crate) fn modified_in(&self, seen: &mut HashSet<ObjectId>) -> bool {
        match self {
            Item::Entity(entity) => entity
                .try_borrow()
                .map(|entity| entity.modified_in(seen))
                .unwrap_or(false),
            Item::Row(_) => false,
        }
    }
}

impl From<EntityRef> for Item {
    fn from(entity: EntityRef) -> Self {
        Item::Entity(entity)
    }
}

impl From<Value> for Item {
    fn from(row: Value) -> Self {
        Item::Row(row)
    }
}

/// Ordered, keyed container of entities or rows
pub struct Collection {
    id: ObjectId,
    schema: Option<Rc<Schema>>,
    hydration: Hydration,
    data: IndexMap<CollectionKey, Item>,
    next_index: i64,
    exists: bool,
    modified: bool,
    parents: Parents,
    cursor: Cursor,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.id)
            .field("model", &self.model())
            .field("len", &self.data.len())
            .field("exists", &self.exists)
            .field("modified", &self.modified)
            .finish()
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    /// Create an empty collection without schema binding
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            schema: None,
            hydration: Hydration::Entity,
            data: IndexMap::new(),
            next_index: 0,
            exists: false,
            modified: false,
            parents: Parents::new(),
            cursor: Cursor::new(),
        }
    }

    /// Create an empty collection bound to a schema
    pub fn with_schema(schema: Rc<Schema>) -> Self {
        let mut collection = Self::new();
        collection.schema = Some(schema);
        collection
    }

    /// Build a clean collection from fetched items
    pub fn from_items(schema: Option<Rc<Schema>>, items: Vec<Item>, exists: bool) -> Self {
        let mut collection = Self::new();
        collection.schema = schema;
        for item in items {
            collection.push(item);
        }
        collection.amend(exists);
        collection
    }

    pub fn into_ref(self) -> CollectionRef {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn handle(&self) -> ParentHandle {
        ParentHandle::Collection(self.id)
    }

    pub fn schema(&self) -> Option<&Rc<Schema>> {
        self.schema.as_ref()
    }

    pub fn set_schema(&mut self, schema: Rc<Schema>) {
        self.schema = Some(schema);
    }

    pub fn model(&self) -> Option<&str> {
        self.schema.as_deref().map(Schema::model)
    }

    pub fn hydration(&self) -> Hydration {
        self.hydration
    }

    pub fn set_hydration(&mut self, hydration: Hydration) {
        self.hydration = hydration;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> Vec<CollectionKey> {
        self.data.keys().cloned().collect()
    }

    pub fn items(&self) -> Vec<Item> {
        self.data.values().cloned().collect()
    }

    /// Entities of the collection, rows are skipped
    pub fn entities(&self) -> Vec<EntityRef> {
        self.data
            .values()
            .filter_map(Item::as_entity)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CollectionKey, &Item)> {
        self.data.iter()
    }

    pub fn get(&self, key: &CollectionKey) -> Option<&Item> {
        self.data.get(key)
    }

    pub fn get_at(&self, position: usize) -> Option<&Item> {
        self.data.get_index(position).map(|(_, item)| item)
    }

    pub fn key_at(&self, position: usize) -> Option<&CollectionKey> {
        self.data.get_index(position).map(|(key, _)| key)
    }

    pub fn position(&self, key: &CollectionKey) -> Option<usize> {
        self.data.get_index_of(key)
    }

    /// Mutable access to a raw row, used when attaching related arrays
    pub(crate) fn row_mut(&mut self, position: usize) -> Option<&mut Value> {
        match self.data.get_index_mut(position) {
            Some((_, Item::Row(row))) => Some(row),
            _ => None,
        }
    }

    /// Append an item under the next integer key
    pub fn push(&mut self, item: impl Into<Item>) -> CollectionKey {
        let key = CollectionKey::Index(self.next_index);
        self.next_index += 1;
        self.insert(key.clone(), item.into());
        key
    }

    /// Store an item under `key`, replacing (in place) whatever was there
    pub fn set(&mut self, key: CollectionKey, item: impl Into<Item>) -> Option<Item> {
        if let CollectionKey::Index(index) = key {
            if index >= self.next_index {
                self.next_index = index + 1;
            }
        }
        self.insert(key, item.into())
    }

    /// Remove the item under `key`
    pub fn unset(&mut self, key: &CollectionKey) -> Option<Item> {
        let (position, key, item) = self.data.shift_remove_full(key)?;
        self.cursor.removed(position);
        self.detach(&key, &item);
        self.modified = true;
        Some(item)
    }

    /// Remove `length` items starting at `offset`; integer keys are renumbered
    pub fn splice(&mut self, offset: usize, length: usize) -> Vec<Item> {
        let end = offset.saturating_add(length).min(self.data.len());
        if offset >= end {
            return Vec::new();
        }

        let removed: Vec<(CollectionKey, Item)> = self.data.drain(offset..end).collect();
        for _ in offset..end {
            self.cursor.removed(offset);
        }
        for (key, item) in &removed {
            self.detach(key, item);
        }

        let handle = self.handle();
        let mut next_index = 0;
        let data = std::mem::take(&mut self.data);
        for (key, item) in data {
            let key = match key {
                CollectionKey::Index(old) => {
                    let renumbered = next_index;
                    next_index += 1;
                    let key = CollectionKey::Index(renumbered);
                    if old != renumbered {
                        if let Item::Entity(entity) = &item {
                            if let Ok(mut entity) = entity.try_borrow_mut() {
                                entity.parents_mut().insert(handle, key.to_string());
                            }
                        }
                    }
                    key
                }
                named => named,
            };
            self.data.insert(key, item);
        }
        self.next_index = next_index;
        self.modified = true;

        removed.into_iter().map(|(_, item)| item).collect()
    }

    /// Remove every item
    pub fn clear(&mut self) {
        let data = std::mem::take(&mut self.data);
        for (key, item) in &data {
            self.detach(key, item);
        }
        self.next_index = 0;
        self.cursor.rewind();
        self.modified = true;
    }

    /// Index the collection by the value of `field`
    pub fn index_by(&self, field: &str) -> KeyIndex {
        let mut index = KeyIndex::new();
        for (position, item) in self.data.values().enumerate() {
            if let Some(value) = item.value(field) {
                index.insert(&value, position);
            }
        }
        index
    }

    /// Position of `item`, searching from `from`
    pub fn index_of(&self, item: &Item, from: usize) -> Option<usize> {
        self.data
            .values()
            .enumerate()
            .skip(from)
            .find(|(_, candidate)| candidate.same(item))
            .map(|(position, _)| position)
    }

    pub fn contains(&self, item: &Item) -> bool {
        self.index_of(item, 0).is_some()
    }

    pub fn rewind(&mut self) {
        self.cursor.rewind();
    }

    /// Item under the cursor
    pub fn current(&self) -> Option<Item> {
        self.get_at(self.cursor.position()).cloned()
    }

    /// Key under the cursor
    pub fn key(&self) -> Option<CollectionKey> {
        self.key_at(self.cursor.position()).cloned()
    }

    /// Advance the cursor and return the item it lands on
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Item> {
        self.cursor.advance();
        self.current()
    }

    pub fn valid(&self) -> bool {
        self.cursor.position() < self.data.len()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// True when the collection changed since the last amend or a member is dirty
    pub fn modified(&self) -> bool {
        let mut seen = HashSet::new();
        self.modified_in(&mut seen)
    }

    pub(crate) fn modified_in(&self, seen: &mut HashSet<ObjectId>) -> bool {
        if !seen.insert(self.id) {
            return false;
        }
        if self.modified {
            return true;
        }
        self.data.values().any(|item| item.modified_in(seen))
    }

    /// Mark the current content as persisted (or not)
    pub fn amend(&mut self, exists: bool) {
        self.modified = false;
        self.exists = exists;
    }

    /// Export as a JSON array, or an object when string keys are present
    pub fn to_value(&self) -> Value {
        let mut ancestors = Vec::new();
        self.to_value_in(&mut ancestors)
    }

    pub(crate) fn to_value_in(&self, ancestors: &mut Vec<ObjectId>) -> Value {
        if self.data.keys().all(CollectionKey::is_index) {
            Value::Array(
                self.data
                    .values()
                    .map(|item| item.to_value_in(ancestors))
                    .collect(),
            )
        } else {
            let map: Map<String, Value> = self
                .data
                .iter()
                .map(|(key, item)| (key.to_string(), item.to_value_in(ancestors)))
                .collect();
            Value::Object(map)
        }
    }

    pub fn parents(&self) -> &Parents {
        &self.parents
    }

    pub(crate) fn parents_mut(&mut self) -> &mut Parents {
        &mut self.parents
    }

    /// Forget every back-reference registered on this collection
    pub fn disconnect(&mut self) {
        self.parents.clear();
    }

    fn insert(&mut self, key: CollectionKey, item: Item) -> Option<Item> {
        let (position, previous) = self.data.insert_full(key.clone(), item.clone());
        if let Some(previous) = &previous {
            self.detach(&key, previous);
        } else {
            self.cursor.inserted(position);
        }
        self.attach(&key, &item);
        self.modified = true;
        previous
    }

    fn attach(&self, key: &CollectionKey, item: &Item) {
        if let Item::Entity(entity) = item {
            match entity.try_borrow_mut() {
                Ok(mut entity) => entity.parents_mut().insert(self.handle(), key.to_string()),
                Err(_) => tracing::warn!(
                    "Skipped back-reference `{}` of collection {} on a borrowed entity",
                    key,
                    self.id
                ),
            }
        }
    }

    fn detach(&self, key: &CollectionKey, item: &Item) {
        if let Item::Entity(entity) = item {
            if let Ok(mut entity) = entity.try_borrow_mut() {
                entity
                    .parents_mut()
                    .remove_if(self.handle(), &key.to_string());
            }
        }
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        let handle = self.handle();
        for item in self.data.values() {
            if let Item::Entity(entity) = item {
                if let Ok(mut entity) = entity.try_borrow_mut() {
                    entity.parents_mut().remove(handle);
                }
            }
        }
    }
}
