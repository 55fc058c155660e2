//! Through View - Many-to-many projection over a junction collection
//!
//! A [`Through`] stores nothing itself. It resolves the junction collection
//! held by its parent entity (the `through` field) and maps every junction
//! row to the entity stored in its `using` field, so `image.tags` reads like
//! a collection of tags while the data lives in `image.images_tags[].tag`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::ordered::{Collection, CollectionKey, CollectionRef, Item};
use crate::error::{ModelError, ModelResult};
use crate::model::{Entity, EntityRef, ObjectId, Slot};
use crate::relationships::metadata::Keys;
use crate::schema::Schema;
use crate::value::index_key;

/// Construction options of a through view
#[derive(Debug, Clone)]
pub struct ThroughConfig {
    /// Entity owning the junction collection
    pub parent: EntityRef,
    /// Field of the parent holding the junction collection
    pub through: String,
    /// Field of each junction entity holding the target entity
    pub using: String,
    /// Schema of the junction entities
    pub junction: Rc<Schema>,
    /// Replacement targets, reconciled against the existing junction rows
    pub data: Option<Vec<EntityRef>>,
}

/// Virtual collection of the targets of a many-to-many relation
#[derive(Debug, Clone)]
pub struct Through {
    parent: Weak<RefCell<Entity>>,
    through: String,
    using: String,
    junction: Rc<Schema>,
    keys: Keys,
}

impl Through {
    /// Build a view, creating the junction collection when the parent has none
    /// and reconciling it with `data` when given.
    pub fn new(config: ThroughConfig) -> ModelResult<Self> {
        let ThroughConfig {
            parent,
            through,
            using,
            junction,
            data,
        } = config;

        for (name, value) in [("through", &through), ("using", &using)] {
            if value.is_empty() {
                return Err(ModelError::Configuration(format!(
                    "Invalid through collection, `'{}'` is empty.",
                    name
                )));
            }
        }

        let keys = junction.relation(&using)?.keys().clone();
        let view = Self {
            parent: Rc::downgrade(&parent),
            through,
            using,
            junction,
            keys,
        };

        view.collection()?;
        if let Some(data) = data {
            view.amend(data)?;
        }
        Ok(view)
    }

    /// Build a view over the existing junction collection
    pub fn view(
        parent: &EntityRef,
        through: impl Into<String>,
        using: impl Into<String>,
        junction: Rc<Schema>,
    ) -> ModelResult<Self> {
        Self::new(ThroughConfig {
            parent: parent.clone(),
            through: through.into(),
            using: using.into(),
            junction,
            data: None,
        })
    }

    pub fn through(&self) -> &str {
        &self.through
    }

    pub fn using(&self) -> &str {
        &self.using
    }

    /// The junction collection behind the view
    pub fn collection(&self) -> ModelResult<CollectionRef> {
        let parent = self.parent.upgrade().ok_or_else(|| {
            ModelError::DataIntegrity(format!(
                "The parent of the `'{}'` through collection no longer exists.",
                self.through
            ))
        })?;

        if let Some(collection) = self.existing() {
            return Ok(collection);
        }

        let collection = Collection::with_schema(self.junction.clone()).into_ref();
        parent
            .try_borrow_mut()
            .map_err(|_| {
                ModelError::DataIntegrity(format!(
                    "The parent of the `'{}'` through collection is in use.",
                    self.through
                ))
            })?
            .set(&self.through, Slot::Many(collection.clone()));
        Ok(collection)
    }

    /// The junction collection, when the parent holds one
    fn existing(&self) -> Option<CollectionRef> {
        let parent = self.parent.upgrade()?;
        let parent = parent.try_borrow().ok()?;
        parent.collection(&self.through)
    }

    /// Reconcile the junction rows with a new list of targets.
    ///
    /// Rows whose target key matches an item are kept in place and point to
    /// that item; rows without match (or without key) are spliced out; items
    /// without row get a new junction entity appended.
    pub fn amend(&self, items: Vec<EntityRef>) -> ModelResult<()> {
        let collection = self.collection()?;
        let mut pending: Vec<Option<(Option<String>, EntityRef)>> = items
            .into_iter()
            .map(|item| {
                let key = item.try_borrow().ok().and_then(|item| {
                    item.get_value(&self.keys.to).and_then(index_key)
                });
                Some((key, item))
            })
            .collect();

        let mut collection = collection.borrow_mut();
        let mut position = 0;
        while position < collection.len() {
            let row_key = collection
                .get_at(position)
                .and_then(|row| self.target_key(row));

            let matched = row_key.as_ref().and_then(|row_key| {
                pending.iter().position(|candidate| {
                    matches!(candidate, Some((Some(key), _)) if key == row_key)
                })
            });

            match matched.and_then(|index| pending[index].take()) {
                Some((_, item)) => {
                    if let Some(Item::Entity(row)) = collection.get_at(position) {
                        self.repoint(row, item);
                    }
                    position += 1;
                }
                None => {
                    collection.splice(position, 1);
                }
            }
        }

        for (_, item) in pending.into_iter().flatten() {
            let row = self.junction_row(item);
            collection.push(row);
        }
        Ok(())
    }

    /// Append a target through a new junction row
    pub fn push(&self, item: EntityRef) -> ModelResult<CollectionKey> {
        let collection = self.collection()?;
        let row = self.junction_row(item);
        let key = collection.borrow_mut().push(row);
        Ok(key)
    }

    /// Point the junction row at `position` to another target
    pub fn set(&self, position: usize, item: EntityRef) -> ModelResult<()> {
        let collection = self.collection()?;
        let row = collection.borrow().get_at(position).cloned();
        match row {
            Some(Item::Entity(row)) => {
                self.repoint(&row, item);
                Ok(())
            }
            Some(Item::Row(_)) => {
                let key = collection.borrow().key_at(position).cloned();
                if let Some(key) = key {
                    let row = self.junction_row(item);
                    collection.borrow_mut().set(key, row);
                }
                Ok(())
            }
            None if position == collection.borrow().len() => self.push(item).map(|_| ()),
            None => Err(ModelError::Lookup(format!(
                "No junction row at position {} of `'{}'`.",
                position, self.through
            ))),
        }
    }

    /// Remove the junction row at `position`
    pub fn unset(&self, position: usize) -> ModelResult<Option<Item>> {
        let collection = self.collection()?;
        let key = collection.borrow().key_at(position).cloned();
        let removed = match key {
            Some(key) => collection.borrow_mut().unset(&key),
            None => None,
        };
        Ok(removed.map(|row| self.project(&row)))
    }

    /// Target at `position`, null when the junction row has none
    pub fn get(&self, position: usize) -> ModelResult<Option<Item>> {
        let collection = self.collection()?;
        let row = collection.borrow().get_at(position).cloned();
        Ok(row.map(|row| self.project(&row)))
    }

    /// Targets in junction row order
    pub fn items(&self) -> ModelResult<Vec<Item>> {
        let collection = self.collection()?;
        let rows = collection.borrow().items();
        Ok(rows.iter().map(|row| self.project(row)).collect())
    }

    pub fn keys(&self) -> ModelResult<Vec<CollectionKey>> {
        Ok(self.collection()?.borrow().keys())
    }

    /// Position of a target, searching from `from`
    pub fn index_of(&self, item: &Item, from: usize) -> ModelResult<Option<usize>> {
        Ok(self
            .items()?
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, candidate)| candidate.same(item))
            .map(|(position, _)| position))
    }

    pub fn len(&self) -> ModelResult<usize> {
        Ok(self.collection()?.borrow().len())
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn modified(&self) -> ModelResult<bool> {
        Ok(self.collection()?.borrow().modified())
    }

    pub fn to_value(&self) -> Value {
        let mut ancestors = Vec::new();
        self.to_value_in(&mut ancestors)
    }

    pub(crate) fn to_value_in(&self, ancestors: &mut Vec<ObjectId>) -> Value {
        let Some(collection) = self.existing() else {
            return Value::Array(Vec::new());
        };
        let Ok(rows) = collection.try_borrow().map(|rows| rows.items()) else {
            return Value::Null;
        };
        Value::Array(
            rows.iter()
                .map(|row| self.project(row).to_value_in(ancestors))
                .collect(),
        )
    }

    fn project(&self, row: &Item) -> Item {
        match row {
            Item::Entity(row) => match row.try_borrow().ok().and_then(|row| row.related(&self.using)) {
                Some(target) => Item::Entity(target),
                None => Item::Row(Value::Null),
            },
            Item::Row(row) => Item::Row(row.get(&self.using).cloned().unwrap_or(Value::Null)),
        }
    }

    /// Target key referenced by a junction row
    fn target_key(&self, row: &Item) -> Option<String> {
        match row {
            Item::Entity(row) => {
                let row = row.try_borrow().ok()?;
                row.get_value(&self.keys.from)
                    .and_then(index_key)
                    .or_else(|| {
                        let target = row.related(&self.using)?;
                        let target = target.try_borrow().ok()?;
                        target.get_value(&self.keys.to).and_then(index_key)
                    })
            }
            Item::Row(row) => row
                .get(&self.keys.from)
                .and_then(index_key)
                .or_else(|| row.get(&self.using)?.get(&self.keys.to).and_then(index_key)),
        }
    }

    /// Point a junction row to `item`, keeping its foreign key in step
    fn repoint(&self, row: &EntityRef, item: EntityRef) {
        let key = item
            .try_borrow()
            .ok()
            .and_then(|item| item.get_value(&self.keys.to).cloned())
            .filter(|key| !key.is_null());
        let mut row = row.borrow_mut();
        if let Some(key) = key {
            if row.get_value(&self.keys.from).and_then(index_key) != index_key(&key) {
                row.set_value(&self.keys.from, key);
            }
        }
        row.set(&self.using, Slot::One(item));
    }

    fn junction_row(&self, item: EntityRef) -> EntityRef {
        let key = item
            .try_borrow()
            .ok()
            .and_then(|item| item.get_value(&self.keys.to).cloned());
        let mut row = Entity::new(self.junction.clone());
        if let Some(key) = key.filter(|key| !key.is_null()) {
            row.set_value(&self.keys.from, key);
        }
        row.set(&self.using, Slot::One(item));
        row.into_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures;
    use serde_json::json;

    fn image_with_junction(registry: &crate::schema::ModelRegistry, tags: &[i64]) -> EntityRef {
        let image = registry
            .create("Image", json!({"id": 1, "name": "amiga.jpg"}), true)
            .unwrap();
        let junction = registry.schema("ImageTag").unwrap();
        let mut rows = Collection::with_schema(junction.clone());
        for (index, tag) in tags.iter().enumerate() {
            let row = registry
                .create(
                    "ImageTag",
                    json!({"id": 100 + index as i64, "image_id": 1, "tag_id": tag}),
                    true,
                )
                .unwrap();
            rows.push(row);
        }
        rows.amend(true);
        image
            .borrow_mut()
            .set("images_tags", Slot::Many(rows.into_ref()));
        image
    }

    fn tag(registry: &crate::schema::ModelRegistry, id: i64) -> EntityRef {
        registry
            .create("Tag", json!({"id": id, "name": format!("tag{}", id)}), true)
            .unwrap()
    }

    #[test]
    fn test_new_requires_through_and_using() {
        let registry = fixtures::registry();
        let image = registry.create("Image", json!({"id": 1}), true).unwrap();
        let junction = registry.schema("ImageTag").unwrap();

        let err = Through::view(&image, "", "tag", junction.clone()).unwrap_err();
        assert!(err.is_configuration());
        let err = Through::view(&image, "images_tags", "", junction).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_view_creates_missing_junction_collection() {
        let registry = fixtures::registry();
        let image = registry.create("Image", json!({"id": 1}), true).unwrap();
        let junction = registry.schema("ImageTag").unwrap();

        let view = Through::view(&image, "images_tags", "tag", junction).unwrap();
        assert_eq!(view.len().unwrap(), 0);
        assert!(image.borrow().collection("images_tags").is_some());
    }

    #[test]
    fn test_pivot_reconciliation_keeps_matching_rows() {
        let registry = fixtures::registry();
        // Existing junction rows: j100 -> tag 10 (X), j101 -> tag 30 (Z)
        let image = image_with_junction(&registry, &[10, 30]);
        let kept_row = image
            .borrow()
            .collection("images_tags")
            .and_then(|rows| rows.borrow().get_at(0).cloned())
            .and_then(|row| row.as_entity().cloned())
            .unwrap();

        let x = tag(&registry, 10);
        let y = tag(&registry, 20);
        let view = Through::new(ThroughConfig {
            parent: image.clone(),
            through: "images_tags".to_string(),
            using: "tag".to_string(),
            junction: registry.schema("ImageTag").unwrap(),
            data: Some(vec![x.clone(), y.clone()]),
        })
        .unwrap();

        let rows = image.borrow().collection("images_tags").unwrap();
        let rows = rows.borrow();
        assert_eq!(rows.len(), 2);

        let first = rows.get_at(0).and_then(Item::as_entity).cloned().unwrap();
        assert!(Rc::ptr_eq(&first, &kept_row));
        assert_eq!(first.borrow().value("id"), json!(100));
        assert!(Rc::ptr_eq(&first.borrow().related("tag").unwrap(), &x));

        let second = rows.get_at(1).and_then(Item::as_entity).cloned().unwrap();
        assert!(!second.borrow().exists());
        assert_eq!(second.borrow().value("tag_id"), json!(20));
        drop(rows);

        let items = view.items().unwrap();
        assert!(items[0].same(&Item::Entity(x)));
        assert!(items[1].same(&Item::Entity(y)));
    }

    #[test]
    fn test_amend_matches_mixed_key_representations() {
        let registry = fixtures::registry();
        let image = image_with_junction(&registry, &[10]);
        let view = Through::view(&image, "images_tags", "tag", registry.schema("ImageTag").unwrap())
            .unwrap();

        let same = registry
            .create("Tag", json!({"id": "10", "name": "amiga"}), true)
            .unwrap();
        view.amend(vec![same]).unwrap();
        let rows = image.borrow().collection("images_tags").unwrap();
        assert_eq!(rows.borrow().len(), 1);
        assert_eq!(rows.borrow().get_at(0).and_then(|row| row.value("id")), Some(json!(100)));
    }

    #[test]
    fn test_forwarded_operations() {
        let registry = fixtures::registry();
        let image = registry.create("Image", json!({"id": 1}), true).unwrap();
        let view =
            Through::view(&image, "images_tags", "tag", registry.schema("ImageTag").unwrap()).unwrap();

        let a = tag(&registry, 1);
        let b = tag(&registry, 2);
        view.push(a.clone()).unwrap();
        view.push(b.clone()).unwrap();
        assert_eq!(view.len().unwrap(), 2);
        assert_eq!(view.index_of(&Item::Entity(b.clone()), 0).unwrap(), Some(1));

        let c = tag(&registry, 3);
        view.set(0, c.clone()).unwrap();
        assert!(view.get(0).unwrap().unwrap().same(&Item::Entity(c)));

        let removed = view.unset(1).unwrap().unwrap();
        assert!(removed.same(&Item::Entity(b)));
        assert_eq!(view.len().unwrap(), 1);
        assert!(view.modified().unwrap());
        assert!(view.set(5, a).unwrap_err().is_lookup());

        assert_eq!(view.to_value(), json!([{"id": 3, "name": "tag3"}]));
    }

    #[test]
    fn test_repointed_row_survives_amend() {
        let registry = fixtures::registry();
        let image = image_with_junction(&registry, &[1]);
        let view = Through::view(&image, "images_tags", "tag", registry.schema("ImageTag").unwrap())
            .unwrap();
        let row = view
            .collection()
            .unwrap()
            .borrow()
            .get_at(0)
            .and_then(Item::as_entity)
            .cloned()
            .unwrap();

        let c = tag(&registry, 3);
        view.set(0, c.clone()).unwrap();
        assert_eq!(row.borrow().value("tag_id"), json!(3));
        assert_eq!(row.borrow().modified_fields(), vec!["tag_id".to_string()]);

        view.amend(vec![c.clone()]).unwrap();
        let rows = view.collection().unwrap();
        assert_eq!(rows.borrow().len(), 1);
        let kept = rows.borrow().get_at(0).and_then(Item::as_entity).cloned().unwrap();
        assert!(Rc::ptr_eq(&kept, &row));
        assert_eq!(kept.borrow().value("id"), json!(100));
        assert!(Rc::ptr_eq(&kept.borrow().related("tag").unwrap(), &c));
    }
}
