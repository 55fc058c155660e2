//! Parent Registry - Non-owning back-references between graph objects
//!
//! A related entity or collection can be embedded in more than one place at
//! once (two images referencing the same gallery, a junction collection shared
//! by a through view). Each object records who references it and under which
//! field in a [`Parents`] map keyed by identity tokens, never by pointers, so
//! the back-references carry no ownership and cannot form cycles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Stable identity token of an entity or collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh token
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ObjectId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a referencing object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentHandle {
    Entity(ObjectId),
    Collection(ObjectId),
}

impl ParentHandle {
    pub fn id(self) -> ObjectId {
        match self {
            ParentHandle::Entity(id) | ParentHandle::Collection(id) => id,
        }
    }
}

/// Map of parent handle to the field (or collection key) holding the child
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parents {
    links: IndexMap<ParentHandle, String>,
}

impl Parents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parent; re-registering replaces the field
    pub fn insert(&mut self, handle: ParentHandle, field: impl Into<String>) {
        self.links.insert(handle, field.into());
    }

    pub fn remove(&mut self, handle: ParentHandle) -> Option<String> {
        self.links.shift_remove(&handle)
    }

    /// Remove a parent only when it still references the child through `field`
    pub fn remove_if(&mut self, handle: ParentHandle, field: &str) -> bool {
        if self.get(handle) == Some(field) {
            self.links.shift_remove(&handle);
            true
        } else {
            false
        }
    }

    pub fn get(&self, handle: ParentHandle) -> Option<&str> {
        self.links.get(&handle).map(String::as_str)
    }

    pub fn contains(&self, handle: ParentHandle) -> bool {
        self.links.contains_key(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParentHandle, &str)> {
        self.links.iter().map(|(h, f)| (*h, f.as_str()))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }
}
