//! # elif-relations: Relationship engine for elif.rs
//!
//! Entities and ordered collections linked through belongsTo, hasOne,
//! hasMany and hasManyThrough relationships, with batched eager loading
//! (one fetch per relation and nesting level), schema driven casting and
//! cascading saves that reconcile set-valued associations.
//!
//! The engine never builds queries. Storage is reached through the
//! [`DataSource`] contract; [`MemoryStore`] is the in-process backend.

pub mod collection;
pub mod config;
pub mod conventions;
pub mod error;
pub mod model;
pub mod orm;
pub mod relationships;
pub mod schema;
pub mod store;
pub mod value;

#[cfg(test)]
mod test_support;

// Re-export the public surface
pub use collection::{Collection, CollectionKey, CollectionRef, Cursor, Item, Through, ThroughConfig};
pub use config::{EmbedOptions, FetchOptions, Hydration, OrmConfig, RelationshipConfig, SaveOptions};
pub use conventions::Conventions;
pub use error::{ModelError, ModelResult};
pub use model::{Entity, EntityRef, ObjectId, ParentHandle, Parents, Slot};
pub use orm::Orm;
pub use relationships::{
    BelongsTo, Fields, HasMany, HasManyThrough, HasOne, Keys, Link, Relationship, RelationshipType,
    Side,
};
pub use schema::{EmbedTree, FieldType, ModelRegistry, RegistryBuilder, Schema};
pub use store::{DataSource, MemoryStore, Row};
pub use value::{index_key, Condition, Conditions};
