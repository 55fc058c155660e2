//! Relationships Module - Relationship kinds, batched eager loading and
//! cascading saves

pub mod belongs_to;
pub mod has_many;
pub mod has_many_through;
pub mod has_one;
mod loader;
pub mod metadata;
pub mod relation;


pub use belongs_to::BelongsTo;
pub use has_many::HasMany;
pub use has_many_through::HasManyThrough;
pub use has_one::HasOne;
pub use metadata::{Fields, Keys, Link, RelationshipType, Side};
pub use relation::{EmbedHook, Relationship, RelationshipMeta};
