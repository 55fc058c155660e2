//! Model Layer - Entities and the back-reference registry they share

pub mod entity;
pub mod parents;

pub use entity::{Entity, EntityRef, Slot};
pub use parents::{ObjectId, ParentHandle, Parents};
