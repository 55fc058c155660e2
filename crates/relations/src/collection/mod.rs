//! Collections - Ordered containers, iteration cursor and through views

pub mod cursor;
pub mod index;
pub mod ordered;
pub mod through;

pub use cursor::Cursor;
pub use index::{KeyBucket, KeyIndex};
pub use ordered::{Collection, CollectionKey, CollectionRef, Item};
pub use through::{Through, ThroughConfig};
