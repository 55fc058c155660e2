//! Data Sources - Batch finder and persistence contract
//!
//! The relations engine never builds queries itself. It hands a source name,
//! a set of field conditions and a projection to a [`DataSource`] and gets
//! plain rows back; persistence goes through the same trait.

use serde_json::{Map, Value};

use crate::error::ModelResult;
use crate::relationships::metadata::Fields;
use crate::value::Conditions;

pub mod memory;

pub use memory::{FetchRecord, MemoryStore};

/// A raw row
pub type Row = Map<String, Value>;

/// Storage backend consumed by the relations engine
pub trait DataSource {
    /// Fetch every row of `source` matching all `conditions`
    fn fetch_all(&self, source: &str, conditions: &Conditions, fields: &Fields)
        -> ModelResult<Vec<Row>>;

    /// Insert a row and return it as stored, generated key included
    fn insert(&self, source: &str, key: &str, row: Row) -> ModelResult<Row>;

    /// Update the row whose `key` field equals `id`; returns false when none matched
    fn update(&self, source: &str, key: &str, id: &Value, changes: Row) -> ModelResult<bool>;

    /// Delete the row whose `key` field equals `id`; returns false when none matched
    fn delete(&self, source: &str, key: &str, id: &Value) -> ModelResult<bool>;
}
