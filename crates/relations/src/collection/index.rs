//! Key Index - Correlation value to collection positions
//!
//! Built in one pass over a collection; buckets keep first-seen order so the
//! distinct values handed to a batch fetch are deterministic.

use indexmap::IndexMap;
use serde_json::Value;

use crate::value::index_key;

/// Positions sharing one correlation value
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBucket {
    /// First raw value seen for this key
    pub value: Value,
    pub positions: Vec<usize>,
}

/// Index of correlation values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyIndex {
    buckets: IndexMap<String, KeyBucket>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` at `position`; null and composite values are skipped
    pub fn insert(&mut self, value: &Value, position: usize) -> bool {
        let Some(key) = index_key(value) else {
            return false;
        };
        self.buckets
            .entry(key)
            .or_insert_with(|| KeyBucket {
                value: value.clone(),
                positions: Vec::new(),
            })
            .positions
            .push(position);
        true
    }

    /// Positions recorded for a value
    pub fn get(&self, value: &Value) -> Option<&[usize]> {
        let key = index_key(value)?;
        self.buckets.get(&key).map(|bucket| bucket.positions.as_slice())
    }

    /// Distinct raw values, in first-seen order
    pub fn values(&self) -> Vec<Value> {
        self.buckets.values().map(|bucket| bucket.value.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyBucket)> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
