//! Memory Store - In-process data source
//!
//! Tables are vectors of rows with an auto-increment counter. Every fetch is
//! logged so callers can verify how many round-trips an operation costs.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{DataSource, Row};
use crate::error::{ModelError, ModelResult};
use crate::relationships::metadata::Fields;
use crate::value::{same_key, Conditions};

/// A logged batch fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub source: String,
    pub conditions: Conditions,
    pub rows: usize,
}

#[derive(Debug)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

impl Table {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn reserve(&mut self, id: &Value) {
        if let Some(id) = id.as_i64() {
            if id >= self.next_id {
                self.next_id = id + 1;
            }
        }
    }
}

/// In-memory [`DataSource`]
#[derive(Debug)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, Table>>,
    log: RefCell<Vec<FetchRecord>>,
    key: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_key("id")
    }

    /// Store whose seeded rows use `key` as primary key
    pub fn with_key(key: &str) -> Self {
        Self {
            tables: RefCell::new(HashMap::new()),
            log: RefCell::new(Vec::new()),
            key: key.to_string(),
        }
    }

    /// Load rows into a table, bypassing the fetch log
    pub fn seed<I>(&self, source: &str, rows: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(source.to_string()).or_insert_with(Table::new);
        for row in rows {
            let Value::Object(row) = row else {
                return Err(ModelError::Source(format!(
                    "Seed rows of `{}` must be objects",
                    source
                )));
            };
            if let Some(id) = row.get(&self.key) {
                table.reserve(id);
            }
            table.rows.push(row);
        }
        Ok(())
    }

    /// Snapshot of a table
    pub fn rows(&self, source: &str) -> Vec<Row> {
        self.tables
            .borrow()
            .get(source)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    /// Row of `source` whose key equals `id`
    pub fn find(&self, source: &str, id: &Value) -> Option<Row> {
        self.tables.borrow().get(source).and_then(|table| {
            table
                .rows
                .iter()
                .find(|row| row.get(&self.key).is_some_and(|key| same_key(key, id)))
                .cloned()
        })
    }

    /// Number of fetches issued since creation or the last reset
    pub fn fetch_count(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.log.borrow().clone()
    }

    pub fn reset_log(&self) {
        self.log.borrow_mut().clear();
    }
}

fn project(row: &Row, fields: &Fields) -> Row {
    match fields {
        Fields::All => row.clone(),
        Fields::Only(names) => names
            .iter()
            .filter_map(|name| row.get(name).map(|value| (name.clone(), value.clone())))
            .collect(),
    }
}

impl DataSource for MemoryStore {
    fn fetch_all(
        &self,
        source: &str,
        conditions: &Conditions,
        fields: &Fields,
    ) -> ModelResult<Vec<Row>> {
        let rows: Vec<Row> = self
            .tables
            .borrow()
            .get(source)
            .map(|table| {
                table
                    .rows
                    .iter()
                    .filter(|row| conditions.matches(row))
                    .map(|row| project(row, fields))
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(
            "Memory fetch on `{}` with {} condition(s) returned {} row(s)",
            source,
            conditions.len(),
            rows.len()
        );
        self.log.borrow_mut().push(FetchRecord {
            source: source.to_string(),
            conditions: conditions.clone(),
            rows: rows.len(),
        });
        Ok(rows)
    }

    fn insert(&self, source: &str, key: &str, mut row: Row) -> ModelResult<Row> {
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(source.to_string()).or_insert_with(Table::new);

        match row.get(key) {
            Some(id) if !id.is_null() => {
                let duplicate = table
                    .rows
                    .iter()
                    .any(|existing| existing.get(key).is_some_and(|other| same_key(other, id)));
                if duplicate {
                    return Err(ModelError::Source(format!(
                        "Duplicate key `{}` in `{}`",
                        id, source
                    )));
                }
                let id = id.clone();
                table.reserve(&id);
            }
            _ => {
                row.insert(key.to_string(), Value::from(table.next_id));
                table.next_id += 1;
            }
        }

        table.rows.push(row.clone());
        Ok(row)
    }

    fn update(&self, source: &str, key: &str, id: &Value, changes: Row) -> ModelResult<bool> {
        let mut tables = self.tables.borrow_mut();
        let Some(table) = tables.get_mut(source) else {
            return Ok(false);
        };
        let Some(row) = table
            .rows
            .iter_mut()
            .find(|row| row.get(key).is_some_and(|value| same_key(value, id)))
        else {
            return Ok(false);
        };
        for (field, value) in changes {
            row.insert(field, value);
        }
        Ok(true)
    }

    fn delete(&self, source: &str, key: &str, id: &Value) -> ModelResult<bool> {
        let mut tables = self.tables.borrow_mut();
        let Some(table) = tables.get_mut(source) else {
            return Ok(false);
        };
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !row.get(key).is_some_and(|value| same_key(value, id)));
        Ok(table.rows.len() < before)
    }
}

/// Build a row from a JSON object literal; non-objects yield an empty row
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
