//! Correlation Values - Key normalisation and batch fetch conditions
//!
//! Rows coming from different sources disagree on key representation
//! (`1` vs `"1"`), so every index built while correlating rows goes through
//! [`index_key`], which compares keys by their string form.

use indexmap::IndexMap;
use serde_json::Value;

/// Normalise a correlation value into its index form.
///
/// Returns `None` for null, arrays and objects: such values never correlate.
pub fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
    }
}

/// Compare two values the way correlation indexes do
pub fn same_key(left: &Value, right: &Value) -> bool {
    match (index_key(left), index_key(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

/// A single field condition of a batch fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field = value`
    Eq(Value),
    /// `field IN (values...)`
    In(Vec<Value>),
}

impl Condition {
    /// Check a row value against this condition
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Eq(expected) => same_key(expected, value),
            Condition::In(values) => values.iter().any(|v| same_key(v, value)),
        }
    }

    /// Number of values carried by the condition
    pub fn arity(&self) -> usize {
        match self {
            Condition::Eq(_) => 1,
            Condition::In(values) => values.len(),
        }
    }
}

/// Field conditions of a batch fetch, combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: IndexMap<String, Condition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(field.into(), Condition::Eq(value.into()));
        self
    }

    /// Add an `IN` condition
    pub fn within(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.entries.insert(field.into(), Condition::In(values));
        self
    }

    /// Insert or replace the condition for a field
    pub fn insert(&mut self, field: impl Into<String>, condition: Condition) {
        self.entries.insert(field.into(), condition);
    }

    /// Merge another set of conditions; entries of `other` win
    pub fn merge(&mut self, other: &Conditions) {
        for (field, condition) in &other.entries {
            self.entries.insert(field.clone(), condition.clone());
        }
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.entries.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a row satisfies every condition
    pub fn matches(&self, row: &serde_json::Map<String, Value>) -> bool {
        self.entries.iter().all(|(field, condition)| {
            row.get(field)
                .map(|value| condition.matches(value))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_key_tolerates_mixed_representations() {
        assert_eq!(index_key(&json!(12)), Some("12".to_string()));
        assert_eq!(index_key(&json!("12")), Some("12".to_string()));
        assert!(same_key(&json!(12), &json!("12")));
        assert_eq!(index_key(&Value::Null), None);
        assert_eq!(index_key(&json!([1, 2])), None);
        assert!(!same_key(&Value::Null, &Value::Null));
    }

    #[test]
    fn test_conditions_match_rows() {
        let conditions = Conditions::new()
            .within("gallery_id", vec![json!(1), json!("2")])
            .eq("published", true);

        let row = json!({"gallery_id": 2, "published": true});
        assert!(conditions.matches(row.as_object().unwrap()));

        let row = json!({"gallery_id": 3, "published": true});
        assert!(!conditions.matches(row.as_object().unwrap()));

        let row = json!({"published": true});
        assert!(!conditions.matches(row.as_object().unwrap()));
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let conditions = Conditions::new().within("id", Vec::new());
        let row = json!({"id": 1});
        assert!(!conditions.matches(row.as_object().unwrap()));
        assert_eq!(conditions.get("id").unwrap().arity(), 0);
    }
}
