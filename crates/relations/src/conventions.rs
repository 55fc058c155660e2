//! Naming Conventions - Default table, key and field names for models
//!
//! Relationships built without explicit `keys`, `name` or `using` options
//! derive them from a [`Conventions`] resolver. Every rule is a pure function
//! of a model identity (or a field name for `single`/`multiple`).

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use convert_case::{Case, Casing};

use crate::error::{ModelError, ModelResult};

/// A naming rule
pub type ConventionRule = Rc<dyn Fn(&str) -> String>;

/// Convention resolver mapping model identities to derived names
#[derive(Clone)]
pub struct Conventions {
    rules: HashMap<String, ConventionRule>,
}

impl fmt::Debug for Conventions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("Conventions").field("rules", &names).finish()
    }
}

impl Default for Conventions {
    fn default() -> Self {
        Self::new()
    }
}

impl Conventions {
    /// Create a resolver with the standard rule set
    pub fn new() -> Self {
        let mut conventions = Self::empty();
        conventions.set("source", |model| plural(&snake(basename(model))));
        conventions.set("key", |_| "id".to_string());
        conventions.set("reference", |model| {
            format!("{}_id", singular(&snake(basename(model))))
        });
        conventions.set("references", |model| {
            format!("{}_ids", singular(&snake(basename(model))))
        });
        conventions.set("field", |model| singular(&snake(basename(model))));
        conventions.set("multiple", plural);
        conventions.set("single", singular);
        conventions
    }

    /// Create a resolver without any rule
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Register or replace a rule
    pub fn set<F>(&mut self, name: &str, rule: F)
    where
        F: Fn(&str) -> String + 'static,
    {
        self.rules.insert(name.to_string(), Rc::new(rule));
    }

    /// Builder flavour of [`Conventions::set`]
    pub fn with_rule<F>(mut self, name: &str, rule: F) -> Self
    where
        F: Fn(&str) -> String + 'static,
    {
        self.set(name, rule);
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Apply a named rule
    pub fn apply(&self, name: &str, subject: &str) -> ModelResult<String> {
        let rule = self.rules.get(name).ok_or_else(|| {
            ModelError::Lookup(format!("Convention for `'{}'` doesn't exist.", name))
        })?;
        Ok(rule(subject))
    }

    /// Table/source name of a model
    pub fn source(&self, model: &str) -> ModelResult<String> {
        self.apply("source", model)
    }

    /// Primary key name of a model
    pub fn primary_key(&self, model: &str) -> ModelResult<String> {
        self.apply("key", model)
    }

    /// Foreign key name referencing a model
    pub fn foreign_key(&self, model: &str) -> ModelResult<String> {
        self.apply("reference", model)
    }

    /// Field name holding a single related model
    pub fn field_name(&self, model: &str) -> ModelResult<String> {
        self.apply("field", model)
    }

    /// Field name on a junction model holding the far end of a through relation
    pub fn using_name(&self, name: &str) -> ModelResult<String> {
        self.apply("single", name)
    }
}

/// Last path segment of a model identity (`app::models::Image` -> `Image`)
fn basename(model: &str) -> &str {
    model
        .rsplit(|c: char| c == ':' || c == '\\' || c == '.')
        .next()
        .unwrap_or(model)
}

fn snake(name: &str) -> String {
    name.to_case(Case::Snake)
}

fn plural(name: &str) -> String {
    pluralizer::pluralize(name, 2, false)
}

fn singular(name: &str) -> String {
    pluralizer::pluralize(name, 1, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let conventions = Conventions::new();

        assert_eq!(conventions.primary_key("Image").unwrap(), "id");
        assert_eq!(conventions.foreign_key("Gallery").unwrap(), "gallery_id");
        assert_eq!(conventions.foreign_key("ImageTag").unwrap(), "image_tag_id");
        assert_eq!(conventions.field_name("ImageTag").unwrap(), "image_tag");
        assert_eq!(conventions.source("Image").unwrap(), "images");
        assert_eq!(conventions.using_name("tags").unwrap(), "tag");
        assert_eq!(conventions.apply("multiple", "image").unwrap(), "images");
    }

    #[test]
    fn test_path_like_identities() {
        let conventions = Conventions::new();
        assert_eq!(conventions.foreign_key("app::models::Tag").unwrap(), "tag_id");
        assert_eq!(conventions.field_name("App\\Model\\Tag").unwrap(), "tag");
    }

    #[test]
    fn test_custom_rule_overrides_default() {
        let conventions = Conventions::new().with_rule("key", |model| {
            format!("{}_pk", model.to_lowercase())
        });
        assert_eq!(conventions.primary_key("Tag").unwrap(), "tag_pk");
    }

    #[test]
    fn test_unknown_rule_is_a_lookup_error() {
        let conventions = Conventions::empty();
        let err = conventions.apply("key", "Tag").unwrap_err();
        assert!(err.is_lookup());
        assert!(!conventions.has("key"));
    }
}
