//! Index schema builders.
//!
//! A schema is the `{settings, mappings}` pair an index is created with.
//! [`Mappings`] and [`Settings`] are built incrementally: every mutation
//! merges into the existing value instead of replacing it.

mod mappings;
mod settings;

pub use mappings::{DynamicPropertiesFn, Mappings};
pub use settings::Settings;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Materialised settings and mappings for one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub settings: Value,
    pub mappings: Value,
}

impl IndexSchema {
    pub fn new(settings: Value, mappings: Value) -> Self {
        Self { settings, mappings }
    }

    /// The body of an index creation request.
    pub fn body(&self) -> Value {
        json!({
            "settings": self.settings,
            "mappings": self.mappings,
        })
    }
}

/// Recursively merge `patch` into `target`.
///
/// Objects are merged key by key; any other value in `patch` replaces the
/// value in `target`.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_json_nested() {
        let mut target = json!({ "index": { "number_of_shards": 1, "refresh_interval": "1s" } });
        merge_json(
            &mut target,
            json!({ "index": { "refresh_interval": "30s" }, "analysis": {} }),
        );

        assert_eq!(
            target,
            json!({
                "index": { "number_of_shards": 1, "refresh_interval": "30s" },
                "analysis": {}
            })
        );
    }

    #[test]
    fn test_schema_body() {
        let schema = IndexSchema::new(json!({ "number_of_shards": 1 }), json!({ "properties": {} }));
        let body = schema.body();

        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert!(body["mappings"]["properties"].is_object());
    }
}
