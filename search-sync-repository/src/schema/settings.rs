//! Index settings.

use serde_json::{Map, Value};

use super::merge_json;

/// Index settings, merged incrementally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    settings: Value,
}

impl Settings {
    /// Create settings from an object. Non-object values yield empty settings.
    pub fn new(settings: Value) -> Self {
        let settings = if settings.is_object() {
            settings
        } else {
            Value::Object(Map::new())
        };
        Self { settings }
    }

    /// Merge more settings into the current ones.
    pub fn update(&mut self, settings: Value) -> &mut Self {
        if self.settings.is_null() {
            self.settings = Value::Object(Map::new());
        }
        merge_json(&mut self.settings, settings);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.settings.as_object().map_or(true, Map::is_empty)
    }

    /// The configured refresh interval.
    ///
    /// Accepts both the nested (`{"index": {"refresh_interval": ..}}`) and the
    /// flat (`{"refresh_interval": ..}`) layouts.
    pub fn refresh_interval(&self) -> Option<Value> {
        self.settings
            .get("index")
            .and_then(|index| index.get("refresh_interval"))
            .or_else(|| self.settings.get("refresh_interval"))
            .filter(|value| !value.is_null())
            .cloned()
    }

    pub fn to_value(&self) -> Value {
        if self.settings.is_null() {
            Value::Object(Map::new())
        } else {
            self.settings.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_merges() {
        let mut settings = Settings::new(json!({ "number_of_shards": 1 }));
        settings.update(json!({ "number_of_replicas": 0 }));

        assert_eq!(
            settings.to_value(),
            json!({ "number_of_shards": 1, "number_of_replicas": 0 })
        );
    }

    #[test]
    fn test_refresh_interval_layouts() {
        let nested = Settings::new(json!({ "index": { "refresh_interval": "5s" } }));
        let flat = Settings::new(json!({ "refresh_interval": "10s" }));

        assert_eq!(nested.refresh_interval(), Some(json!("5s")));
        assert_eq!(flat.refresh_interval(), Some(json!("10s")));
        assert_eq!(Settings::default().refresh_interval(), None);
    }

    #[test]
    fn test_default_is_empty_object() {
        let settings = Settings::default();
        assert!(settings.is_empty());
        assert_eq!(settings.to_value(), json!({}));
    }
}
