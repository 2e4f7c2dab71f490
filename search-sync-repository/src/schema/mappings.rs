//! Index mappings builder.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::merge_json;

/// Callback that adds computed properties to a materialised mapping.
///
/// Receives the mapping being built and the argument registered for the
/// callback's name, if any.
pub type DynamicPropertiesFn = Arc<dyn Fn(&mut Value, Option<&Value>) + Send + Sync>;

const TYPES_WITH_EMBEDDED_PROPERTIES: [&str; 2] = ["object", "nested"];

/// Index mappings, built field by field.
#[derive(Clone, Default)]
pub struct Mappings {
    options: Map<String, Value>,
    properties: Map<String, Value>,
    runtime: Map<String, Value>,
    dynamic: Vec<(String, DynamicPropertiesFn)>,
}

impl fmt::Debug for Mappings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mappings")
            .field("options", &self.options)
            .field("properties", &self.properties)
            .field("runtime", &self.runtime)
            .field(
                "dynamic",
                &self.dynamic.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Mappings {
    /// Create mappings with top-level options such as `dynamic` or `_source`.
    pub fn new(options: Value) -> Self {
        Self {
            options: into_object(options),
            ..Self::default()
        }
    }

    /// Merge top-level mapping options.
    pub fn update_options(&mut self, options: Value) -> &mut Self {
        let mut current = Value::Object(std::mem::take(&mut self.options));
        merge_json(&mut current, options);
        self.options = into_object(current);
        self
    }

    /// Declare a leaf field. The type defaults to `text`.
    pub fn indexes(&mut self, field: impl Into<String>, definition: Value) -> &mut Self {
        let mut definition = into_object(definition);
        definition
            .entry("type")
            .or_insert_with(|| Value::String("text".to_string()));
        self.properties
            .insert(field.into(), Value::Object(definition));
        self
    }

    /// Declare a field with children.
    ///
    /// The type defaults to `object`. Children of `object` and `nested`
    /// fields are stored under `properties`; children of any other type are
    /// multi-fields stored under `fields`.
    pub fn indexes_nested<F>(
        &mut self,
        field: impl Into<String>,
        definition: Value,
        build: F,
    ) -> &mut Self
    where
        F: FnOnce(&mut Mappings),
    {
        let mut definition = into_object(definition);
        let field_type = definition
            .entry("type")
            .or_insert_with(|| Value::String("object".to_string()))
            .as_str()
            .unwrap_or("object")
            .to_string();
        let key = if TYPES_WITH_EMBEDDED_PROPERTIES.contains(&field_type.as_str()) {
            "properties"
        } else {
            "fields"
        };

        let mut children = Mappings {
            properties: definition
                .remove(key)
                .map(into_object)
                .unwrap_or_default(),
            ..Mappings::default()
        };
        build(&mut children);

        definition.insert(key.to_string(), Value::Object(children.properties));
        self.properties
            .insert(field.into(), Value::Object(definition));
        self
    }

    /// Declare a runtime field.
    pub fn runtime_field(&mut self, field: impl Into<String>, definition: Value) -> &mut Self {
        self.runtime.insert(field.into(), definition);
        self
    }

    /// Register a callback run every time the mapping is materialised.
    /// Registering the same name again replaces the previous callback.
    pub fn register_dynamic_properties(
        &mut self,
        name: impl Into<String>,
        callback: DynamicPropertiesFn,
    ) -> &mut Self {
        let name = name.into();
        match self.dynamic.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = callback,
            None => self.dynamic.push((name, callback)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.runtime.is_empty() && self.options.is_empty()
    }

    /// Materialise the mapping without callback arguments.
    pub fn to_value(&self) -> Value {
        self.to_value_with(&HashMap::new(), &[])
    }

    /// Materialise the mapping.
    ///
    /// Callbacks named in `skip` are not run. The cached definition is copied
    /// first, so callbacks never mutate it.
    pub fn to_value_with(&self, args: &HashMap<String, Value>, skip: &[&str]) -> Value {
        let mut mapping = self.options.clone();
        mapping.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone()),
        );
        if !self.runtime.is_empty() {
            mapping.insert("runtime".to_string(), Value::Object(self.runtime.clone()));
        }

        let mut mapping = Value::Object(mapping);
        for (name, callback) in &self.dynamic {
            if skip.contains(&name.as_str()) {
                continue;
            }
            callback(&mut mapping, args.get(name));
        }
        mapping
    }

    /// Field paths mapped to their datatype, e.g. `created_by.full_name.raw -> keyword`.
    pub fn to_flattened(&self) -> BTreeMap<String, String> {
        let mut flattened = BTreeMap::new();
        flatten_into(&self.properties, None, &mut flattened);
        flattened
    }
}

fn flatten_into(properties: &Map<String, Value>, prefix: Option<&str>, out: &mut BTreeMap<String, String>) {
    for (field, definition) in properties {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.clone(),
        };
        if let Some(datatype) = definition.get("type").and_then(Value::as_str) {
            out.insert(path.clone(), datatype.to_string());
        }
        for key in ["properties", "fields"] {
            if let Some(children) = definition.get(key).and_then(Value::as_object) {
                flatten_into(children, Some(&path), out);
            }
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl From<Value> for Mappings {
    /// Build mappings from an existing `{properties, ...}` definition.
    fn from(value: Value) -> Self {
        let mut options = into_object(value);
        let properties = options.remove("properties").map(into_object).unwrap_or_default();
        let runtime = options.remove("runtime").map(into_object).unwrap_or_default();
        Self {
            options,
            properties,
            runtime,
            dynamic: Vec::new(),
        }
    }
}

impl PartialEq for Mappings {
    fn eq(&self, other: &Self) -> bool {
        self.to_value_with(&HashMap::new(), &[]) == other.to_value_with(&HashMap::new(), &[])
    }
}
