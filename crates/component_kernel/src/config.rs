//! Opaque per-component configuration maps

use serde_json::{Map, Value};

/// Key-value configuration handed to a component at construction time.
/// The kernel imposes no schema on it.
pub type ComponentConfig = Map<String, Value>;

/// Shallow merge: keys in `runtime` replace keys in `defaults`
pub fn merge_config(defaults: &ComponentConfig, runtime: &ComponentConfig) -> ComponentConfig {
    let mut merged = defaults.clone();
    for (key, value) in runtime {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Build a config map from a JSON object literal; non-objects yield an empty map
pub fn config_from_value(value: Value) -> ComponentConfig {
    match value {
        Value::Object(map) => map,
        _ => ComponentConfig::new(),
    }
}
