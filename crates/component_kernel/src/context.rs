//! Construction context and dependency injection for components

use crate::component::Component;
use crate::config::ComponentConfig;
use crate::event::EventBus;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the registry hands to a factory: the id, the already-resolved
/// dependency instances, the event bus and the merged configuration.
#[derive(Clone)]
pub struct ComponentContext {
    id: String,
    dependencies: HashMap<String, Arc<Component>>,
    event_bus: Arc<EventBus>,
    config: ComponentConfig,
}

impl ComponentContext {
    pub fn new(
        id: impl Into<String>,
        dependencies: HashMap<String, Arc<Component>>,
        event_bus: Arc<EventBus>,
        config: ComponentConfig,
    ) -> Self {
        Self {
            id: id.into(),
            dependencies,
            event_bus,
            config,
        }
    }

    /// Registry id of the component
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolved dependency instance, if `id` was declared and resolved
    pub fn dependency(&self, id: &str) -> Option<&Arc<Component>> {
        self.dependencies.get(id)
    }

    pub fn dependencies(&self) -> &HashMap<String, Arc<Component>> {
        &self.dependencies
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    /// Single config entry
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Integer config entry, falling back to `default` when absent or not a u64
    pub fn config_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }
}

impl std::fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut deps: Vec<&String> = self.dependencies.keys().collect();
        deps.sort();
        f.debug_struct("ComponentContext")
            .field("id", &self.id)
            .field("dependencies", &deps)
            .field("config", &self.config)
            .finish()
    }
}
