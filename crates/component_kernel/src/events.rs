//! Lifecycle notifications published by components and the registry
//!
//! Every payload serializes to a JSON object with camelCase keys and carries
//! at least the affected id(s) and a millisecond timestamp.

use crate::event::KernelEvent;
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};

pub const COMPONENT_REGISTERED: &str = "component:registered";
pub const COMPONENT_INITIALIZED: &str = "component:initialized";
pub const COMPONENT_DESTROYED: &str = "component:destroyed";
pub const COMPONENT_ERROR: &str = "component:error";
pub const COMPONENT_RECOVERED: &str = "component:recovered";
pub const COMPONENTS_INITIALIZED: &str = "components:initialized";
pub const COMPONENTS_DESTROYED: &str = "components:destroyed";
pub const DEPENDENCY_CYCLE: &str = "registry:dependency_cycle";

/// A descriptor was added to the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRegisteredEvent {
    pub component_id: String,
    pub dependencies: Vec<String>,
    pub timestamp: u64,
}

impl ComponentRegisteredEvent {
    pub fn new(component_id: &str, dependencies: &[String]) -> Self {
        Self {
            component_id: component_id.to_string(),
            dependencies: dependencies.to_vec(),
            timestamp: current_timestamp(),
        }
    }
}

impl KernelEvent for ComponentRegisteredEvent {
    fn event_name() -> &'static str {
        COMPONENT_REGISTERED
    }
}

/// An instance finished `initialize` successfully
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInitializedEvent {
    pub component_id: String,
    pub instance_id: String,
    pub timestamp: u64,
}

impl KernelEvent for ComponentInitializedEvent {
    fn event_name() -> &'static str {
        COMPONENT_INITIALIZED
    }
}

/// An instance finished `destroy`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDestroyedEvent {
    pub component_id: String,
    pub instance_id: String,
    pub timestamp: u64,
}

impl KernelEvent for ComponentDestroyedEvent {
    fn event_name() -> &'static str {
        COMPONENT_DESTROYED
    }
}

/// Structured error report; the registry drives recovery from this event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentErrorEvent {
    pub component_id: String,
    /// Empty when reported from outside a component; means "current instance"
    #[serde(default)]
    pub instance_id: String,
    pub error: String,
    pub context: String,
    pub timestamp: u64,
}

impl KernelEvent for ComponentErrorEvent {
    fn event_name() -> &'static str {
        COMPONENT_ERROR
    }
}

/// A recovery cycle produced a ready replacement instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecoveredEvent {
    pub component_id: String,
    pub instance_id: String,
    pub timestamp: u64,
}

impl KernelEvent for ComponentRecoveredEvent {
    fn event_name() -> &'static str {
        COMPONENT_RECOVERED
    }
}

/// Bulk initialization finished
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentsInitializedEvent {
    pub component_count: usize,
    pub component_ids: Vec<String>,
    pub timestamp: u64,
}

impl KernelEvent for ComponentsInitializedEvent {
    fn event_name() -> &'static str {
        COMPONENTS_INITIALIZED
    }
}

/// Bulk destroy finished
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentsDestroyedEvent {
    pub component_count: usize,
    pub timestamp: u64,
}

impl KernelEvent for ComponentsDestroyedEvent {
    fn event_name() -> &'static str {
        COMPONENTS_DESTROYED
    }
}

/// The initialization order fell back to registration order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCycleEvent {
    /// Ids in the `visiting` state when the cycle was found
    pub cycle: Vec<String>,
    pub fallback_order: Vec<String>,
    pub timestamp: u64,
}

impl KernelEvent for DependencyCycleEvent {
    fn event_name() -> &'static str {
        DEPENDENCY_CYCLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_event_uses_camel_case_keys() {
        let event = ComponentErrorEvent {
            component_id: "places".into(),
            instance_id: "abc".into(),
            error: "quota exceeded".into(),
            context: "initialize".into(),
            timestamp: 1,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "componentId": "places",
                "instanceId": "abc",
                "error": "quota exceeded",
                "context": "initialize",
                "timestamp": 1
            })
        );
    }

    #[test]
    fn test_bulk_event_shape() {
        let event = ComponentsInitializedEvent {
            component_count: 2,
            component_ids: vec!["db".into(), "api".into()],
            timestamp: 5,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["componentCount"], 2);
        assert_eq!(value["componentIds"], json!(["db", "api"]));
    }
}
