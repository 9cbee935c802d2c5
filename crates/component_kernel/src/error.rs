//! Error types for the component kernel

/// Errors raised by component hooks and factories
#[derive(Debug, Clone, thiserror::Error)]
pub enum ComponentError {
    /// `on_initialize` failed
    #[error("Component initialization failed: {0}")]
    Initialization(String),

    /// `on_destroy` failed
    #[error("Component destruction failed: {0}")]
    Destruction(String),

    /// Failure reported by a running component
    #[error("Component runtime error: {0}")]
    Runtime(String),

    /// The factory could not build the hooks object
    #[error("Component construction failed: {0}")]
    Construction(String),

    /// A hook panicked
    #[error("Component panicked: {0}")]
    Panicked(String),

    /// Anything else a concrete component wants to report
    #[error("{0}")]
    Custom(String),
}

impl ComponentError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub fn destruction(msg: impl Into<String>) -> Self {
        Self::Destruction(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn construction(msg: impl Into<String>) -> Self {
        Self::Construction(msg.into())
    }
}

/// Errors surfaced by the registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// A descriptor with this id already exists
    #[error("Component already registered: {0}")]
    AlreadyRegistered(String),

    /// No descriptor with this id
    #[error("Component not registered: {0}")]
    NotRegistered(String),

    /// The component lists itself as a dependency
    #[error("Component {0} depends on itself")]
    SelfDependency(String),

    /// Resolution re-entered a component that is still being resolved
    #[error("Dependency cycle while resolving: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A declared dependency could not be resolved
    #[error("Dependency {dependency} of {id} could not be resolved: {source}")]
    DependencyFailed {
        id: String,
        dependency: String,
        #[source]
        source: Box<RegistryError>,
    },

    /// The factory returned an error
    #[error("Failed to construct {id}: {source}")]
    ConstructionFailed {
        id: String,
        #[source]
        source: ComponentError,
    },

    /// `wait_for` deadline elapsed
    #[error("Timed out after {timeout_ms}ms waiting for component {id}")]
    Timeout { id: String, timeout_ms: u64 },

    /// Bulk initialization was already performed
    #[error("Registry already initialized")]
    AlreadyInitialized,

    /// A bulk destroy ran after this recovery was scheduled
    #[error("Recovery of {0} abandoned, the registry was torn down")]
    TornDown(String),
}

/// Errors that can occur during event delivery
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Callback returned an error or panicked
    #[error("Handler execution failed: {0}")]
    HandlerFailed(String),

    /// Event payload serialization failed
    #[error("Event serialization failed: {0}")]
    SerializationFailed(String),

    /// Event payload deserialization failed
    #[error("Event deserialization failed: {0}")]
    DeserializationFailed(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::SerializationFailed(err.to_string())
    }
}

/// Umbrella error for callers that mix kernel operations
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}
