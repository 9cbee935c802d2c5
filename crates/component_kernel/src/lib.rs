//! # Component Kernel
//!
//! A small dependency-injection and lifecycle-supervision runtime. It is
//! built from three pieces:
//!
//! - **EventBus**: synchronous publish/subscribe with isolated subscribers
//! - **Component**: a supervised two-phase lifecycle around user hooks
//! - **ComponentRegistry**: descriptors, dependency resolution, topological
//!   startup order, bulk initialize/destroy and automated recovery
//!
//! ## Usage
//!
//! ```rust,no_run
//! use component_kernel::{
//!     ComponentConfig, ComponentContext, ComponentError, ComponentHooks,
//!     ComponentInitializedEvent, ComponentRegistry, EventBus, KernelError,
//! };
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! struct Database;
//!
//! #[async_trait::async_trait]
//! impl ComponentHooks for Database {
//!     async fn on_initialize(&mut self, ctx: &ComponentContext) -> Result<(), ComponentError> {
//!         tracing::info!("connecting {}", ctx.id());
//!         Ok(())
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! # async fn run() -> Result<(), KernelError> {
//! let registry = ComponentRegistry::new(Arc::new(EventBus::new()));
//! registry.register("db", |_ctx| Ok(Box::new(Database) as Box<dyn ComponentHooks>), &[], ComponentConfig::new())?;
//!
//! let _ready = registry.event_bus().on(|event: ComponentInitializedEvent| {
//!     tracing::info!("{} is up", event.component_id);
//!     Ok(())
//! });
//!
//! registry.initialize().await?;
//! assert_eq!(registry.stats().ready, 1);
//! registry.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod events;
pub mod registry;
pub mod topology;
pub mod utils;

// Re-exports for convenience
pub use component::{Component, ComponentHooks, LifecycleState};
pub use config::{config_from_value, merge_config, ComponentConfig};
pub use context::ComponentContext;
pub use error::{ComponentError, EventError, KernelError, RegistryError};
pub use event::{EventBus, EventStats, KernelEvent, Subscription};
pub use events::{
    ComponentDestroyedEvent, ComponentErrorEvent, ComponentInitializedEvent,
    ComponentRecoveredEvent, ComponentRegisteredEvent, ComponentsDestroyedEvent,
    ComponentsInitializedEvent, DependencyCycleEvent,
};
pub use registry::{ComponentDescriptor, ComponentFactory, ComponentRegistry, RegistryStats};
pub use topology::{topological_order, CycleError};

/// Kernel version string, shown by hosts in their startup banner
pub const COMPONENT_KERNEL_VERSION: &str = env!("CARGO_PKG_VERSION");
