//! Component contract: hook trait and the lifecycle wrapper around it
//!
//! A concrete component implements [`ComponentHooks`]. The registry wraps the
//! hooks object in a [`Component`], which owns the lifecycle state machine:
//!
//! ```text
//! Uninitialized --initialize--> Initializing --ok--> Ready --destroy--> Destroying --> Destroyed
//!                                     |                |
//!                                     +------err-------+--> Errored
//! ```
//!
//! Hook failures (errors and panics) never escape `initialize`/`destroy`; they
//! are logged and published as `component:error` events instead.

use crate::config::ComponentConfig;
use crate::context::ComponentContext;
use crate::error::ComponentError;
use crate::event::EventBus;
use crate::events::{ComponentDestroyedEvent, ComponentErrorEvent, ComponentInitializedEvent};
use crate::utils::{current_timestamp, generate_id, panic_message};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle state of a single instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Destroying,
    Destroyed,
    Errored,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Destroying => "destroying",
            LifecycleState::Destroyed => "destroyed",
            LifecycleState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Behaviour supplied by a concrete component
#[async_trait]
pub trait ComponentHooks: Send + Sync + 'static {
    /// Start the component. Dependencies in `ctx` are constructed but may
    /// still be initializing.
    async fn on_initialize(&mut self, ctx: &ComponentContext) -> Result<(), ComponentError>;

    /// Release resources. Dependencies are still alive during this call.
    async fn on_destroy(&mut self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Component-specific reaction to an error. The `component:error` event
    /// is published by the wrapper regardless of what this does.
    fn on_error(&mut self, _ctx: &ComponentContext, _error: &ComponentError, _context: &str) {}

    /// Access to the concrete type, see [`Component::with_hooks`]
    fn as_any(&self) -> &dyn Any;
}

/// A managed instance: context, lifecycle state and the hooks object
pub struct Component {
    context: ComponentContext,
    instance_id: Uuid,
    state: Mutex<LifecycleState>,
    hooks: tokio::sync::Mutex<Box<dyn ComponentHooks>>,
}

impl Component {
    pub fn new(context: ComponentContext, hooks: Box<dyn ComponentHooks>) -> Self {
        Self {
            context,
            instance_id: generate_id(),
            state: Mutex::new(LifecycleState::Uninitialized),
            hooks: tokio::sync::Mutex::new(hooks),
        }
    }

    pub fn id(&self) -> &str {
        self.context.id()
    }

    /// Unique per construction; a recovered component gets a new one
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Resolved dependency instance by id. Pure lookup.
    pub fn get_dependency(&self, id: &str) -> Option<Arc<Component>> {
        self.context.dependency(id).cloned()
    }

    pub fn dependency_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.context.dependencies().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn config(&self) -> &ComponentConfig {
        self.context.config()
    }

    pub fn context(&self) -> &ComponentContext {
        &self.context
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.context.event_bus()
    }

    /// Run `f` against the concrete hooks type. Returns `None` if the hooks
    /// object is not a `T`. Waits for any running hook to finish.
    pub async fn with_hooks<T, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: ComponentHooks,
    {
        let hooks = self.hooks.lock().await;
        hooks.as_any().downcast_ref::<T>().map(f)
    }

    /// Run `on_initialize` and move to `Ready`, or to `Errored` on failure.
    /// Does nothing (with a warning) unless the instance is `Uninitialized`.
    pub async fn initialize(&self) {
        {
            let mut state = self.lock_state();
            if *state != LifecycleState::Uninitialized {
                warn!("⚠️ Component {} already {}, skipping initialize", self.id(), *state);
                return;
            }
            *state = LifecycleState::Initializing;
        }

        debug!("🔧 Initializing component: {}", self.id());
        let started = Instant::now();

        let mut hooks = self.hooks.lock().await;
        let outcome = AssertUnwindSafe(hooks.on_initialize(&self.context))
            .catch_unwind()
            .await;

        match flatten_outcome(outcome) {
            Ok(()) => {
                drop(hooks);
                let became_ready = self.transition(LifecycleState::Initializing, LifecycleState::Ready);
                if !became_ready {
                    debug!(
                        "Component {} left Initializing while its hook ran; now {}",
                        self.id(),
                        self.state()
                    );
                    return;
                }

                info!(
                    "✅ Component initialized: {} ({}ms)",
                    self.id(),
                    started.elapsed().as_millis()
                );
                let event = ComponentInitializedEvent {
                    component_id: self.id().to_string(),
                    instance_id: self.instance_id.to_string(),
                    timestamp: current_timestamp(),
                };
                if let Err(e) = self.context.event_bus().emit(&event) {
                    error!("❌ Failed to publish initialized event for {}: {}", self.id(), e);
                }
            }
            Err(err) => {
                self.transition(LifecycleState::Initializing, LifecycleState::Errored);
                self.run_error_hook(&mut **hooks, &err, "initialize");
                drop(hooks);
                self.publish_error(&err, "initialize");
            }
        }
    }

    /// Run `on_destroy` and end in `Destroyed` whatever the hook does.
    /// Does nothing (with a warning) if already destroying or destroyed.
    pub async fn destroy(&self) {
        {
            let mut state = self.lock_state();
            if matches!(*state, LifecycleState::Destroying | LifecycleState::Destroyed) {
                warn!("⚠️ Component {} already {}, skipping destroy", self.id(), *state);
                return;
            }
            *state = LifecycleState::Destroying;
        }

        debug!("🛑 Destroying component: {}", self.id());

        let mut hooks = self.hooks.lock().await;
        let outcome = AssertUnwindSafe(hooks.on_destroy(&self.context))
            .catch_unwind()
            .await;
        let failure = flatten_outcome(outcome).err();
        if let Some(err) = &failure {
            self.run_error_hook(&mut **hooks, err, "destroy");
        }
        drop(hooks);

        *self.lock_state() = LifecycleState::Destroyed;

        if let Some(err) = &failure {
            self.publish_error(err, "destroy");
        }

        info!("🔌 Component destroyed: {}", self.id());
        let event = ComponentDestroyedEvent {
            component_id: self.id().to_string(),
            instance_id: self.instance_id.to_string(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.context.event_bus().emit(&event) {
            error!("❌ Failed to publish destroyed event for {}: {}", self.id(), e);
        }
    }

    /// Report a failure from a running component. `Ready`/`Initializing`
    /// become `Errored`; the error hook runs and `component:error` is published.
    ///
    /// If one of this component's hooks is running right now, the custom
    /// `on_error` is skipped; the event is still published.
    pub fn report_error(&self, error: ComponentError, context: &str) {
        {
            let mut state = self.lock_state();
            if matches!(*state, LifecycleState::Initializing | LifecycleState::Ready) {
                *state = LifecycleState::Errored;
            }
        }

        match self.hooks.try_lock() {
            Ok(mut hooks) => self.run_error_hook(&mut **hooks, &error, context),
            Err(_) => {
                error!("❌ Component {} error during {}: {}", self.id(), context, error);
                debug!("Hooks of {} busy, custom on_error skipped", self.id());
            }
        }
        self.publish_error(&error, context);
    }

    fn run_error_hook(&self, hooks: &mut dyn ComponentHooks, error: &ComponentError, context: &str) {
        error!("❌ Component {} error during {}: {}", self.id(), context, error);
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            hooks.on_error(&self.context, error, context)
        }));
        if let Err(panic_info) = outcome {
            error!(
                "❌ on_error of {} panicked: {}",
                self.id(),
                panic_message(panic_info.as_ref())
            );
        }
    }

    fn publish_error(&self, error: &ComponentError, context: &str) {
        let event = ComponentErrorEvent {
            component_id: self.id().to_string(),
            instance_id: self.instance_id.to_string(),
            error: error.to_string(),
            context: context.to_string(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.context.event_bus().emit(&event) {
            error!("❌ Failed to publish error event for {}: {}", self.id(), e);
        }
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let mut state = self.lock_state();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id())
            .field("instance_id", &self.instance_id)
            .field("state", &self.state())
            .field("dependencies", &self.dependency_ids())
            .finish()
    }
}

fn flatten_outcome(
    outcome: Result<Result<(), ComponentError>, Box<dyn Any + Send>>,
) -> Result<(), ComponentError> {
    match outcome {
        Ok(result) => result,
        Err(panic_info) => Err(ComponentError::Panicked(panic_message(panic_info.as_ref()))),
    }
}
