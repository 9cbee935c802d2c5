//! Component registry: descriptors, dependency resolution, bulk lifecycle
//! and automated recovery.
//!
//! The registry is an explicit object; clone the handle to share it. It owns
//! the descriptor table and the instance cache exclusively.

use crate::component::{Component, ComponentHooks, LifecycleState};
use crate::config::{merge_config, ComponentConfig};
use crate::context::ComponentContext;
use crate::error::{ComponentError, RegistryError};
use crate::event::{EventBus, KernelEvent, Subscription};
use crate::events::{
    ComponentErrorEvent, ComponentRecoveredEvent, ComponentRegisteredEvent,
    ComponentsDestroyedEvent, ComponentsInitializedEvent, DependencyCycleEvent,
};
use crate::topology::topological_order;
use crate::utils::{current_timestamp, panic_message};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Interval between readiness checks in [`ComponentRegistry::wait_for`]
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds the hooks object for one instance
pub type ComponentFactory =
    Arc<dyn Fn(ComponentContext) -> Result<Box<dyn ComponentHooks>, ComponentError> + Send + Sync>;

/// Registered blueprint for a component
#[derive(Clone)]
pub struct ComponentDescriptor {
    id: String,
    factory: ComponentFactory,
    dependencies: Vec<String>,
    default_config: ComponentConfig,
}

impl ComponentDescriptor {
    pub fn new<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ComponentContext) -> Result<Box<dyn ComponentHooks>, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            factory: Arc::new(factory),
            dependencies: Vec::new(),
            default_config: ComponentConfig::new(),
        }
    }

    /// Declare dependencies; duplicates are dropped, first occurrence wins
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in dependencies {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_config(mut self, default_config: ComponentConfig) -> Self {
        self.default_config = default_config;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn default_config(&self) -> &ComponentConfig {
        &self.default_config
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("default_config", &self.default_config)
            .finish()
    }
}

/// Read-only registry snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub registered: usize,
    pub instantiated: usize,
    pub ready: usize,
    pub component_ids: Vec<String>,
}

#[derive(Default)]
struct DescriptorTable {
    order: Vec<String>,
    by_id: HashMap<String, ComponentDescriptor>,
}

struct RegistryInner {
    event_bus: Arc<EventBus>,
    descriptors: RwLock<DescriptorTable>,
    instances: DashMap<String, Arc<Component>>,
    /// Serializes instantiation so an id is never constructed twice
    construction: Mutex<()>,
    initialized: AtomicBool,
    bulk_initializing: AtomicBool,
    /// Bumped by every bulk destroy; recoveries scheduled earlier are dropped
    teardown_generation: AtomicU64,
    recovering: Mutex<HashSet<String>>,
    error_subscription: Mutex<Option<Subscription>>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let subscription = self
            .error_subscription
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}

/// Dependency-injecting component registry with lifecycle supervision
#[derive(Clone)]
pub struct ComponentRegistry {
    inner: Arc<RegistryInner>,
}

impl ComponentRegistry {
    /// Create a registry on `event_bus` and start listening for
    /// `component:error` to drive recovery.
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        let inner = Arc::new(RegistryInner {
            event_bus: event_bus.clone(),
            descriptors: RwLock::new(DescriptorTable::default()),
            instances: DashMap::new(),
            construction: Mutex::new(()),
            initialized: AtomicBool::new(false),
            bulk_initializing: AtomicBool::new(false),
            teardown_generation: AtomicU64::new(0),
            recovering: Mutex::new(HashSet::new()),
            error_subscription: Mutex::new(None),
        });

        // Weak: the bus must not keep the registry alive
        let weak: Weak<RegistryInner> = Arc::downgrade(&inner);
        let subscription = event_bus.on(move |event: ComponentErrorEvent| {
            if let Some(inner) = weak.upgrade() {
                ComponentRegistry { inner }.schedule_recovery(event);
            }
            Ok(())
        });
        *lock(&inner.error_subscription) = Some(subscription);

        Self { inner }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.inner.event_bus.clone()
    }

    /// Register a component. Fails if `id` is already registered; the
    /// existing descriptor is left untouched.
    pub fn register<F>(
        &self,
        id: &str,
        factory: F,
        dependencies: &[&str],
        default_config: ComponentConfig,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ComponentContext) -> Result<Box<dyn ComponentHooks>, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        let descriptor = ComponentDescriptor::new(id, factory)
            .depends_on(dependencies.iter().copied())
            .with_config(default_config);
        self.register_descriptor(descriptor)
    }

    /// Register a prepared descriptor
    pub fn register_descriptor(&self, descriptor: ComponentDescriptor) -> Result<(), RegistryError> {
        let id = descriptor.id.clone();
        let dependencies = descriptor.dependencies.clone();
        {
            let mut table = write(&self.inner.descriptors);
            if table.by_id.contains_key(&id) {
                warn!("⚠️ Component {} is already registered, ignoring", id);
                return Err(RegistryError::AlreadyRegistered(id));
            }
            table.order.push(id.clone());
            table.by_id.insert(id.clone(), descriptor);
        }

        debug!("📝 Registered component {} (deps: {:?})", id, dependencies);
        self.emit(&ComponentRegisteredEvent::new(&id, &dependencies));
        Ok(())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        read(&self.inner.descriptors).by_id.contains_key(id)
    }

    /// Registered ids in registration order
    pub fn registered_ids(&self) -> Vec<String> {
        read(&self.inner.descriptors).order.clone()
    }

    /// Declared dependencies per registered id
    pub fn dependency_graph(&self) -> HashMap<String, Vec<String>> {
        read(&self.inner.descriptors)
            .by_id
            .iter()
            .map(|(id, desc)| (id.clone(), desc.dependencies.clone()))
            .collect()
    }

    /// Whether bulk [`initialize`](Self::initialize) has completed
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Cached instance without triggering construction
    pub fn instance(&self, id: &str) -> Option<Arc<Component>> {
        self.inner
            .instances
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Get or lazily construct `id` with its default config
    pub fn get(&self, id: &str) -> Option<Arc<Component>> {
        self.get_with_config(id, &ComponentConfig::new())
    }

    /// Get or lazily construct `id`; `runtime_config` overrides the defaults
    /// of a newly constructed instance and is ignored for cached ones.
    /// Returns `None` (and logs) when the id or one of its dependencies
    /// cannot be resolved.
    pub fn get_with_config(&self, id: &str, runtime_config: &ComponentConfig) -> Option<Arc<Component>> {
        match self.try_get(id, runtime_config) {
            Ok(component) => Some(component),
            Err(e) => {
                warn!("⚠️ Could not get component {}: {}", id, e);
                None
            }
        }
    }

    /// Like [`get_with_config`](Self::get_with_config) but with the typed error.
    ///
    /// Once the registry is initialized, every instance this call constructs
    /// is started, including dependencies built before a later one failed.
    /// Factories run while the construction lock is held and must not call
    /// back into the registry.
    pub fn try_get(&self, id: &str, runtime_config: &ComponentConfig) -> Result<Arc<Component>, RegistryError> {
        if let Some(existing) = self.live_instance(id) {
            return Ok(existing);
        }

        let (component, created) = self.construct(id, runtime_config, None);

        if self.is_initialized() && !created.is_empty() {
            self.spawn_initialize(created);
        }
        component
    }

    /// Initialization order: dependencies first. Falls back to registration
    /// order (and publishes `registry:dependency_cycle`) when the graph has a cycle.
    pub fn initialization_order(&self) -> Vec<String> {
        let nodes: Vec<(String, Vec<String>)> = {
            let table = read(&self.inner.descriptors);
            table
                .order
                .iter()
                .filter_map(|id| {
                    table
                        .by_id
                        .get(id)
                        .map(|desc| (id.clone(), desc.dependencies.clone()))
                })
                .collect()
        };

        match topological_order(&nodes) {
            Ok(order) => order,
            Err(cycle) => {
                let fallback: Vec<String> = nodes.into_iter().map(|(id, _)| id).collect();
                warn!(
                    "⚠️ Dependency cycle {} detected, falling back to registration order",
                    cycle.path().join(" -> ")
                );
                self.emit(&DependencyCycleEvent {
                    cycle: cycle.visiting,
                    fallback_order: fallback.clone(),
                    timestamp: current_timestamp(),
                });
                fallback
            }
        }
    }

    /// Instantiate and initialize every registered component in dependency
    /// order. A failing component is logged and skipped; the loop always
    /// runs to the end. Only the first call does anything.
    pub async fn initialize(&self) -> Result<(), RegistryError> {
        if self.is_initialized() || self.inner.bulk_initializing.swap(true, Ordering::AcqRel) {
            warn!("⚠️ Registry already initialized, ignoring initialize()");
            return Err(RegistryError::AlreadyInitialized);
        }

        let order = self.initialization_order();
        info!("🔧 Initializing {} components", order.len());

        for id in &order {
            match self.get(id) {
                Some(component) => {
                    if component.state() == LifecycleState::Uninitialized {
                        component.initialize().await;
                    }
                    if !component.is_ready() {
                        error!("❌ Component {} did not become ready ({})", id, component.state());
                    }
                }
                None => error!("❌ Component {} could not be instantiated, continuing", id),
            }
        }

        self.inner.initialized.store(true, Ordering::Release);
        self.inner.bulk_initializing.store(false, Ordering::Release);

        let component_ids: Vec<String> = order
            .iter()
            .filter(|id| self.inner.instances.contains_key(id.as_str()))
            .cloned()
            .collect();
        let stats = self.stats();
        info!(
            "🎉 Component initialization complete: {}/{} ready",
            stats.ready, stats.registered
        );

        self.emit(&ComponentsInitializedEvent {
            component_count: component_ids.len(),
            component_ids,
            timestamp: current_timestamp(),
        });
        Ok(())
    }

    /// Destroy every instance in reverse initialization order, clear the
    /// cache and allow a later `initialize`. Descriptors stay registered.
    /// Recoveries scheduled before this call are abandoned.
    pub async fn destroy(&self) {
        {
            let _guard = lock(&self.inner.construction);
            self.inner.teardown_generation.fetch_add(1, Ordering::AcqRel);
        }

        let mut order = self.initialization_order();
        order.reverse();

        // Cached ids outside the order cannot normally exist; tear them down first anyway
        let stragglers: Vec<String> = self
            .inner
            .instances
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| !order.contains(id))
            .collect();

        info!("🛑 Destroying {} components", self.inner.instances.len());

        let mut destroyed = 0;
        for id in stragglers.iter().chain(order.iter()) {
            if let Some(component) = self.instance(id) {
                component.destroy().await;
                destroyed += 1;
            }
        }

        self.inner.instances.clear();
        self.inner.initialized.store(false, Ordering::Release);

        info!("🧹 Component teardown completed ({} destroyed)", destroyed);
        self.emit(&ComponentsDestroyedEvent {
            component_count: destroyed,
            timestamp: current_timestamp(),
        });
    }

    /// Resolve once `id` is cached and ready; polls every
    /// [`WAIT_POLL_INTERVAL`]. Does not construct the component.
    pub async fn wait_for(&self, id: &str, timeout: Duration) -> Result<Arc<Component>, RegistryError> {
        let poll = async {
            let mut interval = tokio::time::interval(WAIT_POLL_INTERVAL);
            loop {
                interval.tick().await;
                let ready = self.instance(id).filter(|component| component.is_ready());
                if let Some(component) = ready {
                    return component;
                }
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| RegistryError::Timeout {
                id: id.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
    }

    /// Read-only counts and the registered id list
    pub fn stats(&self) -> RegistryStats {
        let component_ids = self.registered_ids();
        RegistryStats {
            registered: component_ids.len(),
            instantiated: self.inner.instances.len(),
            ready: self
                .inner
                .instances
                .iter()
                .filter(|entry| entry.value().is_ready())
                .count(),
            component_ids,
        }
    }

    /// Stop listening for component errors. Recovery no longer happens afterwards.
    pub fn shutdown(&self) {
        if let Some(subscription) = lock(&self.inner.error_subscription).take() {
            subscription.unsubscribe();
            debug!("Registry recovery listener removed");
        }
    }

    /// Destroy, evict, recreate and initialize `id`. Returns whether the new
    /// instance is ready; `component:recovered` is published only then.
    pub async fn recover(&self, id: &str) -> bool {
        let generation = self.teardown_generation();
        self.recover_since(id, generation).await
    }

    /// Recovery that gives up as soon as a bulk destroy has run after
    /// `generation` was observed.
    async fn recover_since(&self, id: &str, generation: u64) -> bool {
        if self.torn_down_since(generation) {
            debug!("Registry was torn down, skipping recovery of {}", id);
            return false;
        }
        info!("🔄 Attempting recovery of component {}", id);

        if let Some(old) = self.instance(id) {
            old.destroy().await;
        }
        self.inner.instances.remove(id);

        let (component, created) = self.construct(id, &ComponentConfig::new(), Some(generation));
        for instance in &created {
            instance.initialize().await;
        }
        let component = match component {
            Ok(component) => component,
            Err(e) => {
                error!("❌ Recovery of {} failed, could not recreate: {}", id, e);
                return false;
            }
        };

        // Another caller may have rebuilt the id between eviction and construction
        if component.state() == LifecycleState::Uninitialized {
            component.initialize().await;
        }

        if self.torn_down_since(generation) {
            warn!("⚠️ Registry was torn down while recovering {}, discarding new instance", id);
            if !matches!(component.state(), LifecycleState::Destroying | LifecycleState::Destroyed) {
                component.destroy().await;
            }
            self.inner
                .instances
                .remove_if(id, |_, cached| Arc::ptr_eq(cached, &component));
            return false;
        }

        let current = self.instance(id).filter(|cached| Arc::ptr_eq(cached, &component));
        match current.filter(|component| component.is_ready()) {
            Some(component) => {
                info!("✅ Component {} recovered", id);
                self.emit(&ComponentRecoveredEvent {
                    component_id: id.to_string(),
                    instance_id: component.instance_id().to_string(),
                    timestamp: current_timestamp(),
                });
                true
            }
            None => {
                error!("❌ Recovery of {} failed, new instance is not ready", id);
                false
            }
        }
    }

    fn schedule_recovery(&self, event: ComponentErrorEvent) {
        let id = event.component_id;

        let Some(current) = self.instance(&id) else {
            debug!("No cached instance of {}, nothing to recover", id);
            return;
        };
        if !event.instance_id.is_empty() && event.instance_id != current.instance_id().to_string() {
            debug!("Error from a replaced instance of {}, ignoring", id);
            return;
        }
        if matches!(current.state(), LifecycleState::Destroying | LifecycleState::Destroyed) {
            debug!("Component {} is being torn down, not recovering", id);
            return;
        }
        if !lock(&self.inner.recovering).insert(id.clone()) {
            debug!("Component {} is already recovering", id);
            return;
        }

        let generation = self.teardown_generation();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let registry = self.clone();
                handle.spawn(async move {
                    registry.recover_since(&id, generation).await;
                    lock(&registry.inner.recovering).remove(&id);
                });
            }
            Err(_) => {
                warn!("⚠️ No async runtime available, cannot recover {}", id);
                lock(&self.inner.recovering).remove(&id);
            }
        }
    }

    /// Cached instance that can still be handed out
    fn live_instance(&self, id: &str) -> Option<Arc<Component>> {
        self.instance(id)
            .filter(|component| component.state() != LifecycleState::Destroyed)
    }

    fn teardown_generation(&self) -> u64 {
        self.inner.teardown_generation.load(Ordering::Acquire)
    }

    fn torn_down_since(&self, generation: u64) -> bool {
        self.teardown_generation() != generation
    }

    /// Construct `id` (and any missing dependencies) under the construction
    /// lock. Alongside the outcome, returns every instance that was created
    /// and cached, dependencies first, even when resolution failed later on.
    /// With `generation` set, nothing is built if a bulk destroy ran since.
    fn construct(
        &self,
        id: &str,
        runtime_config: &ComponentConfig,
        generation: Option<u64>,
    ) -> (Result<Arc<Component>, RegistryError>, Vec<Arc<Component>>) {
        let _guard = lock(&self.inner.construction);
        let mut created = Vec::new();
        if generation.is_some_and(|generation| self.torn_down_since(generation)) {
            return (Err(RegistryError::TornDown(id.to_string())), created);
        }
        let component = self.resolve(id, runtime_config, &mut created);
        (component, created)
    }

    /// Depth-first resolution on an explicit stack, so chain depth is bounded
    /// by memory rather than by the thread stack. `runtime_config` applies to
    /// `id` only; dependencies get their defaults.
    fn resolve(
        &self,
        id: &str,
        runtime_config: &ComponentConfig,
        created: &mut Vec<Arc<Component>>,
    ) -> Result<Arc<Component>, RegistryError> {
        if let Some(existing) = self.live_instance(id) {
            return Ok(existing);
        }

        let empty = ComponentConfig::new();
        let mut stack = vec![Pending::new(self.descriptor(id)?)];
        let mut on_stack = HashSet::from([id.to_string()]);

        while let Some(mut pending) = stack.pop() {
            if let Some(dep) = pending.next_dependency() {
                if dep == pending.descriptor.id {
                    let failed = pending.descriptor.id.clone();
                    return Err(blame_dependents(&stack, &failed, RegistryError::SelfDependency(dep)));
                }
                if let Some(existing) = self.live_instance(&dep) {
                    pending.resolved.insert(dep, existing);
                    stack.push(pending);
                    continue;
                }

                let next = if on_stack.contains(&dep) {
                    let mut path: Vec<String> = stack.iter().map(|p| p.descriptor.id.clone()).collect();
                    path.push(pending.descriptor.id.clone());
                    path.push(dep.clone());
                    Err(RegistryError::DependencyCycle(path))
                } else {
                    self.descriptor(&dep)
                };

                stack.push(pending);
                match next {
                    Ok(descriptor) => {
                        on_stack.insert(dep);
                        stack.push(Pending::new(descriptor));
                    }
                    Err(source) => return Err(blame_dependents(&stack, &dep, source)),
                }
                continue;
            }

            // Every dependency is built; build this one
            let built_id = pending.descriptor.id.clone();
            on_stack.remove(&built_id);
            let overrides = if stack.is_empty() { runtime_config } else { &empty };
            let component = self
                .instantiate(pending, overrides)
                .map_err(|source| blame_dependents(&stack, &built_id, source))?;
            created.push(component.clone());

            match stack.last_mut() {
                Some(parent) => {
                    parent.resolved.insert(built_id, component);
                }
                None => return Ok(component),
            }
        }

        unreachable!("the requested component returns once its dependencies are built")
    }

    fn descriptor(&self, id: &str) -> Result<ComponentDescriptor, RegistryError> {
        read(&self.inner.descriptors)
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotRegistered(id.to_string()))
    }

    /// Run the factory for a resolved descriptor and cache the instance
    fn instantiate(&self, pending: Pending, overrides: &ComponentConfig) -> Result<Arc<Component>, RegistryError> {
        let Pending { descriptor, resolved, .. } = pending;
        let config = merge_config(&descriptor.default_config, overrides);
        let context = ComponentContext::new(&descriptor.id, resolved, self.inner.event_bus.clone(), config);

        let hooks = catch_unwind(AssertUnwindSafe(|| (descriptor.factory)(context.clone())))
            .unwrap_or_else(|panic_info| {
                Err(ComponentError::Panicked(panic_message(panic_info.as_ref())))
            })
            .map_err(|source| RegistryError::ConstructionFailed {
                id: descriptor.id.clone(),
                source,
            })?;

        let component = Arc::new(Component::new(context, hooks));
        self.inner.instances.insert(descriptor.id.clone(), component.clone());

        debug!("🧩 Instantiated component {} ({})", descriptor.id, component.instance_id());
        Ok(component)
    }

    /// Initialize instances created by a lazy `get`, in creation order
    fn spawn_initialize(&self, created: Vec<Arc<Component>>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for component in created {
                        component.initialize().await;
                    }
                });
            }
            Err(_) => warn!(
                "⚠️ No async runtime available, {} new component(s) left uninitialized",
                created.len()
            ),
        }
    }

    fn emit<T: KernelEvent>(&self, event: &T) {
        if let Err(e) = self.inner.event_bus.emit(event) {
            error!("❌ Failed to publish {}: {}", T::event_name(), e);
        }
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("stats", &self.stats())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// A descriptor being resolved and the dependencies built for it so far
struct Pending {
    descriptor: ComponentDescriptor,
    next: usize,
    resolved: HashMap<String, Arc<Component>>,
}

impl Pending {
    fn new(descriptor: ComponentDescriptor) -> Self {
        let resolved = HashMap::with_capacity(descriptor.dependencies.len());
        Self {
            descriptor,
            next: 0,
            resolved,
        }
    }

    fn next_dependency(&mut self) -> Option<String> {
        let dep = self.descriptor.dependencies.get(self.next).cloned();
        self.next += 1;
        dep
    }
}

/// Wrap `error` (raised while resolving `failed`) in one `DependencyFailed`
/// per dependent still on the stack, innermost first.
fn blame_dependents(stack: &[Pending], failed: &str, error: RegistryError) -> RegistryError {
    let mut error = error;
    let mut dependency = failed.to_string();
    for pending in stack.iter().rev() {
        error = RegistryError::DependencyFailed {
            id: pending.descriptor.id.clone(),
            dependency,
            source: Box::new(error),
        };
        dependency = pending.descriptor.id.clone();
    }
    error
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_from_value;
    use serde_json::json;
    use std::any::Any;

    struct Plain;

    #[async_trait::async_trait]
    impl ComponentHooks for Plain {
        async fn on_initialize(&mut self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn plain(_ctx: ComponentContext) -> Result<Box<dyn ComponentHooks>, ComponentError> {
        Ok(Box::new(Plain))
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(Arc::new(EventBus::new()))
    }

    #[test]
    fn test_descriptor_dedupes_dependencies() {
        let desc = ComponentDescriptor::new("form", plain).depends_on(["places", "pricing", "places"]);
        assert_eq!(desc.dependencies(), ["places".to_string(), "pricing".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let registry = registry();
        registry
            .register("db", plain, &[], config_from_value(json!({"url": "first"})))
            .unwrap();
        let err = registry
            .register("db", plain, &["other"], config_from_value(json!({"url": "second"})))
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(ref id) if id == "db"));

        let db = registry.get("db").unwrap();
        assert_eq!(db.config()["url"], "first");
        assert!(db.dependency_ids().is_empty());
        assert_eq!(registry.registered_ids(), vec!["db".to_string()]);
    }

    #[test]
    fn test_get_unknown_is_none() {
        assert!(registry().get("nope").is_none());
    }

    #[test]
    fn test_runtime_config_overrides_defaults() {
        let registry = registry();
        registry
            .register("places", plain, &[], config_from_value(json!({"limit": 5, "lang": "en"})))
            .unwrap();

        let places = registry
            .get_with_config("places", &config_from_value(json!({"limit": 10})))
            .unwrap();
        assert_eq!(places.config()["limit"], 10);
        assert_eq!(places.config()["lang"], "en");
    }

    #[test]
    fn test_factory_error_is_resolution_error() {
        let registry = registry();
        registry
            .register("broken", |_| Err(ComponentError::construction("no api key")), &[], ComponentConfig::new())
            .unwrap();
        registry.register("user", plain, &["broken"], ComponentConfig::new()).unwrap();

        let err = registry.try_get("user", &ComponentConfig::new()).unwrap_err();
        match err {
            RegistryError::DependencyFailed { dependency, source, .. } => {
                assert_eq!(dependency, "broken");
                assert!(matches!(*source, RegistryError::ConstructionFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.instance("user").is_none());
    }

    #[test]
    fn test_panicking_factory_is_contained() {
        let registry = registry();
        registry
            .register("wild", |_| panic!("factory exploded"), &[], ComponentConfig::new())
            .unwrap();
        let err = registry.try_get("wild", &ComponentConfig::new()).unwrap_err();
        assert!(err.to_string().contains("factory exploded"));
    }

    #[test]
    fn test_resolution_cycle_is_rejected() {
        let registry = registry();
        registry.register("x", plain, &["y"], ComponentConfig::new()).unwrap();
        registry.register("y", plain, &["x"], ComponentConfig::new()).unwrap();

        let err = registry.try_get("x", &ComponentConfig::new()).unwrap_err();
        let RegistryError::DependencyFailed { source, .. } = err else {
            panic!("expected dependency failure");
        };
        let RegistryError::DependencyFailed { source: inner, .. } = *source else {
            panic!("expected nested dependency failure");
        };
        assert!(matches!(*inner, RegistryError::DependencyCycle(ref path) if path == &["x", "y", "x"]));
        assert_eq!(registry.stats().instantiated, 0);
    }

    #[test]
    fn test_self_dependency_below_root_is_wrapped() {
        let registry = registry();
        registry.register("loop", plain, &["loop"], ComponentConfig::new()).unwrap();
        registry.register("user", plain, &["loop"], ComponentConfig::new()).unwrap();

        let err = registry.try_get("user", &ComponentConfig::new()).unwrap_err();
        let RegistryError::DependencyFailed { id, dependency, source } = err else {
            panic!("expected dependency failure");
        };
        assert_eq!((id.as_str(), dependency.as_str()), ("user", "loop"));
        assert!(matches!(*source, RegistryError::SelfDependency(ref id) if id == "loop"));
    }

    #[test]
    fn test_deep_dependency_chain_resolves() {
        const DEPTH: usize = 20_000;
        let registry = registry();
        for i in 0..DEPTH {
            let deps: Vec<String> = if i + 1 < DEPTH { vec![format!("n{}", i + 1)] } else { Vec::new() };
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            registry.register(&format!("n{i}"), plain, &deps, ComponentConfig::new()).unwrap();
        }

        let head = registry.get("n0").unwrap();
        assert_eq!(head.dependency_ids(), vec!["n1".to_string()]);
        assert_eq!(registry.stats().instantiated, DEPTH);

        // Dropping the last owner of a long Arc chain recurses per link
        std::mem::forget(head);
        std::mem::forget(registry);
    }

    #[test]
    fn test_stats_without_runtime() {
        let registry = registry();
        registry.register("a", plain, &[], ComponentConfig::new()).unwrap();
        registry.register("b", plain, &["a"], ComponentConfig::new()).unwrap();
        registry.get("b");

        let stats = registry.stats();
        assert_eq!(stats.registered, 2);
        assert_eq!(stats.instantiated, 2);
        assert_eq!(stats.ready, 0);
        assert_eq!(stats.component_ids, vec!["a".to_string(), "b".to_string()]);
    }
}
