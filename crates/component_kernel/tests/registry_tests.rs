use component_kernel::events::{
    COMPONENTS_DESTROYED, COMPONENTS_INITIALIZED, COMPONENT_ERROR, COMPONENT_INITIALIZED,
    COMPONENT_RECOVERED, COMPONENT_REGISTERED, DEPENDENCY_CYCLE,
};
use component_kernel::{
    Component, ComponentConfig, ComponentContext, ComponentError, ComponentErrorEvent,
    ComponentHooks, ComponentRegistry, EventBus, LifecycleState, RegistryError, Subscription,
};
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Journal = Arc<Mutex<Vec<String>>>;

/// Records every hook call; fails `on_initialize` while `failures_left > 0`
struct Tracked {
    journal: Journal,
    failures_left: Arc<AtomicU32>,
    startup_delay: Duration,
}

#[async_trait::async_trait]
impl ComponentHooks for Tracked {
    async fn on_initialize(&mut self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.journal.lock().unwrap().push(format!("init:{}", ctx.id()));
        if !self.startup_delay.is_zero() {
            tokio::time::sleep(self.startup_delay).await;
        }
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ComponentError::initialization(format!("{} unavailable", ctx.id())));
        }
        Ok(())
    }

    async fn on_destroy(&mut self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.journal.lock().unwrap().push(format!("destroy:{}", ctx.id()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Harness {
    bus: Arc<EventBus>,
    registry: ComponentRegistry,
    journal: Journal,
}

struct Registered {
    failures_left: Arc<AtomicU32>,
    constructions: Arc<AtomicU32>,
}

fn harness() -> Harness {
    let bus = Arc::new(EventBus::new());
    Harness {
        registry: ComponentRegistry::new(bus.clone()),
        bus,
        journal: Arc::new(Mutex::new(Vec::new())),
    }
}

impl Harness {
    fn add(&self, id: &str, deps: &[&str]) -> Registered {
        self.add_with(id, deps, 0, Duration::ZERO)
    }

    fn add_with(&self, id: &str, deps: &[&str], failures: u32, startup_delay: Duration) -> Registered {
        let journal = self.journal.clone();
        let failures_left = Arc::new(AtomicU32::new(failures));
        let constructions = Arc::new(AtomicU32::new(0));
        let (shared_failures, shared_constructions) = (failures_left.clone(), constructions.clone());

        self.registry
            .register(
                id,
                move |_ctx| {
                    shared_constructions.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(Tracked {
                        journal: journal.clone(),
                        failures_left: shared_failures.clone(),
                        startup_delay,
                    }) as Box<dyn ComponentHooks>)
                },
                deps,
                ComponentConfig::new(),
            )
            .unwrap();

        Registered { failures_left, constructions }
    }

    fn entries(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    fn capture(&self, name: &str) -> (Arc<Mutex<Vec<Value>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = self.bus.subscribe(name, move |payload| {
            sink.lock().unwrap().push(payload.clone());
            Ok(())
        });
        (seen, subscription)
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn ids(events: &Arc<Mutex<Vec<Value>>>) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .map(|e| e["componentId"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test_log::test(tokio::test)]
async fn test_db_cache_api_scenario() {
    let h = harness();
    let (initialized, _sub) = h.capture(COMPONENT_INITIALIZED);
    let (bulk, _bulk_sub) = h.capture(COMPONENTS_INITIALIZED);

    h.add("db", &[]);
    h.add("cache", &["db"]);
    h.add("api", &["cache"]);

    assert_eq!(h.registry.initialization_order(), vec!["db", "cache", "api"]);
    h.registry.initialize().await.unwrap();

    assert_eq!(ids(&initialized), vec!["db", "cache", "api"]);
    assert_eq!(h.entries(), vec!["init:db", "init:cache", "init:api"]);
    assert_eq!(h.registry.stats().ready, 3);
    assert!(h.registry.is_initialized());

    let bulk = bulk.lock().unwrap().clone();
    assert_eq!(bulk.len(), 1);
    assert_eq!(bulk[0]["componentCount"], 3);
}

#[tokio::test]
async fn test_order_respects_dependencies_regardless_of_registration() {
    let h = harness();
    h.add("form", &["validation", "places", "pricing"]);
    h.add("places", &["geo"]);
    h.add("pricing", &["settings"]);
    h.add("validation", &["settings"]);
    h.add("geo", &["settings"]);
    h.add("settings", &[]);

    let order = h.registry.initialization_order();
    assert_eq!(order.len(), 6);
    let position = |id: &str| order.iter().position(|x| x == id).unwrap();
    for (id, deps) in h.registry.dependency_graph() {
        for dep in deps {
            assert!(position(&dep) < position(&id), "{dep} must precede {id}");
        }
    }

    h.registry.initialize().await.unwrap();
    let inits: Vec<String> = h.entries().into_iter().map(|e| e.replace("init:", "")).collect();
    assert_eq!(inits, order);
}

#[tokio::test]
async fn test_cycle_falls_back_to_registration_order() {
    let h = harness();
    let (cycles, _sub) = h.capture(DEPENDENCY_CYCLE);
    let (bulk, _bulk_sub) = h.capture(COMPONENTS_INITIALIZED);
    h.add("x", &["y"]);
    h.add("y", &["x"]);

    assert_eq!(h.registry.initialization_order(), vec!["x", "y"]);
    {
        let cycles = cycles.lock().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0]["cycle"], serde_json::json!(["x", "y"]));
        assert_eq!(cycles[0]["fallbackOrder"], serde_json::json!(["x", "y"]));
    }

    // Neither can be constructed, but bulk initialize still completes
    h.registry.initialize().await.unwrap();
    assert!(h.registry.get("x").is_none());
    assert_eq!(h.registry.stats().instantiated, 0);
    assert_eq!(bulk.lock().unwrap()[0]["componentCount"], 0);
}

#[tokio::test]
async fn test_self_dependency_is_rejected() {
    let h = harness();
    h.add("loop", &["loop"]);

    assert!(h.registry.get("loop").is_none());
    let err = h.registry.try_get("loop", &ComponentConfig::new()).unwrap_err();
    assert!(matches!(err, RegistryError::SelfDependency(ref id) if id == "loop"));
}

#[test]
fn test_registered_event_carries_dependencies() {
    let h = harness();
    let (registered, _sub) = h.capture(COMPONENT_REGISTERED);
    h.add("cache", &["db"]);

    let registered = registered.lock().unwrap();
    assert_eq!(registered[0]["componentId"], "cache");
    assert_eq!(registered[0]["dependencies"], serde_json::json!(["db"]));
}

#[test]
fn test_at_most_one_instance() {
    let h = harness();
    let db = h.add("db", &[]);
    let api = h.add("api", &["db"]);

    let first = h.registry.get("api").unwrap();
    let second = h.registry.get("api").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let injected = first.get_dependency("db").unwrap();
    assert!(Arc::ptr_eq(&injected, &h.registry.get("db").unwrap()));

    assert_eq!(db.constructions.load(Ordering::SeqCst), 1);
    assert_eq!(api.constructions.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_gets_construct_once() {
    let h = harness();
    let db = h.add("db", &[]);
    let api = h.add("api", &["db"]);

    let instances: Vec<Arc<Component>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| h.registry.get("api").unwrap()))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(db.constructions.load(Ordering::SeqCst), 1);
    assert_eq!(api.constructions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_destroy_runs_in_reverse_order() {
    let h = harness();
    let (destroyed, _sub) = h.capture(COMPONENTS_DESTROYED);
    h.add("a", &[]);
    h.add("b", &["a"]);
    h.add("c", &["b"]);
    h.registry.initialize().await.unwrap();
    let b = h.registry.get("b").unwrap();

    h.registry.destroy().await;

    let teardown: Vec<String> = h.entries().into_iter().filter(|e| e.starts_with("destroy:")).collect();
    assert_eq!(teardown, vec!["destroy:c", "destroy:b", "destroy:a"]);
    assert_eq!(b.state(), LifecycleState::Destroyed);
    assert_eq!(h.registry.stats().instantiated, 0);
    assert!(!h.registry.is_initialized());
    assert_eq!(destroyed.lock().unwrap()[0]["componentCount"], 3);

    // Descriptors survive; a destroyed instance is never handed out again
    assert!(h.registry.is_registered("b"));
    let fresh = h.registry.get("b").unwrap();
    assert!(!Arc::ptr_eq(&fresh, &b));
}

#[tokio::test]
async fn test_initialize_twice_is_noop() {
    let h = harness();
    h.add("db", &[]);

    h.registry.initialize().await.unwrap();
    let err = h.registry.initialize().await.unwrap_err();

    assert!(matches!(err, RegistryError::AlreadyInitialized));
    assert_eq!(h.count("init:db"), 1);
}

#[tokio::test]
async fn test_reinitialize_after_destroy() {
    let h = harness();
    h.add("db", &[]);
    h.add("api", &["db"]);

    h.registry.initialize().await.unwrap();
    let before = h.registry.get("api").unwrap().instance_id();
    h.registry.destroy().await;
    h.registry.initialize().await.unwrap();

    let after = h.registry.get("api").unwrap();
    assert!(after.is_ready());
    assert_ne!(after.instance_id(), before);
    assert_eq!(h.registry.stats().ready, 2);
}

#[tokio::test]
async fn test_bulk_initialize_continues_past_failures() {
    let h = harness();
    let (bulk, _sub) = h.capture(COMPONENTS_INITIALIZED);
    h.registry
        .register(
            "broken",
            |_| Err(ComponentError::construction("missing credentials")),
            &[],
            ComponentConfig::new(),
        )
        .unwrap();
    h.add("needs_broken", &["broken"]);
    h.add("ok", &[]);

    h.registry.initialize().await.unwrap();

    assert!(h.registry.instance("broken").is_none());
    assert!(h.registry.instance("needs_broken").is_none());
    assert!(h.registry.instance("ok").unwrap().is_ready());
    assert_eq!(bulk.lock().unwrap()[0]["componentIds"], serde_json::json!(["ok"]));
}

#[tokio::test]
async fn test_lazy_get_after_initialize_starts_component() {
    let h = harness();
    h.add("db", &[]);
    h.registry.initialize().await.unwrap();

    h.add("late", &["db"]);
    let late = h.registry.get("late").unwrap();
    assert_eq!(late.state(), LifecycleState::Uninitialized);

    let ready = h.registry.wait_for("late", Duration::from_secs(2)).await.unwrap();
    assert!(Arc::ptr_eq(&ready, &late));
    assert_eq!(h.count("init:late"), 1);
    assert_eq!(h.count("init:db"), 1);
}

#[tokio::test]
async fn test_lazy_get_starts_dependencies_built_before_a_failure() {
    let h = harness();
    h.add("db", &[]);
    h.registry.initialize().await.unwrap();

    h.add("fresh", &[]);
    h.add("late", &["fresh", "missing"]);
    assert!(h.registry.get("late").is_none());
    assert!(h.registry.instance("late").is_none());

    let fresh = h.registry.wait_for("fresh", Duration::from_secs(2)).await.unwrap();
    assert!(fresh.is_ready());
    assert_eq!(h.count("init:fresh"), 1);
}

#[tokio::test]
async fn test_wait_for_resolves_once_ready() {
    let h = harness();
    h.add_with("slow", &[], 0, Duration::from_millis(120));

    let registry = h.registry.clone();
    let startup = tokio::spawn(async move { registry.initialize().await });

    let slow = h.registry.wait_for("slow", Duration::from_secs(2)).await.unwrap();
    assert!(slow.is_ready());
    startup.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_for_times_out() {
    let h = harness();
    let err = h
        .registry
        .wait_for("missing", Duration::from_millis(120))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Timeout { ref id, timeout_ms: 120 } if id == "missing"));
}

#[test_log::test(tokio::test)]
async fn test_recovery_replaces_failed_component() {
    let h = harness();
    let (recovered, _sub) = h.capture(COMPONENT_RECOVERED);
    h.add("db", &[]);
    h.registry.initialize().await.unwrap();
    let original = h.registry.get("db").unwrap();

    original.report_error(ComponentError::runtime("connection reset"), "query");
    assert_eq!(original.state(), LifecycleState::Errored);

    eventually("recovered event", || recovered.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let replacement = h.registry.get("db").unwrap();
    assert!(replacement.is_ready());
    assert_ne!(replacement.instance_id(), original.instance_id());
    assert_eq!(original.state(), LifecycleState::Destroyed);

    // Exactly one destroy, one recreate and one re-initialize
    assert_eq!(h.entries(), vec!["init:db", "destroy:db", "init:db"]);
    let recovered = recovered.lock().unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0]["instanceId"], replacement.instance_id().to_string());
}

#[tokio::test]
async fn test_failed_recovery_reports_again_without_recovered_event() {
    let h = harness();
    let (recovered, _s1) = h.capture(COMPONENT_RECOVERED);
    let (errors, _s2) = h.capture(COMPONENT_ERROR);
    let db = h.add("db", &[]);
    h.registry.initialize().await.unwrap();

    db.failures_left.store(1, Ordering::SeqCst);
    h.registry
        .get("db")
        .unwrap()
        .report_error(ComponentError::runtime("disk full"), "write");

    eventually("second error event", || errors.lock().unwrap().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(errors.lock().unwrap().len(), 2);
    assert_eq!(errors.lock().unwrap()[1]["context"], "initialize");
    assert!(recovered.lock().unwrap().is_empty());
    assert_eq!(h.entries(), vec!["init:db", "destroy:db", "init:db"]);
    assert_eq!(h.registry.get("db").unwrap().state(), LifecycleState::Errored);
    assert_eq!(db.constructions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_startup_failure_recovers_once() {
    let h = harness();
    let (recovered, _sub) = h.capture(COMPONENT_RECOVERED);
    h.add_with("flaky", &[], 1, Duration::ZERO);

    h.registry.initialize().await.unwrap();
    let flaky = h.registry.wait_for("flaky", Duration::from_secs(2)).await.unwrap();

    assert!(flaky.is_ready());
    assert_eq!(recovered.lock().unwrap().len(), 1);
    assert_eq!(h.count("init:flaky"), 2);
    assert_eq!(h.count("destroy:flaky"), 1);
}

#[tokio::test]
async fn test_external_error_report_triggers_recovery() {
    let h = harness();
    let (recovered, _sub) = h.capture(COMPONENT_RECOVERED);
    h.add("db", &[]);
    h.registry.initialize().await.unwrap();

    h.bus
        .emit(&ComponentErrorEvent {
            component_id: "db".into(),
            instance_id: String::new(),
            error: "health check failed".into(),
            context: "monitor".into(),
            timestamp: 0,
        })
        .unwrap();

    eventually("recovered event", || recovered.lock().unwrap().len() == 1).await;
    assert_eq!(h.count("destroy:db"), 1);
}

#[tokio::test]
async fn test_errors_for_unknown_or_stale_instances_are_ignored() {
    let h = harness();
    h.add("db", &[]);
    h.registry.initialize().await.unwrap();

    for (id, instance) in [("ghost", String::new()), ("db", "not-the-current-instance".to_string())] {
        h.bus
            .emit(&ComponentErrorEvent {
                component_id: id.into(),
                instance_id: instance,
                error: "boom".into(),
                context: "test".into(),
                timestamp: 0,
            })
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.entries(), vec!["init:db"]);
    assert!(h.registry.get("db").unwrap().is_ready());
}

#[tokio::test]
async fn test_shutdown_stops_recovery() {
    let h = harness();
    h.add("db", &[]);
    h.registry.initialize().await.unwrap();
    h.registry.shutdown();

    let db = h.registry.get("db").unwrap();
    db.report_error(ComponentError::runtime("lost"), "poll");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.count("destroy:db"), 0);
    assert_eq!(db.state(), LifecycleState::Errored);
}

#[tokio::test]
async fn test_pending_recovery_is_dropped_by_destroy() {
    let h = harness();
    h.add("db", &[]);
    h.registry.initialize().await.unwrap();
    let (recovered, _sub) = h.capture(COMPONENT_RECOVERED);

    let db = h.registry.get("db").unwrap();
    db.report_error(ComponentError::runtime("connection reset"), "query");
    h.registry.destroy().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = h.registry.stats();
    assert_eq!((stats.instantiated, stats.ready), (0, 0));
    assert!(!h.registry.is_initialized());
    assert_eq!(h.entries(), vec!["init:db", "destroy:db"]);
    assert!(recovered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_recovery_in_flight_does_not_outlive_destroy() {
    let h = harness();
    h.add_with("db", &[], 0, Duration::from_millis(80));
    h.registry.initialize().await.unwrap();
    let (recovered, _sub) = h.capture(COMPONENT_RECOVERED);

    let db = h.registry.get("db").unwrap();
    db.report_error(ComponentError::runtime("connection reset"), "query");
    eventually("replacement to start", || h.count("init:db") == 2).await;

    h.registry.destroy().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let stats = h.registry.stats();
    assert_eq!((stats.instantiated, stats.ready), (0, 0));
    assert!(!h.registry.is_initialized());
    assert_eq!(h.count("init:db"), 2);
    assert_eq!(h.count("destroy:db"), 2);
    assert!(recovered.lock().unwrap().is_empty());
}
