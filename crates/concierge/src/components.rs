//! Generic components built from the manifest.
//!
//! A [`ManifestComponent`] has no domain logic of its own. Its behaviour is
//! driven entirely by its merged config:
//!
//! * `startup_delay_ms` - sleep inside `on_initialize`
//! * `fail_initializations` - fail the first N initialize attempts for this id
//! * `shutdown_delay_ms` - sleep inside `on_destroy`
//!
//! The attempt counter lives in the factory, so it survives recreation by the
//! registry's recovery cycle and a later attempt can succeed.

use crate::config::ComponentSpec;
use async_trait::async_trait;
use component_kernel::{
    ComponentContext, ComponentError, ComponentHooks, ComponentRegistry, LifecycleState,
};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ManifestComponent {
    attempts: Arc<AtomicU64>,
}

impl ManifestComponent {
    pub fn new(attempts: Arc<AtomicU64>) -> Self {
        Self { attempts }
    }

    /// Initialize attempts made for this id so far, across all instances
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComponentHooks for ManifestComponent {
    async fn on_initialize(&mut self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        let delay = ctx.config_u64("startup_delay_ms", 0);
        if delay > 0 {
            debug!("⏳ {} warming up for {}ms", ctx.id(), delay);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        for (dep_id, dep) in ctx.dependencies() {
            if dep.state() != LifecycleState::Ready {
                warn!("⚠️ {} starting while dependency {} is {}", ctx.id(), dep_id, dep.state());
            }
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let planned_failures = ctx.config_u64("fail_initializations", 0);
        if attempt <= planned_failures {
            return Err(ComponentError::initialization(format!(
                "simulated failure {attempt}/{planned_failures}"
            )));
        }

        info!("🧩 {} online (attempt {})", ctx.id(), attempt);
        Ok(())
    }

    async fn on_destroy(&mut self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        let delay = ctx.config_u64("shutdown_delay_ms", 0);
        if delay > 0 {
            debug!("⏳ {} draining for {}ms", ctx.id(), delay);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    fn on_error(&mut self, ctx: &ComponentContext, error: &ComponentError, context: &str) {
        warn!("🩹 {} failed during {} (attempt {}): {}", ctx.id(), context, self.attempts(), error);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Register every enabled manifest entry. Duplicates are logged and skipped.
/// Returns how many were registered.
pub fn register_manifest<'a>(
    registry: &ComponentRegistry,
    specs: impl IntoIterator<Item = &'a ComponentSpec>,
) -> usize {
    let mut registered = 0;
    for spec in specs {
        let attempts = Arc::new(AtomicU64::new(0));
        let deps: Vec<&str> = spec.depends_on.iter().map(String::as_str).collect();

        let result = registry.register(
            &spec.id,
            move |_ctx| Ok(Box::new(ManifestComponent::new(attempts.clone())) as Box<dyn ComponentHooks>),
            &deps,
            spec.config.clone(),
        );

        match result {
            Ok(()) => registered += 1,
            Err(e) => warn!("⚠️ Skipping manifest entry {}: {}", spec.id, e),
        }
    }
    registered
}
