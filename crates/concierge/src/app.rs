//! Main application logic and lifecycle management.
//!
//! The `Application` wires the event bus and component registry together,
//! registers the manifest, drives startup and readiness checks, reports
//! statistics while running and tears everything down on shutdown.

use crate::cli::CliArgs;
use crate::components::register_manifest;
use crate::config::AppConfig;
use crate::logging::display_banner;
use crate::signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent};
use component_kernel::{
    ComponentErrorEvent, ComponentRecoveredEvent, ComponentRegistry, DependencyCycleEvent,
    EventBus, RegistryError, Subscription,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of the startup phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub ready: Vec<String>,
    pub not_ready: Vec<String>,
}

/// Host application.
///
/// Owns the registry for its whole life; the event bus is shared with the
/// registry and the host's own observers.
pub struct Application {
    config: AppConfig,
    event_bus: Arc<EventBus>,
    registry: ComponentRegistry,
    observers: Vec<Subscription>,
    once: bool,
}

impl Application {
    /// Creates a new application from an already loaded configuration.
    ///
    /// Applies CLI overrides, validates, then registers the manifest.
    pub fn new(args: CliArgs, mut config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let event_bus = Arc::new(EventBus::new());
        let registry = ComponentRegistry::new(event_bus.clone());
        let observers = subscribe_observers(&event_bus);

        let registered = register_manifest(&registry, config.enabled_components());
        info!(
            "📂 Config: {} | Components registered: {}",
            args.config_path.display(),
            registered
        );

        Ok(Self {
            config,
            event_bus,
            registry,
            observers,
            once: args.once,
        })
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Bulk-initialize the registry, then wait for every component to report
    /// ready within the configured timeout.
    pub async fn start(&self) -> StartupReport {
        self.log_configuration_summary();

        if let Err(e) = self.registry.initialize().await {
            warn!("⚠️ {}", e);
        }

        let timeout = Duration::from_millis(self.config.registry.wait_timeout_ms);
        let ids = self.registry.registered_ids();
        let waits = ids.iter().map(|id| self.registry.wait_for(id, timeout));

        let mut report = StartupReport::default();
        for (id, outcome) in ids.iter().zip(join_all(waits).await) {
            match outcome {
                Ok(_) => report.ready.push(id.clone()),
                Err(RegistryError::Timeout { timeout_ms, .. }) => {
                    warn!("⏰ {} not ready after {}ms", id, timeout_ms);
                    report.not_ready.push(id.clone());
                }
                Err(e) => {
                    error!("❌ Waiting for {} failed: {}", id, e);
                    report.not_ready.push(id.clone());
                }
            }
        }

        info!(
            "📊 Startup complete: {}/{} components ready",
            report.ready.len(),
            ids.len()
        );
        report
    }

    /// Runs the application until a shutdown signal (or straight through
    /// with `--once`), then tears down in reverse dependency order.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Concierge");

        self.start().await;

        let monitoring_handle = self.spawn_monitoring();

        if self.once {
            info!("🏁 --once given, shutting down after startup");
        } else {
            info!("✅ Concierge is now running!");
            info!("🛑 Press Ctrl+C to gracefully shutdown");

            wait_for_shutdown_signal().await?;

            // A second signal skips the graceful path
            tokio::spawn(async move {
                if let Err(e) = wait_for_shutdown_signal_silent().await {
                    error!("Failed to set up forced shutdown signal handler: {e}");
                    return;
                }
                warn!("Shutdown signal received again, exiting immediately.");
                std::process::exit(1);
            });
        }

        if let Some(handle) = monitoring_handle {
            handle.abort();
        }

        self.shutdown().await;
        info!("👋 Concierge shutdown complete");
        Ok(())
    }

    /// Destroy all components, stop recovery and drop host observers
    pub async fn shutdown(&self) {
        info!("🧹 Tearing down components...");
        self.registry.destroy().await;
        self.registry.shutdown();
        for observer in &self.observers {
            observer.unsubscribe();
        }
        log_final_statistics(&self.event_bus);
    }

    fn spawn_monitoring(&self) -> Option<tokio::task::JoinHandle<()>> {
        let interval_ms = self.config.registry.report_interval_ms;
        if interval_ms == 0 {
            return None;
        }

        let registry = self.registry.clone();
        let event_bus = self.event_bus.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            // first tick fires immediately; startup already logged the state
            interval.tick().await;
            loop {
                interval.tick().await;
                let stats = registry.stats();
                let bus = event_bus.stats();
                info!(
                    "📊 Health - {}/{} ready | {} instantiated | {} events published | {} subscriber failures",
                    stats.ready,
                    stats.registered,
                    stats.instantiated,
                    bus.events_published,
                    bus.callback_failures
                );
            }
        }))
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🪵 Log level: {}", self.config.logging.level);
        info!("  ⏱️ Readiness timeout: {}ms", self.config.registry.wait_timeout_ms);
        info!(
            "  🔢 Initialization order: {}",
            self.registry.initialization_order().join(" -> ")
        );
    }
}

/// Host-side logging of the interesting registry events
fn subscribe_observers(event_bus: &EventBus) -> Vec<Subscription> {
    vec![
        event_bus.on(|event: ComponentErrorEvent| {
            warn!("🚨 {} reported an error during {}: {}", event.component_id, event.context, event.error);
            Ok(())
        }),
        event_bus.on(|event: ComponentRecoveredEvent| {
            info!("🔄 {} recovered as {}", event.component_id, event.instance_id);
            Ok(())
        }),
        event_bus.on(|event: DependencyCycleEvent| {
            warn!(
                "🔁 Dependency cycle among {:?}; starting in registration order {:?}",
                event.cycle, event.fallback_order
            );
            Ok(())
        }),
    ]
}

fn log_final_statistics(event_bus: &EventBus) {
    let stats = event_bus.stats();
    info!("📊 Final Statistics:");
    info!("  - Events published: {}", stats.events_published);
    info!("  - Callbacks invoked: {}", stats.callbacks_invoked);
    info!("  - Callback failures: {}", stats.callback_failures);
}
