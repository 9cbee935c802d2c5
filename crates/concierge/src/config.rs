//! Configuration management for the Concierge host.
//!
//! This module handles loading and validation of the host configuration
//! (logging, registry tuning and the component manifest) from TOML files.

use component_kernel::ComponentConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

fn default_wait_timeout_ms() -> u64 {
    5000
}

fn default_report_interval_ms() -> u64 {
    30_000
}

fn default_enabled() -> bool {
    true
}

/// Application configuration loaded from TOML file.
///
/// Encompasses logging, registry tuning and the list of components the host
/// registers at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Registry tuning
    #[serde(default)]
    pub registry: RegistrySettings,
    /// Component manifest, in registration order
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

/// Registry behaviour as seen from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// How long the host waits for each component to become ready
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Interval of the periodic stats report; 0 disables it
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

/// One `[[components]]` manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Skipped at registration when false
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Default config handed to the component
    #[serde(default)]
    pub config: ComponentConfig,
}

impl ComponentSpec {
    pub fn new(id: &str, depends_on: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            enabled: true,
            config: ComponentConfig::new(),
        }
    }

    pub fn with_setting(mut self, key: &str, value: serde_json::Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            registry: RegistrySettings::default(),
            components: vec![
                ComponentSpec::new("db", &[]).with_setting("startup_delay_ms", json!(100)),
                ComponentSpec::new("cache", &["db"]).with_setting("startup_delay_ms", json!(50)),
                ComponentSpec::new("api", &["cache"]).with_setting("fail_initializations", json!(1)),
            ],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration.
    ///
    /// Dependency cycles and unknown dependencies are left to the registry,
    /// which degrades gracefully on both.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.registry.wait_timeout_ms == 0 {
            return Err("registry.wait_timeout_ms must be greater than 0".to_string());
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if component.id.trim().is_empty() {
                return Err("Component ids cannot be empty".to_string());
            }
            if !seen.insert(component.id.as_str()) {
                return Err(format!("Duplicate component id: {}", component.id));
            }
        }

        Ok(())
    }

    /// Manifest entries that should be registered
    pub fn enabled_components(&self) -> impl Iterator<Item = &ComponentSpec> {
        self.components.iter().filter(|c| c.enabled)
    }
}
