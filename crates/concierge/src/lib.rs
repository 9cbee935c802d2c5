//! # Concierge - component host
//!
//! Runs a manifest of components on top of `component_kernel`: registers
//! them, starts them in dependency order, waits for readiness, supervises
//! recovery and tears them down in reverse order on shutdown.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (creates concierge.toml if missing)
//! concierge
//!
//! # Specify custom configuration
//! concierge --config production.toml --log-level debug
//!
//! # Start, report and exit
//! concierge --once --json-logs
//! ```
//!
//! ## Signal Handling
//!
//! Graceful shutdown on SIGINT (Ctrl+C) and SIGTERM (Unix systems). A second
//! signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod components;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Entry point called from `main`.
///
/// Parses arguments, loads the configuration, sets up logging and runs the
/// application. Exits the process with code 1 on startup or runtime errors.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load {}: {e}", args.config_path.display());
            std::process::exit(1);
        }
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args, config) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for library usage
pub use config::{ComponentSpec, LoggingSettings, RegistrySettings};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_file_to_running_application() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("concierge.toml");
        tokio::fs::write(
            &path,
            r#"
[logging]
level = "warn"

[registry]
wait_timeout_ms = 500
report_interval_ms = 0

[[components]]
id = "geo"

[[components]]
id = "places"
depends_on = ["geo"]

[components.config]
startup_delay_ms = 10
"#,
        )
        .await
        .unwrap();

        let args = CliArgs::try_parse_from(["concierge", "--config", path.to_str().unwrap(), "--once"]).unwrap();
        let config = AppConfig::load_from_file(&args.config_path).await.unwrap();
        let app = Application::new(args, config).unwrap();

        let report = app.start().await;
        assert_eq!(report.ready, vec!["geo", "places"]);
        app.shutdown().await;
    }
}
