//! Logging system setup and configuration.
//!
//! Initializes the tracing-based logging system with either human-readable
//! or JSON output.

use crate::config::LoggingSettings;
use component_kernel::COMPONENT_KERNEL_VERSION;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// Installs a tracing-subscriber registry with an env filter and either the
/// human-readable or the JSON formatter. Thread ids and names are included
/// so recovery tasks can be told apart from the startup path.
///
/// # Arguments
///
/// * `config` - Logging settings from the config file
/// * `json_format` - Force JSON output (the `--json-logs` flag)
///
/// # Returns
///
/// `Ok(())` once the global subscriber is installed, or an error if one was
/// already set for this process.
///
/// # Example
///
/// ```no_run
/// use lib_concierge::{logging::setup_logging, LoggingSettings};
///
/// let settings = LoggingSettings { level: "info".to_string(), json_format: false };
/// setup_logging(&settings, false)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// `RUST_LOG` takes precedence over `config.level` when set.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Startup banner, written through the logger.
///
/// Shows the host version next to the component kernel version it was
/// built against.
pub fn display_banner() {
    for line in banner_lines() {
        info!("{}", line);
    }
}

/// Banner text, one entry per logged line
pub fn banner_lines() -> Vec<String> {
    let version = format!(
        "v{} (kernel {})",
        env!("CARGO_PKG_VERSION"),
        COMPONENT_KERNEL_VERSION
    );
    vec![
        "╔══════════════════════════════════════════╗".to_string(),
        "║             🛎️  CONCIERGE  🛎️              ║".to_string(),
        format!("║  {:<40}║", version),
        "║                                          ║".to_string(),
        "║  Dependency-ordered component startup    ║".to_string(),
        "║  with readiness waits and recovery       ║".to_string(),
        "╚══════════════════════════════════════════╝".to_string(),
    ]
}
