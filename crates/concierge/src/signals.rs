//! Signal handling for graceful shutdown.
//!
//! The first SIGINT/SIGTERM (Ctrl+C on Windows) starts a graceful teardown;
//! the application listens again so a second signal can force the exit.

use tokio::signal;
use tracing::info;

/// Waits for a termination signal and logs it.
///
/// Used by the host's run loop to start a graceful teardown of the registry.
///
/// # Returns
///
/// `Ok(())` once SIGINT or SIGTERM (Ctrl+C on Windows) arrives, or an error
/// if the signal handlers could not be installed.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// lib_concierge::signals::wait_for_shutdown_signal().await?;
/// // tear down components here
/// # Ok(())
/// # }
/// ```
pub async fn wait_for_shutdown_signal() -> Result<(), Box<dyn std::error::Error>> {
    wait_for_shutdown_signal_silent().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    Ok(())
}

/// Waits for a termination signal without logging.
///
/// The host races this against an in-progress teardown so a second signal
/// forces the exit.
///
/// # Platform Support
///
/// * **Unix** - SIGINT and SIGTERM
/// * **Windows** - Ctrl+C
///
/// # Returns
///
/// `Ok(())` when a signal arrives, or an error if a handler could not be
/// registered with the runtime.
pub async fn wait_for_shutdown_signal_silent() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}
