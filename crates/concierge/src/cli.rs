//! Command-line interface handling for the Concierge host.
//!
//! Argument parsing uses the `clap` builder API.

use clap::{Arg, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Holds the options that override configuration file settings or change
/// how the host runs.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Start, report and tear down without waiting for a shutdown signal
    pub once: bool,
}

impl CliArgs {
    /// Parses the process arguments using clap.
    ///
    /// # Returns
    ///
    /// A `CliArgs` with every option resolved; the config path falls back to
    /// `concierge.toml`.
    ///
    /// # Panics
    ///
    /// Never panics on bad input; clap prints usage and exits the process
    /// instead.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list.
    ///
    /// # Arguments
    ///
    /// * `args` - Argument list; the first item is the binary name
    ///
    /// # Returns
    ///
    /// The parsed arguments, or the clap error describing the bad input.
    ///
    /// # Example
    ///
    /// ```
    /// use lib_concierge::cli::CliArgs;
    ///
    /// let args = CliArgs::try_parse_from(["concierge", "--once", "-l", "debug"]).unwrap();
    /// assert!(args.once);
    /// assert_eq!(args.log_level.as_deref(), Some("debug"));
    /// ```
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }

    fn command() -> Command {
        Command::new("Concierge")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Component host: dependency-ordered startup, readiness and recovery")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("concierge.toml"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("once")
                    .long("once")
                    .help("Exit after startup instead of waiting for Ctrl+C")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("concierge.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            once: matches.get_flag("once"),
        }
    }
}
