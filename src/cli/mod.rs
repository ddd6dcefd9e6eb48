//! Command-line interface for `soldeploy`.
//!
//! # Available Commands
//!
//! - `deploy` - Deploy a Solution item into the configured portal
//! - `plan` - Show the order in which a Solution's items would be created
//! - `templatize` - Convert an item's JSON into a reusable template
//!
//! # Examples
//!
//! ```bash
//! # Deploy into the portal named in ~/.soldeploy/config.toml
//! soldeploy deploy 6f2a0c1e --title "Water Utility" --param region=north
//!
//! # Work against a local portal snapshot instead of a live portal
//! soldeploy --no-progress deploy 6f2a0c1e --portal-file ./portal.json
//!
//! # Inspect creation waves
//! soldeploy plan 6f2a0c1e --portal-file ./portal.json
//! ```
//!
//! # Global Options
//!
//! | Flag | Effect |
//! |------|--------|
//! | `-v, --verbose` | debug logging |
//! | `-q, --quiet` | no logging, errors only |
//! | `-c, --config <PATH>` | alternative config file |
//! | `--no-progress` | no progress bars |

mod deploy;
mod plan;
mod session;
mod templatize;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::DeployerConfig;

pub use session::PortalSession;

/// Target used when `RUST_LOG` is not set.
const LOG_TARGET: &str = "solution_deployer";

/// Runtime settings derived from the global flags.
///
/// Commands receive this instead of reading process-wide environment, so tests can
/// drive them directly.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level for the crate's own events. `None` disables logging.
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the deployer configuration this run points at.
    pub async fn load_deployer_config(&self) -> Result<DeployerConfig> {
        DeployerConfig::load_with_optional(self.config_path.clone()).await
    }

    /// Install the global tracing subscriber. `RUST_LOG` wins over the flags.
    ///
    /// Logs go to stderr so command output on stdout stays parseable.
    pub fn init_logging(&self) {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => match &self.log_level {
                Some(level) => EnvFilter::new(format!("{LOG_TARGET}={level}")),
                None => return,
            },
        };

        // A subscriber may already be installed when running under a test harness.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Deploy templated portal Solutions.
#[derive(Parser)]
#[command(
    name = "soldeploy",
    about = "Deploy portal Solutions into an organization",
    version,
    long_about = "soldeploy instantiates a Solution (a graph of templated portal items) \
                  into a target organization, creating every item in dependency order."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all logging; errors are still printed.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file (default `~/.soldeploy/config.toml`).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable progress bars.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a Solution item into the target portal.
    Deploy(deploy::DeployCommand),

    /// Show the creation order of a Solution's items without creating anything.
    Plan(plan::PlanCommand),

    /// Convert an item JSON file into a template.
    Templatize(templatize::TemplatizeCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Deploy(cmd) => cmd.execute(&config).await,
            Commands::Plan(cmd) => cmd.execute(&config).await,
            Commands::Templatize(cmd) => cmd.execute(&config).await,
        }
    }
}
