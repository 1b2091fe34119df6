//! Clipper Guard CLI
//!
//! `serve` runs the HTTP service. The other subcommands drive the admin
//! control surface directly against the shared store, for operators without
//! access to the admin API.

pub mod commands;
pub mod context;
pub mod output;

pub use context::CliContext;
pub use output::OutputFormat;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clipper Guard - rate limiting and abuse detection
#[derive(Parser, Debug)]
#[command(
    name = "clipper-guard",
    version,
    about = "Rate limiting and abuse detection for the Clipper platform",
    long_about = "Runs the Clipper Guard HTTP service, or manages IP bans and inspects \
                  abuse counters in the shared store.\n\n\
                  Configuration is read from config/default.toml, config/$ENV.toml, \
                  config/local.toml and CLIPPER_GUARD__* environment variables."
)]
pub struct Cli {
    /// Configuration file path (replaces the config/ directory lookup)
    #[arg(long, global = true, env = "CLIPPER_GUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for operator commands
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Emit log output for operator commands
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service
    Serve,

    /// Manage IP bans
    Bans(commands::bans::BansArgs),

    /// Show abuse statistics for one IP
    Stats(commands::stats::StatsArgs),

    /// Load and validate the configuration, then print the policy table
    #[command(name = "check-config")]
    CheckConfig,
}

/// CLI application runner for the operator subcommands
pub struct CliApp {
    cli: Cli,
}

impl CliApp {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the selected subcommand and return the process exit code
    pub async fn run(self) -> anyhow::Result<i32> {
        let ctx = match CliContext::new(&self.cli) {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("Error: {e}");
                return Ok(exit_codes::CONFIG_ERROR);
            }
        };

        match &self.cli.command {
            None | Some(Commands::Serve) => {
                anyhow::bail!("serve is handled by the server entry point")
            }
            Some(Commands::Bans(args)) => commands::bans::run(&ctx, args).await,
            Some(Commands::Stats(args)) => commands::stats::run(&ctx, args).await,
            Some(Commands::CheckConfig) => commands::check_config::run(&ctx),
        }
    }
}

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Invalid configuration or arguments
    pub const CONFIG_ERROR: i32 = 2;
    /// The shared store could not be reached
    pub const STORE_ERROR: i32 = 3;
}
