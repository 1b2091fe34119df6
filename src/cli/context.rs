//! CLI Context - configuration and services for operator commands

use clipper_guard_core::Config;
use clipper_guard_core::application::{AdminService, GuardInitError, RequestGuard};
use clipper_guard_core::config::{ConfigLoadError, StoreBackend};

use crate::cli::Cli;
use crate::cli::output::OutputWriter;

/// Context shared by the operator commands
pub struct CliContext {
    pub config: Config,
    pub output: OutputWriter,
}

impl CliContext {
    /// Load configuration and set up output from parsed CLI arguments
    pub fn new(cli: &Cli) -> Result<Self, ConfigLoadError> {
        let config = load_config(cli)?;

        if cli.verbose {
            // A second init in the same process is harmless
            let _ = clipper_guard_core::init_tracing(&config.logging);
        }

        Ok(Self {
            config,
            output: OutputWriter::new(cli.format),
        })
    }

    /// Connect to the shared store and build the admin surface
    pub async fn admin(&self) -> Result<AdminService, GuardInitError> {
        if self.config.store.backend == StoreBackend::Memory {
            self.output.warn(
                "store.backend is \"memory\": operator commands only see this process's own state",
            );
        }

        let guard = RequestGuard::from_config(&self.config).await?;
        Ok(AdminService::new(guard.detector().clone()))
    }
}

/// `--config` wins over the config/ directory lookup
pub fn load_config(cli: &Cli) -> Result<Config, ConfigLoadError> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

