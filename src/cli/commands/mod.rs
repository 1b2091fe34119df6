//! Operator subcommands

pub mod bans;
pub mod check_config;
pub mod stats;

use clipper_guard_core::application::AdminError;

use crate::cli::exit_codes;
use crate::cli::output::OutputWriter;

/// Report an admin failure and pick the exit code
pub(crate) fn report_admin_error(output: &OutputWriter, error: &AdminError) -> i32 {
    output.error(error);
    match error {
        AdminError::InvalidIp(_) => exit_codes::CONFIG_ERROR,
        AdminError::Store(_) => exit_codes::STORE_ERROR,
    }
}
