//! Stats Command - abuse counter and ban for one IP

use anyhow::Result;
use clap::Args;

use crate::cli::commands::report_admin_error;
use crate::cli::context::CliContext;
use crate::cli::exit_codes;

/// Arguments for the stats command
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// IPv4 or IPv6 address
    pub ip: String,
}

/// Run the stats command
pub async fn run(ctx: &CliContext, args: &StatsArgs) -> Result<i32> {
    let admin = match ctx.admin().await {
        Ok(admin) => admin,
        Err(e) => {
            ctx.output.error(&e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let stats = match admin.get_abuse_stats(&args.ip).await {
        Ok(stats) => stats,
        Err(e) => return Ok(report_admin_error(&ctx.output, &e)),
    };

    if ctx.output.is_json() {
        ctx.output.json(&stats)?;
        return Ok(exit_codes::SUCCESS);
    }

    ctx.output.line(format!("IP:        {}", stats.ip));
    ctx.output
        .line(format!("Requests:  {} / {}", stats.count, stats.threshold));
    match stats.window_expires_at {
        Some(at) => ctx.output.line(format!("Window:    resets {}", at.to_rfc3339())),
        None => ctx.output.line("Window:    none open"),
    }
    match &stats.ban {
        Some(ban) => ctx.output.line(format!(
            "Banned:    yes, until {} ({} requests)",
            ban.expires_at.to_rfc3339(),
            ban.request_count
        )),
        None => ctx.output.line("Banned:    no"),
    }

    Ok(exit_codes::SUCCESS)
}
