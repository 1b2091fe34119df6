//! Bans Command - list and remove IP bans

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;

use clipper_guard_core::domain::BanRecord;

use crate::cli::commands::report_admin_error;
use crate::cli::context::CliContext;
use crate::cli::exit_codes;

/// Arguments for the bans command
#[derive(Args, Debug)]
pub struct BansArgs {
    #[command(subcommand)]
    pub command: BansCommand,
}

#[derive(Subcommand, Debug)]
pub enum BansCommand {
    /// List active bans, oldest first
    List,
    /// Remove the ban for an IP and reset its abuse counter
    Remove {
        /// IPv4 or IPv6 address
        ip: String,
    },
}

#[derive(Debug, Serialize)]
struct UnbanOutput {
    ip: String,
    was_banned: bool,
}

/// Run the bans command
pub async fn run(ctx: &CliContext, args: &BansArgs) -> Result<i32> {
    let admin = match ctx.admin().await {
        Ok(admin) => admin,
        Err(e) => {
            ctx.output.error(&e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    match &args.command {
        BansCommand::List => match admin.list_banned_ips().await {
            Ok(bans) => {
                print_bans(ctx, &bans)?;
                Ok(exit_codes::SUCCESS)
            }
            Err(e) => Ok(report_admin_error(&ctx.output, &e)),
        },
        BansCommand::Remove { ip } => match admin.unban_ip(ip).await {
            Ok(outcome) => {
                if ctx.output.is_json() {
                    ctx.output.json(&UnbanOutput {
                        ip: outcome.ip.to_string(),
                        was_banned: outcome.was_banned,
                    })?;
                } else if outcome.was_banned {
                    ctx.output.line(format!("Unbanned {}", outcome.ip));
                } else {
                    ctx.output
                        .line(format!("{} was not banned; abuse counter reset", outcome.ip));
                }
                Ok(exit_codes::SUCCESS)
            }
            Err(e) => Ok(report_admin_error(&ctx.output, &e)),
        },
    }
}

fn print_bans(ctx: &CliContext, bans: &[BanRecord]) -> Result<()> {
    if ctx.output.is_json() {
        return ctx.output.json(&bans);
    }

    if bans.is_empty() {
        ctx.output.line("No active bans");
        return Ok(());
    }

    let now = Utc::now();
    let rows: Vec<Vec<String>> = bans
        .iter()
        .map(|ban| {
            let remaining = (ban.expires_at - now).num_minutes().max(0);
            vec![
                ban.ip.to_string(),
                ban.banned_at.to_rfc3339(),
                ban.expires_at.to_rfc3339(),
                format!("{}h{:02}m", remaining / 60, remaining % 60),
                ban.request_count.to_string(),
            ]
        })
        .collect();

    ctx.output.table(
        &["IP", "BANNED AT", "EXPIRES AT", "REMAINING", "REQUESTS"],
        &rows,
    );
    Ok(())
}
