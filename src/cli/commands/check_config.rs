//! Check Config Command - validate configuration and show effective limits

use anyhow::Result;
use serde::Serialize;

use clipper_guard_core::domain::{PolicyTable, Tier};

use crate::cli::context::CliContext;
use crate::cli::exit_codes;

#[derive(Debug, Serialize)]
struct PolicySummary {
    name: String,
    window_seconds: u64,
    unauthenticated: u32,
    basic: u32,
    premium: u32,
}

const LIMITED_TIERS: [Tier; 3] = [Tier::Unauthenticated, Tier::Basic, Tier::Premium];

/// Run the check-config command. Loading already validated the configuration.
pub fn run(ctx: &CliContext) -> Result<i32> {
    let policies = PolicyTable::from_config(&ctx.config.rate_limit);

    let summaries: Vec<PolicySummary> = policies
        .names()
        .filter_map(|name| policies.get(name))
        .map(|policy| {
            let [unauthenticated, basic, premium] =
                LIMITED_TIERS.map(|tier| policy.effective_limit(tier).unwrap_or(u32::MAX));
            PolicySummary {
                name: policy.name.clone(),
                window_seconds: policy.window_secs(),
                unauthenticated,
                basic,
                premium,
            }
        })
        .collect();

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "valid": true,
            "store": ctx.config.store.backend,
            "abuse": ctx.config.abuse,
            "whitelist": ctx.config.whitelist.ips,
            "admin_api": ctx.config.admin.api_token.is_some(),
            "policies": summaries,
        }))?;
        return Ok(exit_codes::SUCCESS);
    }

    ctx.output.line("Configuration is valid");
    ctx.output.line(format!(
        "Store: {:?}  Abuse: threshold {} per {}s, ban {}s{}",
        ctx.config.store.backend,
        ctx.config.abuse.threshold,
        ctx.config.abuse.window_seconds,
        ctx.config.abuse.ban_duration_seconds,
        if ctx.config.abuse.enabled { "" } else { " (disabled)" },
    ));
    if ctx.config.admin.api_token.is_none() {
        ctx.output
            .warn("admin.api_token is not set, admin routes will be disabled");
    }

    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                format!("{}s", s.window_seconds),
                s.unauthenticated.to_string(),
                s.basic.to_string(),
                s.premium.to_string(),
            ]
        })
        .collect();
    ctx.output.table(
        &["POLICY", "WINDOW", "UNAUTHENTICATED", "BASIC", "PREMIUM"],
        &rows,
    );

    Ok(exit_codes::SUCCESS)
}
