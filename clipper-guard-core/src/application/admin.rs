//! Admin control surface: unban, list bans, inspect abuse stats

use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

use crate::domain::{AbuseStats, BanRecord};
use crate::infrastructure::abuse::AbuseDetector;
use crate::infrastructure::quota_store::StoreError;

/// Admin operation error. Never swallowed: surfaced to the operator.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of an unban
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbanOutcome {
    pub ip: IpAddr,
    /// Whether an active ban was removed. False is still success.
    pub was_banned: bool,
}

pub struct AdminService {
    detector: Arc<AbuseDetector>,
}

impl AdminService {
    pub fn new(detector: Arc<AbuseDetector>) -> Self {
        Self { detector }
    }

    /// Delete the ban and reset the abuse counter. Idempotent.
    pub async fn unban_ip(&self, ip: &str) -> Result<UnbanOutcome, AdminError> {
        let ip = parse_ip(ip)?;
        let was_banned = self.detector.unban(ip).await?;
        info!(ip = %ip, was_banned, "Admin unbanned IP");
        Ok(UnbanOutcome { ip, was_banned })
    }

    /// All active bans, oldest first
    pub async fn list_banned_ips(&self) -> Result<Vec<BanRecord>, AdminError> {
        Ok(self.detector.list_bans().await?)
    }

    pub async fn get_abuse_stats(&self, ip: &str) -> Result<AbuseStats, AdminError> {
        let ip = parse_ip(ip)?;
        Ok(self.detector.stats(ip).await?)
    }
}

/// IPv4-mapped IPv6 input is folded to IPv4, matching how requests are keyed
fn parse_ip(raw: &str) -> Result<IpAddr, AdminError> {
    raw.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| AdminError::InvalidIp(raw.to_string()))
}
