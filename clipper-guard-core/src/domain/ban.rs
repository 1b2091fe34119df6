//! Ban records and abuse statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Convert unix milliseconds to a UTC timestamp
pub fn millis_to_datetime(millis: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(millis).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// An automatic ban issued by the abuse detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub ip: IpAddr,
    pub banned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Abuse counter value that triggered the ban
    pub request_count: u64,
}

impl BanRecord {
    pub fn new(ip: IpAddr, now_millis: u64, duration: Duration, request_count: u64) -> Self {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            ip,
            banned_at: millis_to_datetime(now_millis),
            expires_at: millis_to_datetime(now_millis.saturating_add(duration_ms)),
            request_count,
        }
    }

    /// Expiry as unix milliseconds
    pub fn expires_at_millis(&self) -> u64 {
        u64::try_from(self.expires_at.timestamp_millis()).unwrap_or(0)
    }

    pub fn is_active_at(&self, now_millis: u64) -> bool {
        self.expires_at_millis() > now_millis
    }

    /// Time left on the ban, zero once expired
    pub fn remaining(&self, now_millis: u64) -> Duration {
        Duration::from_millis(self.expires_at_millis().saturating_sub(now_millis))
    }
}

/// Snapshot of an IP's standing with the abuse detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseStats {
    pub ip: IpAddr,
    /// Requests counted in the current detection window
    pub count: u64,
    /// When the current detection window ends, if one is open
    pub window_expires_at: Option<DateTime<Utc>>,
    pub threshold: u64,
    pub ban: Option<BanRecord>,
}

impl AbuseStats {
    pub fn is_banned(&self) -> bool {
        self.ban.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_expiry() {
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let start = 1_700_000_000_000;
        let ban = BanRecord::new(ip, start, Duration::from_secs(86_400), 1001);

        assert!(ban.is_active_at(start));
        assert!(ban.is_active_at(start + 86_399_999));
        assert!(!ban.is_active_at(start + 86_400_000));
        assert_eq!(ban.remaining(start + 86_000_000), Duration::from_millis(400_000));
        assert_eq!(ban.remaining(start + 90_000_000), Duration::ZERO);
    }

    #[test]
    fn test_ban_serializes_as_json() {
        let ip: IpAddr = "::ffff:10.1.2.3".parse().unwrap();
        let ban = BanRecord::new(ip, 1_000, Duration::from_secs(60), 7);
        let json = serde_json::to_string(&ban).unwrap();
        let back: BanRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ban);
    }
}
