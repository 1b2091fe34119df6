//! Rate limit policies and subscription tiers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RateLimitConfig, TierMultipliers};

/// Subscription tier of the caller
/// Determines which multiplier applies to a policy's base limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Operators - never rate limited
    Admin,
    /// Paying users - highest limits
    Premium,
    /// Signed-in free users
    Basic,
    /// Anonymous traffic, keyed by IP
    Unauthenticated,
}

impl Tier {
    /// Get the tier name for logging and headers
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Admin => "admin",
            Tier::Premium => "premium",
            Tier::Basic => "basic",
            Tier::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Tier::Admin),
            "premium" => Ok(Tier::Premium),
            "basic" | "free" => Ok(Tier::Basic),
            "unauthenticated" | "anonymous" => Ok(Tier::Unauthenticated),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// Who a quota is charged to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Authenticated user id
    User(String),
    /// Client address, for anonymous traffic
    Ip(IpAddr),
}

impl Subject {
    /// Authenticated callers are keyed by user id, everyone else by address
    pub fn resolve(user_id: Option<&str>, ip: IpAddr) -> Self {
        match user_id {
            Some(id) if !id.is_empty() => Subject::User(id.to_string()),
            _ => Subject::Ip(ip),
        }
    }

    /// Key fragment used inside quota keys, e.g. `user:42` or `ip:10.0.0.1`
    pub fn key_fragment(&self) -> String {
        match self {
            Subject::User(id) => format!("user:{}", id),
            Subject::Ip(ip) => format!("ip:{}", ip),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key_fragment())
    }
}

/// A named quota: `base_limit` requests per `window`, scaled by tier
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub name: String,
    pub base_limit: u32,
    pub window: Duration,
    pub multipliers: TierMultipliers,
}

impl Policy {
    pub fn new(
        name: impl Into<String>,
        base_limit: u32,
        window: Duration,
        multipliers: TierMultipliers,
    ) -> Self {
        Self {
            name: name.into(),
            base_limit,
            window,
            multipliers,
        }
    }

    /// Multiplier for a tier. Admin has none: it bypasses limiting.
    pub fn multiplier(&self, tier: Tier) -> Option<f64> {
        match tier {
            Tier::Admin => None,
            Tier::Premium => Some(self.multipliers.premium),
            Tier::Basic => Some(self.multipliers.basic),
            Tier::Unauthenticated => Some(self.multipliers.unauthenticated),
        }
    }

    /// `max(1, floor(base_limit * multiplier))`, or `None` for unlimited tiers
    pub fn effective_limit(&self, tier: Tier) -> Option<u32> {
        let multiplier = self.multiplier(tier)?;
        let scaled = (f64::from(self.base_limit) * multiplier).floor();
        let limit = if scaled.is_nan() || scaled < 1.0 {
            1
        } else if scaled >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            scaled as u32
        };
        Some(limit)
    }

    /// Window length in whole seconds, never below one
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

/// Immutable policy lookup built once from configuration
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: BTreeMap<String, Arc<Policy>>,
}

impl PolicyTable {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let policies = config
            .policies
            .iter()
            .map(|(name, policy)| {
                let multipliers = policy.multipliers.unwrap_or(config.multipliers);
                let resolved = Policy::new(
                    name.clone(),
                    policy.limit,
                    Duration::from_secs(policy.window_seconds),
                    multipliers,
                );
                (name.clone(), Arc::new(resolved))
            })
            .collect();

        Self { policies }
    }

    pub fn from_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self {
            policies: policies
                .into_iter()
                .map(|p| (p.name.clone(), Arc::new(p)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
