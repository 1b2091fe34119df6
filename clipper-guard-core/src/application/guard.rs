//! Request guard pipeline
//!
//! Whitelist short-circuit, ban gate, abuse tracking, then the per-policy
//! rate limit. The HTTP layer calls the steps individually so exempt routes
//! can skip abuse tracking by construction. `evaluate` runs all of them.

use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, StoreConfig};
use crate::domain::{BanRecord, Subject, Tier};
use crate::infrastructure::abuse::AbuseDetector;
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::metrics::GuardMetrics;
use crate::infrastructure::quota_store::{self, GuardStore, StoreError};
use crate::infrastructure::rate_limiter::{RateLimitResult, RateLimiterService};
use crate::infrastructure::resilience::{CircuitState, StoreCircuit};
use crate::infrastructure::whitelist::{InvalidEntry, Whitelist};

/// Error type for building the guard
#[derive(Debug, thiserror::Error)]
pub enum GuardInitError {
    #[error("Failed to open quota store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Whitelist(#[from] InvalidEntry),
}

/// One request as seen by the guard
#[derive(Debug, Clone)]
pub struct GuardRequest {
    pub ip: IpAddr,
    pub user_id: Option<String>,
    pub tier: Tier,
    pub policy: String,
    /// False for routes exempt from abuse detection
    pub track_abuse: bool,
}

impl GuardRequest {
    pub fn subject(&self) -> Subject {
        Subject::resolve(self.user_id.as_deref(), self.ip)
    }
}

/// Outcome of the full pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    /// Exempt by whitelist, nothing was counted
    Whitelisted,
    /// Rejected by an active ban, nothing was counted against the policy
    Banned(BanRecord),
    /// Rate limiter verdict
    Checked(RateLimitResult),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        match self {
            GuardDecision::Whitelisted => true,
            GuardDecision::Banned(_) => false,
            GuardDecision::Checked(result) => result.allowed,
        }
    }
}

/// Entry point shared by the HTTP middleware, the decision endpoint and the CLI
pub struct RequestGuard {
    limiter: Arc<RateLimiterService>,
    detector: Arc<AbuseDetector>,
    whitelist: Whitelist,
    circuit: Arc<StoreCircuit>,
    metrics: Arc<GuardMetrics>,
}

impl RequestGuard {
    /// Build the guard from configuration and check the primary store.
    /// An unreachable store is not fatal: the guard starts in fallback mode.
    pub async fn from_config(config: &Config) -> Result<Self, GuardInitError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = quota_store::open(&config.store, clock.clone())?;
        let guard = Self::with_store(config, store.clone(), clock)?;

        match tokio::time::timeout(config.store.timeout(), store.ping()).await {
            Ok(Ok(())) => {
                info!(backend = ?config.store.backend, "Connected to quota store");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Quota store unreachable at startup");
                guard.circuit.trip("startup");
            }
            Err(_) => {
                warn!("Quota store did not answer at startup");
                guard.circuit.trip("startup");
            }
        }

        Ok(guard)
    }

    /// Build the guard around an existing store (tests, custom backends)
    pub fn with_store(
        config: &Config,
        store: Arc<dyn GuardStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GuardInitError> {
        let metrics = Arc::new(GuardMetrics::new());
        let circuit = Arc::new(StoreCircuit::new(config.store.timeout(), metrics.clone()));
        let whitelist = Whitelist::from_config(&config.whitelist)?;

        let limiter = Arc::new(RateLimiterService::new(
            &config.rate_limit,
            store.clone(),
            circuit.clone(),
            metrics.clone(),
            clock.clone(),
        ));
        let detector = Arc::new(AbuseDetector::new(
            config.abuse.clone(),
            store,
            circuit.clone(),
            metrics.clone(),
            clock,
        ));

        Ok(Self {
            limiter,
            detector,
            whitelist,
            circuit,
            metrics,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiterService> {
        &self.limiter
    }

    pub fn detector(&self) -> &Arc<AbuseDetector> {
        &self.detector
    }

    pub fn metrics(&self) -> &Arc<GuardMetrics> {
        &self.metrics
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }

    /// Whitelist check. Counts a bypass when it matches.
    pub fn bypass(&self, ip: IpAddr) -> bool {
        let whitelisted = self.whitelist.contains(ip);
        if whitelisted {
            self.metrics.record_whitelist_bypass();
            debug!(ip = %ip, "Whitelisted IP bypasses guard");
        }
        whitelisted
    }

    /// Ban gate
    pub async fn gate(&self, ip: IpAddr) -> Option<BanRecord> {
        let ban = self.detector.is_banned(ip).await?;
        self.metrics.record_banned_rejection();
        warn!(ip = %ip, expires_at = %ban.expires_at, "Rejected request from banned IP");
        Some(ban)
    }

    /// Abuse tracking. Returns the new ban when this request crossed the
    /// threshold; the triggering request is rejected with it.
    pub async fn track(&self, ip: IpAddr) -> Option<BanRecord> {
        let ban = self.detector.record_and_evaluate(ip).await?;
        self.metrics.record_banned_rejection();
        Some(ban)
    }

    /// Per-policy limit
    pub async fn admit(&self, policy: &str, subject: &Subject, tier: Tier) -> RateLimitResult {
        self.limiter.check_and_consume(policy, subject, tier).await
    }

    /// Run the whole pipeline for one request
    pub async fn evaluate(&self, request: &GuardRequest) -> GuardDecision {
        if self.bypass(request.ip) {
            return GuardDecision::Whitelisted;
        }

        if let Some(ban) = self.gate(request.ip).await {
            return GuardDecision::Banned(ban);
        }

        if request.track_abuse
            && let Some(ban) = self.track(request.ip).await
        {
            return GuardDecision::Banned(ban);
        }

        GuardDecision::Checked(
            self.admit(&request.policy, &request.subject(), request.tier)
                .await,
        )
    }

    /// Spawn the in-memory cleanup loop and the recovery probe
    pub fn spawn_background_tasks(&self, config: &StoreConfig, shutdown: CancellationToken) {
        self.limiter
            .clone()
            .start_cleanup_task(config.cleanup_interval(), shutdown.clone());
        self.limiter
            .clone()
            .start_recovery_probe(config.probe_interval(), shutdown);
    }
}
