//! Rate Limiter Service
//!
//! Main entry point for per-policy rate limiting.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::types::{CounterSource, QuotaKey, RateLimitResult};
use crate::config::RateLimitConfig;
use crate::domain::{PolicyTable, Subject, Tier};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::metrics::GuardMetrics;
use crate::infrastructure::quota_store::{CounterSnapshot, InMemoryQuotaStore, QuotaStore};
use crate::infrastructure::resilience::StoreCircuit;

/// Main rate limiter service
pub struct RateLimiterService {
    policies: PolicyTable,
    /// Shared store
    primary: Arc<dyn QuotaStore>,
    /// Process-local counter used while the circuit is open
    fallback: Arc<InMemoryQuotaStore>,
    circuit: Arc<StoreCircuit>,
    metrics: Arc<GuardMetrics>,
    clock: Arc<dyn Clock>,
    enabled: bool,
}

impl RateLimiterService {
    pub fn new(
        config: &RateLimitConfig,
        primary: Arc<dyn QuotaStore>,
        circuit: Arc<StoreCircuit>,
        metrics: Arc<GuardMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policies = PolicyTable::from_config(config);
        info!(
            policies = policies.len(),
            enabled = config.enabled,
            "Rate limiter initialised"
        );

        Self {
            policies,
            primary,
            fallback: Arc::new(InMemoryQuotaStore::new(clock.clone())),
            circuit,
            metrics,
            clock,
            enabled: config.enabled,
        }
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn circuit(&self) -> &Arc<StoreCircuit> {
        &self.circuit
    }

    /// Count one request against `policy` for `subject` and decide.
    ///
    /// Unknown policies fail closed. Admins are admitted without touching a
    /// counter. Store failures fall back to the in-process counter.
    pub async fn check_and_consume(
        &self,
        policy_name: &str,
        subject: &Subject,
        tier: Tier,
    ) -> RateLimitResult {
        let Some(policy) = self.policies.get(policy_name) else {
            self.metrics.record_config_error();
            error!(
                policy = policy_name,
                tier = %tier,
                "Unknown rate limit policy, denying request"
            );
            return RateLimitResult::unknown_policy(policy_name, tier);
        };

        if !self.enabled {
            return RateLimitResult::bypass(&policy, tier);
        }

        let Some(limit) = policy.effective_limit(tier) else {
            self.metrics.record_admin_bypass();
            debug!(policy = %policy.name, subject = %subject, "Admin tier bypasses rate limit");
            return RateLimitResult::bypass(&policy, tier);
        };

        let key = QuotaKey::new(policy.name.as_str(), subject.clone()).to_store_key();
        let (snapshot, source) = self.consume(&key, policy.window).await;

        let now_ms = self.clock.now_millis();
        let ttl_ms = snapshot.ttl.as_millis() as u64;
        let reset_at = (now_ms + ttl_ms).div_ceil(1000);

        if snapshot.count <= u64::from(limit) {
            self.metrics.record_admitted();
            debug!(
                policy = %policy.name,
                subject = %subject,
                tier = %tier,
                count = snapshot.count,
                limit,
                source = source.as_str(),
                "Request admitted"
            );
            RateLimitResult::allowed(&policy, tier, limit, snapshot.count, reset_at, source)
        } else {
            let retry_after = ttl_ms.div_ceil(1000).max(1);
            self.metrics.record_denied();
            warn!(
                policy = %policy.name,
                subject = %subject,
                tier = %tier,
                count = snapshot.count,
                limit,
                retry_after,
                source = source.as_str(),
                "Rate limit exceeded"
            );
            RateLimitResult::blocked(&policy, tier, limit, reset_at, retry_after, source)
        }
    }

    /// Increment on the primary store, or on the fallback if the primary is
    /// degraded or fails this call
    async fn consume(&self, key: &str, window: Duration) -> (CounterSnapshot, CounterSource) {
        if !self.circuit.is_degraded()
            && let Ok(snapshot) = self
                .circuit
                .call("increment", self.primary.increment(key, window))
                .await
        {
            return (snapshot, CounterSource::Primary);
        }

        (
            self.fallback.incr(key, window).await,
            CounterSource::Fallback,
        )
    }

    /// Ping the primary store and close the circuit if it answers.
    /// Returns true when the primary is serving.
    pub async fn probe_primary(&self) -> bool {
        if !self.circuit.is_degraded() {
            return true;
        }

        match tokio::time::timeout(self.circuit.timeout(), self.primary.ping()).await {
            Ok(Ok(())) => {
                self.circuit.restore();
                true
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Quota store still unavailable");
                false
            }
            Err(_) => {
                debug!("Quota store probe timed out");
                false
            }
        }
    }

    /// Start the cleanup task for in-memory counters
    pub fn start_cleanup_task(self: Arc<Self>, period: Duration, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.fallback.cleanup().await;
                        self.primary.cleanup().await;
                        debug!("Rate limiter cleanup completed");
                    }
                }
            }
        });
    }

    /// Start the background probe that restores the primary store
    pub fn start_recovery_probe(self: Arc<Self>, period: Duration, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.probe_primary().await;
                    }
                }
            }
        });
    }
}
