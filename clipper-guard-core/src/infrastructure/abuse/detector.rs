//! Per-IP volume tracking and automatic bans

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AbuseConfig;
use crate::domain::{AbuseStats, BanRecord, millis_to_datetime};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::metrics::GuardMetrics;
use crate::infrastructure::quota_store::{GuardStore, StoreError, abuse_key};
use crate::infrastructure::resilience::StoreCircuit;

/// Tracks aggregate request volume per IP and bans IPs over the threshold.
///
/// Bans live only in the shared store. While the circuit is open the detector
/// neither tracks nor blocks: legitimate traffic keeps flowing and per-policy
/// limits still apply through the fallback counter.
pub struct AbuseDetector {
    store: Arc<dyn GuardStore>,
    circuit: Arc<StoreCircuit>,
    metrics: Arc<GuardMetrics>,
    clock: Arc<dyn Clock>,
    config: AbuseConfig,
}

impl AbuseDetector {
    pub fn new(
        config: AbuseConfig,
        store: Arc<dyn GuardStore>,
        circuit: Arc<StoreCircuit>,
        metrics: Arc<GuardMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            circuit,
            metrics,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AbuseConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Active ban for `ip`, if any.
    ///
    /// A store failure reads as "not banned".
    pub async fn is_banned(&self, ip: IpAddr) -> Option<BanRecord> {
        if self.circuit.is_degraded() {
            return None;
        }

        match self.circuit.call("get_ban", self.store.get_ban(ip)).await {
            Ok(Some(ban)) if ban.is_active_at(self.clock.now_millis()) => Some(ban),
            Ok(_) => None,
            Err(_) => None,
        }
    }

    /// Count one request from `ip` and ban it once the count passes the
    /// threshold. Returns the ban when the IP is banned after this request.
    pub async fn record_and_evaluate(&self, ip: IpAddr) -> Option<BanRecord> {
        if !self.config.enabled || self.circuit.is_degraded() {
            return None;
        }

        let key = abuse_key(ip);
        let snapshot = self
            .circuit
            .call("abuse_increment", self.store.increment(&key, self.config.window()))
            .await
            .ok()?;

        if snapshot.count <= self.config.threshold {
            return None;
        }

        let ban_duration = self.config.ban_duration();
        let record = BanRecord::new(ip, self.clock.now_millis(), ban_duration, snapshot.count);

        match self
            .circuit
            .call("insert_ban", self.store.insert_ban(&record, ban_duration))
            .await
        {
            Ok(true) => {
                self.metrics.record_ban_created();
                warn!(
                    ip = %ip,
                    count = snapshot.count,
                    threshold = self.config.threshold,
                    expires_at = %record.expires_at,
                    "IP banned for abuse"
                );
                Some(record)
            }
            Ok(false) => {
                debug!(ip = %ip, "IP already banned");
                match self.circuit.call("get_ban", self.store.get_ban(ip)).await {
                    Ok(Some(existing)) => Some(existing),
                    _ => Some(record),
                }
            }
            // Losing the ban write must not block the request
            Err(_) => None,
        }
    }

    /// Remove the ban for `ip` and reset its abuse counter.
    /// Returns whether a ban existed.
    pub async fn unban(&self, ip: IpAddr) -> Result<bool, StoreError> {
        let removed = self
            .circuit
            .call("remove_ban", self.store.remove_ban(ip))
            .await?;
        self.circuit
            .call("abuse_reset", self.store.delete(&abuse_key(ip)))
            .await?;

        info!(ip = %ip, existed = removed, "IP unbanned");
        Ok(removed)
    }

    /// All active bans
    pub async fn list_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        let now = self.clock.now_millis();
        let bans = self
            .circuit
            .call("list_bans", self.store.list_bans())
            .await?;
        Ok(bans.into_iter().filter(|ban| ban.is_active_at(now)).collect())
    }

    /// Current counter, window expiry and ban for `ip`
    pub async fn stats(&self, ip: IpAddr) -> Result<AbuseStats, StoreError> {
        let now = self.clock.now_millis();
        let counter = self
            .circuit
            .call("abuse_get", self.store.get(&abuse_key(ip)))
            .await?;
        let ban = self
            .circuit
            .call("get_ban", self.store.get_ban(ip))
            .await?
            .filter(|ban| ban.is_active_at(now));

        Ok(AbuseStats {
            ip,
            count: counter.map(|c| c.count).unwrap_or(0),
            window_expires_at: counter
                .map(|c| millis_to_datetime(now + c.ttl.as_millis() as u64)),
            threshold: self.config.threshold,
            ban,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::quota_store::InMemoryQuotaStore;
    use std::time::Duration;

    const START: u64 = 1_700_000_000_000;

    fn detector(threshold: u64) -> (AbuseDetector, Arc<GuardMetrics>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let metrics = Arc::new(GuardMetrics::new());
        let circuit = Arc::new(StoreCircuit::new(Duration::from_millis(100), metrics.clone()));
        let store = Arc::new(InMemoryQuotaStore::new(clock.clone()));
        let config = AbuseConfig {
            threshold,
            ..AbuseConfig::default()
        };
        (
            AbuseDetector::new(config, store, circuit, metrics.clone(), clock.clone()),
            metrics,
            clock,
        )
    }

    fn ip() -> IpAddr {
        "198.51.100.77".parse().unwrap()
    }

    #[tokio::test]
    async fn test_ban_exactly_after_threshold() {
        let (detector, metrics, _) = detector(5);

        for _ in 0..5 {
            assert!(detector.record_and_evaluate(ip()).await.is_none());
        }
        assert!(detector.is_banned(ip()).await.is_none());

        let issued = detector.record_and_evaluate(ip()).await.unwrap();
        assert_eq!(issued.request_count, 6);
        assert_eq!(
            issued.expires_at,
            millis_to_datetime(START + 86_400_000)
        );
        let ban = detector.is_banned(ip()).await.unwrap();
        assert_eq!(ban, issued);
        assert_eq!(metrics.snapshot().bans_created, 1);
    }

    #[tokio::test]
    async fn test_further_traffic_does_not_extend_ban() {
        let (detector, metrics, clock) = detector(1);
        detector.record_and_evaluate(ip()).await;
        detector.record_and_evaluate(ip()).await;
        let original = detector.is_banned(ip()).await.unwrap();

        clock.advance(Duration::from_secs(600));
        let repeated = detector.record_and_evaluate(ip()).await.unwrap();
        assert_eq!(repeated.expires_at, original.expires_at);
        let current = detector.is_banned(ip()).await.unwrap();

        assert_eq!(current.expires_at, original.expires_at);
        assert_eq!(metrics.snapshot().bans_created, 1);
    }

    #[tokio::test]
    async fn test_disabled_detector_never_bans() {
        let (mut detector, _, _) = detector(1);
        detector.config.enabled = false;
        for _ in 0..10 {
            assert!(detector.record_and_evaluate(ip()).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_stats_and_unban() {
        let (detector, _, _) = detector(2);
        for _ in 0..3 {
            detector.record_and_evaluate(ip()).await;
        }

        let stats = detector.stats(ip()).await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.threshold, 2);
        assert!(stats.is_banned());
        assert_eq!(
            stats.window_expires_at,
            Some(millis_to_datetime(START + 3_600_000))
        );

        assert!(detector.unban(ip()).await.unwrap());
        assert!(!detector.unban(ip()).await.unwrap());

        let stats = detector.stats(ip()).await.unwrap();
        assert_eq!(stats.count, 0);
        assert!(stats.window_expires_at.is_none());
        assert!(!stats.is_banned());
    }
}
