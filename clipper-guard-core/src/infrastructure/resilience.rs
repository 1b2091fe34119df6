//! Primary/fallback circuit for the shared quota store

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use super::metrics::GuardMetrics;
use super::quota_store::StoreError;

/// Which counter source currently answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Shared store is healthy, all calls go to it
    Primary,
    /// Shared store failed, calls are served by the in-process fallback
    Fallback,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Primary => "primary",
            CircuitState::Fallback => "fallback",
        }
    }
}

/// Two-state circuit shared by the rate limiter and the abuse detector.
///
/// ```text
///    ┌───────────┐  store error / timeout   ┌────────────┐
///    │  PRIMARY  │ ───────────────────────► │  FALLBACK  │
///    └───────────┘                          └────────────┘
///          ▲        recovery probe succeeds       │
///          └──────────────────────────────────────┘
/// ```
///
/// Every store round-trip goes through [`StoreCircuit::call`], which bounds it
/// by the configured timeout. A failed call is never retried inline: it trips
/// the circuit and the caller falls back. Only the background probe moves the
/// circuit back to `Primary`, so a flapping store cannot make every request
/// pay a timeout.
#[derive(Debug)]
pub struct StoreCircuit {
    degraded: AtomicBool,
    timeout: Duration,
    metrics: Arc<GuardMetrics>,
}

impl StoreCircuit {
    pub fn new(timeout: Duration, metrics: Arc<GuardMetrics>) -> Self {
        Self {
            degraded: AtomicBool::new(false),
            timeout,
            metrics,
        }
    }

    pub fn state(&self) -> CircuitState {
        if self.is_degraded() {
            CircuitState::Fallback
        } else {
            CircuitState::Primary
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one store operation with the timeout applied.
    /// Any failure is counted and trips the circuit.
    pub async fn call<T, F>(&self, operation: &'static str, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }),
        };

        if let Err(error) = &result {
            self.metrics.record_store_error();
            warn!(operation, error = %error, "Quota store call failed");
            self.trip(operation);
        }

        result
    }

    /// Switch to the fallback. Returns true only on the transition.
    pub fn trip(&self, reason: &str) -> bool {
        let transitioned = self
            .degraded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if transitioned {
            self.metrics.record_fallback_activation();
            warn!(
                reason,
                "Quota store unavailable, switching to in-memory fallback counter"
            );
        }

        transitioned
    }

    /// Switch back to the primary store. Returns true only on the transition.
    pub fn restore(&self) -> bool {
        let transitioned = self
            .degraded
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if transitioned {
            self.metrics.record_fallback_recovery();
            info!("Quota store reachable again, leaving fallback mode");
        }

        transitioned
    }
}
