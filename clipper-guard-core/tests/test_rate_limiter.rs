//! Rate limiter behaviour against a shared store

mod common;

use std::time::Duration;

use clipper_guard_core::config::RateLimitConfig;
use clipper_guard_core::domain::{PolicyTable, Subject, Tier};
use clipper_guard_core::infrastructure::CircuitState;
use clipper_guard_core::infrastructure::rate_limiter::{CounterSource, UsageWarning};
use common::{Harness, config_with_policy, harness};
use futures::future::join_all;

fn user(id: &str) -> Subject {
    Subject::User(id.to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_admit_exactly_the_limit() {
    let Harness { guard, .. } = harness(&config_with_policy("burst", 10, 60));
    let limiter = guard.limiter().clone();

    let handles = (0..60).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter
                .check_and_consume("burst", &user("racer"), Tier::Basic)
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.allowed).count(), 10);
    assert_eq!(results.iter().filter(|r| !r.allowed).count(), 50);
    assert_eq!(guard.metrics().snapshot().admitted, 10);
}

#[tokio::test]
async fn test_premium_submission_scenario() {
    let Harness { guard, .. } = harness(&config_with_policy("unused", 1, 1));
    let subject = user("creator");

    for n in 1..=50 {
        let result = guard.admit("submission", &subject, Tier::Premium).await;
        assert!(result.allowed, "request {n} should be admitted");
        assert_eq!(result.limit, 50);
    }

    let denied = guard.admit("submission", &subject, Tier::Premium).await;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    let retry_after = denied.retry_after.unwrap();
    assert!((1..=3600).contains(&retry_after));
}

#[tokio::test]
async fn test_subjects_and_policies_are_isolated() {
    let Harness { guard, .. } = harness(&config_with_policy("tiny", 1, 60));

    assert!(guard.admit("tiny", &user("a"), Tier::Basic).await.allowed);
    assert!(!guard.admit("tiny", &user("a"), Tier::Basic).await.allowed);
    assert!(guard.admit("tiny", &user("b"), Tier::Basic).await.allowed);
    assert!(guard.admit("feed", &user("a"), Tier::Basic).await.allowed);
}

#[tokio::test]
async fn test_tier_monotonicity_across_default_policies() {
    let table = PolicyTable::from_config(&RateLimitConfig::default());
    for name in table.names() {
        let policy = table.get(name).unwrap();
        let premium = policy.effective_limit(Tier::Premium).unwrap();
        let basic = policy.effective_limit(Tier::Basic).unwrap();
        assert!(premium >= basic, "{name}: premium {premium} < basic {basic}");
        assert!(policy.effective_limit(Tier::Admin).is_none());
    }

    let Harness { guard, .. } = harness(&config_with_policy("tiny", 1, 60));
    for _ in 0..500 {
        let result = guard.admit("tiny", &user("ops"), Tier::Admin).await;
        assert!(result.allowed);
        assert_eq!(result.source, CounterSource::Bypass);
    }
}

#[tokio::test]
async fn test_window_expiry_restores_quota() {
    let Harness { guard, clock, .. } = harness(&config_with_policy("tiny", 2, 60));
    let subject = user("walker");

    guard.admit("tiny", &subject, Tier::Basic).await;
    guard.admit("tiny", &subject, Tier::Basic).await;
    assert!(!guard.admit("tiny", &subject, Tier::Basic).await.allowed);

    clock.advance(Duration::from_secs(60));
    let fresh = guard.admit("tiny", &subject, Tier::Basic).await;
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 1);
}

#[tokio::test]
async fn test_warning_escalates_near_limit() {
    let Harness { guard, .. } = harness(&config_with_policy("twenty", 20, 60));
    let subject = user("heavy");

    let mut last = None;
    for _ in 0..16 {
        last = Some(guard.admit("twenty", &subject, Tier::Basic).await);
    }
    assert_eq!(last.as_ref().unwrap().warning, Some(UsageWarning::ApproachingLimit));

    for _ in 0..3 {
        last = Some(guard.admit("twenty", &subject, Tier::Basic).await);
    }
    assert_eq!(last.unwrap().warning, Some(UsageWarning::Critical));
}

#[tokio::test]
async fn test_fallback_is_transparent_and_recovers() {
    let Harness { guard, store, .. } = harness(&config_with_policy("tiny", 3, 60));
    let subject = user("during-outage");

    store.set_down(true);
    let first = guard.admit("tiny", &subject, Tier::Basic).await;
    assert!(first.allowed);
    assert_eq!(first.source, CounterSource::Fallback);
    assert_eq!(guard.circuit_state(), CircuitState::Fallback);

    // Degraded requests no longer touch the primary
    let calls_after_trip = store.calls();
    assert!(guard.admit("tiny", &subject, Tier::Basic).await.allowed);
    assert!(guard.admit("tiny", &subject, Tier::Basic).await.allowed);
    let denied = guard.admit("tiny", &subject, Tier::Basic).await;
    assert!(!denied.allowed);
    assert!(denied.is_fallback());
    assert_eq!(store.calls(), calls_after_trip);

    let snapshot = guard.metrics().snapshot();
    assert_eq!(snapshot.fallback_activations, 1);
    assert_eq!(snapshot.store_errors, 1);

    // Probe keeps failing while the store is down
    assert!(!guard.limiter().probe_primary().await);

    store.set_down(false);
    assert!(guard.limiter().probe_primary().await);
    assert_eq!(guard.circuit_state(), CircuitState::Primary);
    assert_eq!(guard.metrics().snapshot().fallback_recoveries, 1);

    let recovered = guard.admit("tiny", &user("after-outage"), Tier::Basic).await;
    assert_eq!(recovered.source, CounterSource::Primary);
}

#[tokio::test]
async fn test_slow_store_times_out_into_fallback() {
    let Harness { guard, store, .. } = harness(&config_with_policy("tiny", 3, 60));
    store.set_delay(Duration::from_millis(300));

    let result = guard.admit("tiny", &user("patient"), Tier::Basic).await;
    assert!(result.allowed);
    assert_eq!(result.source, CounterSource::Fallback);
    assert_eq!(guard.metrics().snapshot().fallback_activations, 1);
}

#[tokio::test]
async fn test_unknown_policy_denies_and_counts() {
    let Harness { guard, store, .. } = harness(&config_with_policy("tiny", 3, 60));

    let result = guard.admit("typo", &user("x"), Tier::Premium).await;
    assert!(!result.allowed);
    assert_eq!(guard.metrics().snapshot().config_errors, 1);
    assert_eq!(store.calls(), 0);
}
