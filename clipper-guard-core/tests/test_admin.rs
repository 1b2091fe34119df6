//! Admin control surface

mod common;

use std::time::Duration;

use clipper_guard_core::application::{AdminError, GuardRequest};
use clipper_guard_core::domain::Tier;
use common::{Harness, config_with_policy, harness};

async fn ban(h: &Harness, ip: &str) {
    let req = GuardRequest {
        ip: ip.parse().unwrap(),
        user_id: None,
        tier: Tier::Unauthenticated,
        policy: "bulk".to_string(),
        track_abuse: true,
    };
    for _ in 0..3 {
        h.guard.evaluate(&req).await;
    }
    assert!(h.guard.detector().is_banned(req.ip).await.is_some());
}

fn small_threshold() -> clipper_guard_core::Config {
    let mut config = config_with_policy("bulk", 5000, 3600);
    config.abuse.threshold = 2;
    config
}

#[tokio::test]
async fn test_unban_is_idempotent_and_resets_counter() {
    let h = harness(&small_threshold());
    ban(&h, "203.0.113.7").await;

    let first = h.admin.unban_ip("203.0.113.7").await.unwrap();
    assert!(first.was_banned);
    let second = h.admin.unban_ip("203.0.113.7").await.unwrap();
    assert!(!second.was_banned);

    let stats = h.admin.get_abuse_stats("203.0.113.7").await.unwrap();
    assert_eq!(stats.count, 0);
    assert!(stats.ban.is_none());

    // Never-banned IPs unban cleanly too
    assert!(!h.admin.unban_ip("192.0.2.99").await.unwrap().was_banned);
}

#[tokio::test]
async fn test_mapped_ipv6_spelling_reaches_ipv4_ban() {
    let h = harness(&small_threshold());
    ban(&h, "203.0.113.9").await;

    let stats = h.admin.get_abuse_stats("::ffff:203.0.113.9").await.unwrap();
    assert_eq!(stats.ip.to_string(), "203.0.113.9");
    assert!(stats.ban.is_some());

    let outcome = h.admin.unban_ip("::ffff:203.0.113.9").await.unwrap();
    assert!(outcome.was_banned);
    assert!(h.guard.detector().is_banned("203.0.113.9".parse().unwrap()).await.is_none());
}

#[tokio::test]
async fn test_list_banned_ips_oldest_first() {
    let h = harness(&small_threshold());
    ban(&h, "203.0.113.1").await;
    h.clock.advance(Duration::from_secs(30));
    ban(&h, "2001:db8::5").await;

    let bans = h.admin.list_banned_ips().await.unwrap();
    let ips: Vec<String> = bans.iter().map(|b| b.ip.to_string()).collect();
    assert_eq!(ips, vec!["203.0.113.1", "2001:db8::5"]);

    h.admin.unban_ip("203.0.113.1").await.unwrap();
    assert_eq!(h.admin.list_banned_ips().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stats_report_counter_and_ban() {
    let h = harness(&small_threshold());
    ban(&h, "203.0.113.8").await;

    let stats = h.admin.get_abuse_stats("203.0.113.8").await.unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.threshold, 2);
    assert!(stats.window_expires_at.is_some());
    assert_eq!(stats.ban.unwrap().request_count, 3);
}

#[tokio::test]
async fn test_invalid_ip_is_rejected() {
    let h = harness(&small_threshold());
    assert!(matches!(
        h.admin.get_abuse_stats("not-an-ip").await,
        Err(AdminError::InvalidIp(_))
    ));
    assert!(matches!(
        h.admin.unban_ip("300.1.1.1").await,
        Err(AdminError::InvalidIp(_))
    ));
}

#[tokio::test]
async fn test_store_errors_propagate() {
    let h = harness(&small_threshold());
    h.store.set_down(true);

    assert!(matches!(
        h.admin.list_banned_ips().await,
        Err(AdminError::Store(_))
    ));
    assert!(matches!(
        h.admin.unban_ip("203.0.113.9").await,
        Err(AdminError::Store(_))
    ));
}
