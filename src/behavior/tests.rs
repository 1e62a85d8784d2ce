use std::sync::Arc;

use chrono::TimeDelta;

use super::*;
use crate::clock::{Clock, ManualClock};
use crate::smtp::SmtpCategory;
use crate::store::{MemoryStore, ResolutionStore, ResolutionUpdate};

fn tracker_with_row(domain: &str, host: &str) -> (BehaviorTracker, Arc<MemoryStore>) {
    let clock = Arc::new(ManualClock::at("2024-05-01T12:00:00Z"));
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_resolution(ResolutionUpdate {
            company_id: 1,
            domain: domain.to_string(),
            mx_hosts: vec![host.to_string()],
            preference_map: [(host.to_string(), 10)].into_iter().collect(),
            lowest_mx: Some(host.to_string()),
            resolved_at: clock.now(),
            ttl: 3600,
            failure: None,
        })
        .unwrap();
    let tracker = BehaviorTracker::new(store.clone(), clock);
    (tracker, store)
}

fn stats(store: &MemoryStore, host: &str) -> MxBehaviorStats {
    store
        .behavior_for(host, None)
        .unwrap()
        .expect("stats recorded")
}

#[test]
fn ewma_seeds_with_first_sample() {
    let mut s = MxBehaviorStats::default();
    let now = chrono::Utc::now();
    s.observe(SmtpCategory::Accept, 100, Some(250), None, now);
    assert_eq!(s.avg_ms, 100.0);
    s.observe(SmtpCategory::Accept, 200, Some(250), None, now);
    assert!((s.avg_ms - 130.0).abs() < 1e-9);
    assert_eq!(s.n, 2);
    assert_eq!(s.accept, 2);
}

#[test]
fn observations_are_classified_by_code() {
    let (tracker, store) = tracker_with_row("example.com", "mx.example.com");
    tracker.record_observation("mx.example.com", Some("example.com"), Some(250), 50, None);
    tracker.record_observation("mx.example.com", Some("example.com"), Some(550), 50, None);
    tracker.record_observation("mx.example.com", Some("example.com"), Some(451), 50, None);
    tracker.record_observation(
        "MX.example.com.",
        Some("example.com"),
        None,
        50,
        Some("timeout:read"),
    );

    let s = stats(&store, "mx.example.com");
    assert_eq!((s.n, s.accept, s.hard_fail, s.temp_fail, s.unknown), (4, 1, 1, 1, 1));
    assert_eq!(s.last_code, None);
    assert_eq!(s.last_error.as_deref(), Some("timeout:read"));
}

#[test]
fn observation_without_row_is_dropped() {
    let (tracker, store) = tracker_with_row("example.com", "mx.example.com");
    tracker.record_observation("mx.elsewhere.net", Some("elsewhere.net"), Some(250), 10, None);
    assert!(store.behavior_for("mx.elsewhere.net", None).unwrap().is_none());
}

#[test]
fn no_data_gives_normal_hint() {
    let (tracker, _) = tracker_with_row("example.com", "mx.example.com");
    let hint = tracker.get_hint("mx.example.com", Some("example.com")).unwrap();
    assert_eq!(hint, BehaviorHint::normal());
    assert_eq!(hint.connect_timeout.as_secs(), 10);
    assert_eq!(hint.max_retries, 1);
}

#[test]
fn slow_flaky_host_is_tarpit() {
    let (tracker, _) = tracker_with_row("example.com", "mx.example.com");
    for code in [Some(451), Some(451), None, Some(250), Some(250)] {
        tracker.record_observation("mx.example.com", Some("example.com"), code, 900, None);
    }
    let hint = tracker.get_hint("mx.example.com", Some("example.com")).unwrap();
    assert_eq!(hint.profile, HintProfile::Tarpit);
    assert_eq!(hint.max_retries, 0);
    assert_eq!(hint.command_timeout.as_secs(), 5);
}

#[test]
fn quick_reliable_host_is_fast() {
    let (tracker, _) = tracker_with_row("example.com", "mx.example.com");
    for _ in 0..5 {
        tracker.record_observation("mx.example.com", Some("example.com"), Some(250), 80, None);
    }
    let hint = tracker.get_hint("mx.example.com", Some("example.com")).unwrap();
    assert_eq!(hint.profile, HintProfile::Fast);
    assert_eq!(hint.connect_timeout.as_secs(), 8);
}

#[test]
fn thresholds_need_enough_samples() {
    let mut s = MxBehaviorStats::default();
    let now = chrono::Utc::now();
    for _ in 0..3 {
        s.observe(SmtpCategory::Unknown, 2_000, None, None, now);
    }
    assert_eq!(BehaviorHint::from_stats(Some(&s)).profile, HintProfile::Normal);
    s.observe(SmtpCategory::Unknown, 2_000, None, None, now);
    assert_eq!(BehaviorHint::from_stats(Some(&s)).profile, HintProfile::Tarpit);

    let mut quick = MxBehaviorStats::default();
    for _ in 0..4 {
        quick.observe(SmtpCategory::Accept, 20, Some(250), None, now);
    }
    assert_eq!(BehaviorHint::from_stats(Some(&quick)).profile, HintProfile::Normal);
}

#[test]
fn updated_at_follows_clock() {
    let clock = Arc::new(ManualClock::at("2024-05-01T12:00:00Z"));
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_resolution(ResolutionUpdate {
            company_id: 1,
            domain: "example.com".to_string(),
            mx_hosts: vec!["mx.example.com".to_string()],
            preference_map: Default::default(),
            lowest_mx: Some("mx.example.com".to_string()),
            resolved_at: clock.now(),
            ttl: 3600,
            failure: None,
        })
        .unwrap();
    let tracker = BehaviorTracker::new(store.clone(), clock.clone());
    clock.advance(TimeDelta::minutes(5));
    tracker.record_observation("mx.example.com", None, Some(250), 10, None);
    assert_eq!(stats(&store, "mx.example.com").updated_at, Some(clock.now()));
}
