//! Loop breaker scenarios: episode emission at threshold, window reset,
//! shadow mode, and suppression lifetime.

use chrono::{Duration, Utc};
use cortex::domain::models::config::LoopBreakerConfig;
use cortex::domain::models::signature::{FailureAttribution, FailureCategory, FailureSignature};
use cortex::services::LoopBreaker;
use uuid::Uuid;

fn signature() -> FailureSignature {
    FailureSignature::new(
        FailureCategory::Navigation,
        "move_to",
        Some("iron_ore"),
        "path_blocked",
    )
}

fn config() -> LoopBreakerConfig {
    LoopBreakerConfig {
        threshold: 3,
        window_ms: 300_000,
        suppression_ttl_ms: 600_000,
        shadow_mode: false,
        max_signatures: 16,
    }
}

#[test]
fn three_distinct_tasks_one_episode() {
    let mut breaker = LoopBreaker::new(config());
    let sig = signature();
    let now = Utc::now();

    let mut episodes = 0;
    for _ in 0..3 {
        if breaker
            .record_failure_at(&sig, &FailureAttribution::new(Uuid::new_v4()), now)
            .is_some()
        {
            episodes += 1;
        }
    }
    assert_eq!(episodes, 1);

    // A fourth task after the reset starts a new detection window rather
    // than re-firing.
    let fourth = breaker.record_failure_at(&sig, &FailureAttribution::new(Uuid::new_v4()), now);
    assert!(fourth.is_none());
    assert_eq!(breaker.episodes_emitted(), 1);
}

#[test]
fn episode_carries_contributors_and_suppression() {
    let mut breaker = LoopBreaker::new(config());
    let sig = signature();
    let now = Utc::now();
    let tasks: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    let mut episode = None;
    for task_id in &tasks {
        episode = breaker.record_failure_at(
            &sig,
            &FailureAttribution::new(*task_id).with_run(Uuid::new_v4()),
            now,
        );
    }
    let episode = episode.expect("threshold reached");

    assert_eq!(episode.schema, "loop_detected_episode_v1");
    assert_eq!(episode.occurrences, 3);
    assert_eq!(episode.contributing_task_ids, tasks);
    assert_eq!(episode.contributing_run_ids.len(), 3);
    assert_eq!(episode.detected_at, now);
    assert_eq!(
        episode.suppressed_until - episode.detected_at,
        Duration::milliseconds(600_000)
    );
    assert!(!episode.shadow_mode);
    assert!(breaker.is_suppressed_at(&sig.signature_id, now));
}

#[test]
fn shadow_mode_never_suppresses() {
    let mut breaker = LoopBreaker::new(LoopBreakerConfig {
        shadow_mode: true,
        ..config()
    });
    let sig = signature();
    let now = Utc::now();

    for _ in 0..3 {
        breaker.record_failure_at(&sig, &FailureAttribution::new(Uuid::new_v4()), now);
    }
    assert_eq!(breaker.episodes_emitted(), 1);
    assert!(!breaker.is_suppressed_at(&sig.signature_id, now));
}

#[test]
fn suppression_expires_after_ttl() {
    let mut breaker = LoopBreaker::new(config());
    let sig = signature();
    let now = Utc::now();
    for _ in 0..3 {
        breaker.record_failure_at(&sig, &FailureAttribution::new(Uuid::new_v4()), now);
    }

    assert!(breaker.is_suppressed_at(&sig.signature_id, now));
    let before_expiry = now + Duration::milliseconds(599_999);
    assert!(breaker.is_suppressed_at(&sig.signature_id, before_expiry));
    let after_expiry = now + Duration::milliseconds(600_000);
    assert!(!breaker.is_suppressed_at(&sig.signature_id, after_expiry));
}

#[test]
fn distinct_signatures_do_not_interfere() {
    let mut breaker = LoopBreaker::new(config());
    let nav = signature();
    let combat = FailureSignature::new(FailureCategory::Combat, "attack", None, "target_lost");
    let now = Utc::now();

    for _ in 0..2 {
        breaker.record_failure_at(&nav, &FailureAttribution::new(Uuid::new_v4()), now);
        breaker.record_failure_at(&combat, &FailureAttribution::new(Uuid::new_v4()), now);
    }
    // Neither crossed its own threshold.
    assert_eq!(breaker.episodes_emitted(), 0);
}

#[test]
fn window_expiry_forgets_stale_occurrences() {
    let mut breaker = LoopBreaker::new(config());
    let sig = signature();
    let start = Utc::now();

    breaker.record_failure_at(&sig, &FailureAttribution::new(Uuid::new_v4()), start);
    breaker.record_failure_at(&sig, &FailureAttribution::new(Uuid::new_v4()), start);

    // The third failure arrives after the first two slid out of the window.
    let late = start + Duration::milliseconds(300_001);
    let episode = breaker.record_failure_at(&sig, &FailureAttribution::new(Uuid::new_v4()), late);
    assert!(episode.is_none());
}
