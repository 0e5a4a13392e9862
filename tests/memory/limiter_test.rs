/*!
 * Resource Limiter Tests
 * Threshold ordering, cooldowns, throttling, and the background loop
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use seo_analyzer_core::core::types::{Bytes, GIB, MIB};
use seo_analyzer_core::memory::{
    LimiterConfig, MemoryUnit, MonitorConfig, ResourceError, ResourceLimiter, ResourceMonitor,
    ScriptedProbe, ThresholdAction,
};
use seo_analyzer_core::{CoreError, ManualClock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const COOLDOWN: Duration = Duration::from_secs(5);

fn setup() -> (Arc<ScriptedProbe>, Arc<ManualClock>, ResourceLimiter) {
    let probe = Arc::new(ScriptedProbe::new(8 * GIB));
    let monitor = Arc::new(ResourceMonitor::with_probe(
        probe.clone(),
        MonitorConfig::default(),
    ));
    let clock = ManualClock::shared();
    let limiter = ResourceLimiter::with_clock(monitor, LimiterConfig::default(), clock.clone());
    (probe, clock, limiter)
}

fn threshold(limiter: &ResourceLimiter, mb: f64, action: ThresholdAction) {
    limiter
        .add_threshold(mb, action, MemoryUnit::Mb, COOLDOWN, "")
        .unwrap();
}

#[test]
fn test_thresholds_kept_ascending_regardless_of_insert_order() {
    let (_, _, limiter) = setup();
    threshold(&limiter, 300.0, ThresholdAction::Throttle);
    threshold(&limiter, 100.0, ThresholdAction::Warn);
    threshold(&limiter, 200.0, ThresholdAction::Gc);

    let limits: Vec<Bytes> = limiter
        .thresholds()
        .iter()
        .map(|t| t.limit_in_bytes())
        .collect();
    assert_eq!(limits, vec![100 * MIB, 200 * MIB, 300 * MIB]);
}

#[test]
fn test_invalid_thresholds_rejected() {
    let (_, _, limiter) = setup();
    assert!(matches!(
        limiter.add_threshold(0.0, ThresholdAction::Warn, MemoryUnit::Mb, COOLDOWN, ""),
        Err(ResourceError::InvalidThreshold(_))
    ));
    assert!(matches!(
        limiter.add_threshold(150.0, ThresholdAction::Warn, MemoryUnit::Percent, COOLDOWN, ""),
        Err(ResourceError::InvalidThreshold(_))
    ));
    assert!(limiter.thresholds().is_empty());
}

#[test]
fn test_callbacks_fire_in_ascending_order() {
    let (_, _, limiter) = setup();
    let fired = Arc::new(Mutex::new(Vec::new()));
    for action in [ThresholdAction::Warn, ThresholdAction::Gc] {
        let log = fired.clone();
        limiter.register_callback(action, move |usage, threshold| {
            log.lock().push((usage, threshold.action));
        });
    }
    threshold(&limiter, 200.0, ThresholdAction::Gc);
    threshold(&limiter, 100.0, ThresholdAction::Warn);

    let handled = limiter.check_usage(250 * MIB).unwrap();
    assert_eq!(handled, vec![ThresholdAction::Warn, ThresholdAction::Gc]);
    assert_eq!(
        *fired.lock(),
        vec![
            (250 * MIB, ThresholdAction::Warn),
            (250 * MIB, ThresholdAction::Gc)
        ]
    );
}

#[test]
fn test_cooldown_is_per_threshold() {
    let (_, clock, limiter) = setup();
    threshold(&limiter, 100.0, ThresholdAction::Warn);

    assert_eq!(limiter.check_usage(120 * MIB).unwrap().len(), 1);
    clock.advance(Duration::from_secs(2));

    // Second threshold added mid-cooldown fires on its own schedule
    threshold(&limiter, 110.0, ThresholdAction::Warn);
    assert_eq!(limiter.check_usage(120 * MIB).unwrap().len(), 1);

    clock.advance(Duration::from_secs(3));
    // First is out of cooldown (5s), second still cooling (3s)
    assert_eq!(limiter.check_usage(120 * MIB).unwrap().len(), 1);

    clock.advance(Duration::from_secs(2));
    assert_eq!(limiter.check_usage(120 * MIB).unwrap().len(), 1);
}

#[test]
fn test_usage_below_limit_never_fires() {
    let (_, _, limiter) = setup();
    threshold(&limiter, 100.0, ThresholdAction::Abort);
    assert!(limiter.check_usage(100 * MIB - 1).unwrap().is_empty());
    assert!(limiter.check_usage(100 * MIB).is_err());
}

#[test]
fn test_abort_converts_to_core_error() {
    let (_, _, limiter) = setup();
    threshold(&limiter, 100.0, ThresholdAction::Abort);

    let err: CoreError = limiter.check_usage(500 * MIB).unwrap_err().into();
    assert!(err.is_limit_exceeded());
    assert!(err.to_string().contains("abort"));
}

#[test]
fn test_error_action_still_runs_later_thresholds() {
    let (_, _, limiter) = setup();
    let gc_calls = Arc::new(AtomicUsize::new(0));
    let counter = gc_calls.clone();
    limiter.register_callback(ThresholdAction::Gc, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    threshold(&limiter, 100.0, ThresholdAction::Error);
    threshold(&limiter, 200.0, ThresholdAction::Gc);
    threshold(&limiter, 250.0, ThresholdAction::Abort);

    // First failure in ascending order wins; the gc between them still runs
    match limiter.check_usage(300 * MIB) {
        Err(ResourceError::LimitExceeded { action, limit, .. }) => {
            assert_eq!(action, ThresholdAction::Error);
            assert_eq!(limit, 100 * MIB);
        }
        other => panic!("expected limit failure, got {other:?}"),
    }
    assert_eq!(gc_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_error_then_throttle_in_same_check() {
    let (_, clock, limiter) = setup();
    threshold(&limiter, 100.0, ThresholdAction::Error);
    threshold(&limiter, 200.0, ThresholdAction::Throttle);

    assert!(limiter.check_usage(400 * MIB).is_err());
    assert!((limiter.throttle_factor() - 0.5).abs() < 1e-9);

    clock.advance(Duration::from_secs(1));
    let outcome = limiter.evaluate_cycle(400 * MIB);
    assert!(outcome.fired.is_empty());
    assert!(outcome.throttle_factor < 1.0);

    // Cooldown over: the throttle threshold fires again from the loop
    clock.advance(COOLDOWN);
    let outcome = limiter.evaluate_cycle(400 * MIB);
    assert_eq!(
        outcome.fired_actions(),
        vec![ThresholdAction::Error, ThresholdAction::Throttle]
    );
    assert!((outcome.throttle_factor - 0.5).abs() < 1e-9);
}

#[test]
fn test_throttle_then_relax_over_quiet_cycles() {
    let (_, _, limiter) = setup();
    threshold(&limiter, 200.0, ThresholdAction::Throttle);

    let outcome = limiter.evaluate_cycle(400 * MIB);
    assert!((outcome.throttle_factor - 0.5).abs() < 1e-9);
    assert!(limiter.should_throttle());

    // Cooling-down threshold does not fire, so the cycle is quiet
    let outcome = limiter.evaluate_cycle(400 * MIB);
    assert!(outcome.fired.is_empty());
    assert!((outcome.throttle_factor - 0.55).abs() < 1e-9);

    for _ in 0..10 {
        limiter.evaluate_cycle(0);
    }
    assert_eq!(limiter.throttle_factor(), 1.0);
    assert!(!limiter.should_throttle());
}

#[tokio::test(start_paused = true)]
async fn test_throttle_if_needed_waits_scaled_delay() {
    let (_, _, limiter) = setup();

    let start = tokio::time::Instant::now();
    assert_eq!(limiter.throttle_if_needed().await, Duration::ZERO);
    assert_eq!(start.elapsed(), Duration::ZERO);

    limiter.apply_throttling(0.4);
    let expected = limiter.throttle_delay();
    assert_eq!(expected, Duration::from_millis(600));
    let start = tokio::time::Instant::now();
    let waited = limiter.throttle_if_needed().await;

    assert_eq!(waited, expected);
    assert!(start.elapsed() >= expected);
}

#[test]
fn test_background_loop_enforces_thresholds() {
    let probe = Arc::new(ScriptedProbe::new(8 * GIB));
    let monitor = Arc::new(ResourceMonitor::with_probe(
        probe.clone(),
        MonitorConfig::default(),
    ));
    let config = LimiterConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_join_timeout(Duration::from_secs(1));
    let limiter = ResourceLimiter::new(monitor, config);

    let warnings = Arc::new(AtomicUsize::new(0));
    let counter = warnings.clone();
    limiter.register_callback(ThresholdAction::Warn, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    limiter
        .add_threshold(
            100.0,
            ThresholdAction::Warn,
            MemoryUnit::Mb,
            Duration::from_secs(60),
            "background warning",
        )
        .unwrap();
    probe.set_rss(150 * MIB);

    assert!(limiter.start().unwrap());
    std::thread::sleep(Duration::from_millis(100));
    assert!(limiter.stop());

    // Cooldown keeps the repeated cycles to a single firing
    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    assert!(limiter.monitor().history_len() > 0);
}

proptest! {
    #[test]
    fn prop_applied_factor_stays_in_bounds(factor in -10.0f64..10.0) {
        let (_, _, limiter) = setup();
        let applied = limiter.apply_throttling(factor);
        prop_assert!((0.1..=1.0).contains(&applied));
        prop_assert_eq!(applied, limiter.throttle_factor());
    }

    #[test]
    fn prop_throttle_action_factor_in_range(limit_mb in 1u64..4096, over_mb in 0u64..8192) {
        let (_, _, limiter) = setup();
        threshold(&limiter, limit_mb as f64, ThresholdAction::Throttle);
        let outcome = limiter.evaluate_cycle((limit_mb + over_mb) * MIB);
        prop_assert_eq!(outcome.fired.len(), 1);
        prop_assert!(outcome.throttle_factor >= 0.1 - 1e-12);
        prop_assert!(outcome.throttle_factor <= 0.9 + 1e-12);
    }
}
