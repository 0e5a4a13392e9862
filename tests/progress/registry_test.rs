/*!
 * Tracker Registry Tests
 * Factory lookup, options, and custom kinds
 */

use pretty_assertions::assert_eq;
use seo_analyzer_core::progress::{
    create_tracker, EstimatorConfig, ProgressError, ProgressStage, ProgressState, ProgressTracker,
    StageWeights, Tracker, TrackerOptions, TrackerRegistry,
};
use seo_analyzer_core::ManualClock;
use std::time::Duration;

#[test]
fn test_builtin_kinds_behave_identically_for_base_operations() {
    for kind in ["simple", "analyzer"] {
        let mut tracker = create_tracker(kind, "example.com", 100).unwrap();
        assert_eq!(tracker.kind(), kind);

        tracker.start().unwrap();
        tracker.set_stage(ProgressStage::Processing, 0.5).unwrap();
        assert_eq!(tracker.current_step(), 10);
        tracker.fail("timeout").unwrap();
        assert_eq!(tracker.state(), ProgressState::Failed);
        assert_eq!(tracker.errors()[0].text, "timeout");
    }
}

#[test]
fn test_only_analyzer_downcasts() {
    let mut simple = create_tracker("simple", "a", 1).unwrap();
    assert!(simple.as_analyzer_mut().is_none());

    let mut analyzer = create_tracker("analyzer", "b", 1).unwrap();
    assert!(analyzer.as_analyzer_mut().is_some());
}

#[test]
fn test_unknown_kind_is_an_error() {
    let registry = TrackerRegistry::with_builtins();
    let err = registry
        .create("spinner", &TrackerOptions::new("x", 1))
        .err()
        .unwrap();
    assert_eq!(err, ProgressError::UnknownTracker("spinner".into()));
    assert_eq!(err.to_string(), "Unknown tracker kind: spinner");
}

#[test]
fn test_options_carry_clock_and_estimator() {
    let clock = ManualClock::shared();
    let options = TrackerOptions::new("example.com", 100)
        .with_clock(clock.clone())
        .with_estimator(EstimatorConfig::default().with_smoothing(1.0).unwrap());
    let mut tracker = TrackerRegistry::default().create("simple", &options).unwrap();

    tracker.start().unwrap();
    clock.advance(Duration::from_secs(1));
    tracker.update(10).unwrap();
    clock.advance(Duration::from_secs(1));
    tracker.update(20).unwrap();
    clock.advance(Duration::from_secs(1));
    tracker.update(40).unwrap();

    assert_eq!(tracker.elapsed_time(), Duration::from_secs(3));
    // Smoothing 1.0 keeps only the fresh estimate: 60 steps at 15/s
    let eta = tracker.estimated_time_remaining().unwrap().as_secs_f64();
    assert!((eta - 4.0).abs() < 1e-6);
}

#[test]
fn test_registering_custom_kind_and_replacing_builtin() {
    let mut registry = TrackerRegistry::with_builtins();
    registry.register("weighted_fetch", |options: &TrackerOptions| {
        let weights = StageWeights::from_pairs(&[(ProgressStage::Collection, 1.0)])
            .unwrap_or_default();
        Box::new(options.build_base().with_weights(weights)) as Box<dyn Tracker>
    });
    registry.register("simple", |options: &TrackerOptions| {
        let mut tracker = ProgressTracker::new(format!("simple:{}", options.name), 1);
        tracker.log_message("replaced");
        Box::new(tracker) as Box<dyn Tracker>
    });

    assert_eq!(registry.kinds(), vec!["analyzer", "simple", "weighted_fetch"]);

    let mut fetch = registry
        .create("weighted_fetch", &TrackerOptions::new("fetch", 10))
        .unwrap();
    fetch.start().unwrap();
    fetch.set_stage(ProgressStage::Collection, 0.5).unwrap();
    assert_eq!(fetch.current_step(), 5);

    let simple = registry
        .create("simple", &TrackerOptions::new("x", 10))
        .unwrap();
    assert_eq!(simple.name(), "simple:x");
    assert_eq!(simple.messages()[0].text, "replaced");
}
