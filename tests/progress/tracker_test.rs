/*!
 * Progress Tracker Tests
 * State machine guards, pause accounting, estimation, and stage weighting
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use seo_analyzer_core::core::types::Step;
use seo_analyzer_core::progress::{
    ProgressError, ProgressStage, ProgressState, ProgressTracker, StageWeights,
};
use seo_analyzer_core::ManualClock;
use std::sync::Arc;
use std::time::Duration;

fn tracker(total: Step) -> (Arc<ManualClock>, ProgressTracker) {
    let clock = ManualClock::shared();
    let tracker = ProgressTracker::new("example.com", total).with_clock(clock.clone());
    (clock, tracker)
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Drive a fresh tracker into `state`
fn in_state(state: ProgressState) -> ProgressTracker {
    let (_, mut t) = tracker(10);
    match state {
        ProgressState::NotStarted => {}
        ProgressState::Running => t.start().unwrap(),
        ProgressState::Paused => {
            t.start().unwrap();
            t.pause().unwrap();
        }
        ProgressState::Completed => {
            t.start().unwrap();
            t.complete().unwrap();
        }
        ProgressState::Failed => {
            t.start().unwrap();
            t.fail("boom").unwrap();
        }
        ProgressState::Cancelled => {
            t.start().unwrap();
            t.cancel().unwrap();
        }
    }
    assert_eq!(t.state(), state);
    t
}

const ALL_STATES: [ProgressState; 6] = [
    ProgressState::NotStarted,
    ProgressState::Running,
    ProgressState::Paused,
    ProgressState::Completed,
    ProgressState::Failed,
    ProgressState::Cancelled,
];

#[test]
fn test_transition_table() {
    for state in ALL_STATES {
        let allowed_start = matches!(state, ProgressState::NotStarted | ProgressState::Paused);
        assert_eq!(in_state(state).start().is_ok(), allowed_start, "start from {state}");

        let running = state == ProgressState::Running;
        assert_eq!(in_state(state).pause().is_ok(), running, "pause from {state}");
        assert_eq!(in_state(state).update(1).is_ok(), running, "update from {state}");
        assert_eq!(in_state(state).increment(1).is_ok(), running, "increment from {state}");
        assert_eq!(
            in_state(state)
                .set_stage(ProgressStage::Collection, 0.5)
                .is_ok(),
            running,
            "set_stage from {state}"
        );

        let active = state.is_active();
        assert_eq!(in_state(state).complete().is_ok(), active, "complete from {state}");
        assert_eq!(in_state(state).cancel().is_ok(), active, "cancel from {state}");
        assert_eq!(in_state(state).fail("x").is_ok(), active, "fail from {state}");
    }
}

#[test]
fn test_rejected_transition_names_state_and_operation() {
    let mut t = in_state(ProgressState::Completed);
    match t.pause() {
        Err(ProgressError::InvalidTransition {
            tracker,
            from,
            operation,
        }) => {
            assert_eq!(tracker, "example.com");
            assert_eq!(from, ProgressState::Completed);
            assert_eq!(operation, "pause");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn test_update_and_increment_bounds() {
    let (_, mut t) = tracker(50);
    t.start().unwrap();

    assert!(matches!(
        t.update(51),
        Err(ProgressError::StepOutOfRange { step: 51, total: 50 })
    ));
    t.update(45).unwrap();
    t.increment(20).unwrap();
    assert_eq!(t.current_step(), 50);
    assert_eq!(t.progress_percentage(), 100.0);
    assert_eq!(t.state(), ProgressState::Running);
}

#[test]
fn test_elapsed_excludes_pauses() {
    let (clock, mut t) = tracker(100);
    assert_eq!(t.elapsed_time(), Duration::ZERO);

    t.start().unwrap();
    clock.advance(secs(3));
    t.pause().unwrap();
    clock.advance(secs(10));
    assert_eq!(t.elapsed_time(), secs(3));
    assert_eq!(t.paused_duration(), secs(10));

    t.start().unwrap();
    clock.advance(secs(2));
    assert_eq!(t.elapsed_time(), secs(5));

    // Completing while paused folds the open pause
    t.pause().unwrap();
    clock.advance(secs(4));
    t.complete().unwrap();
    clock.advance(secs(100));
    assert_eq!(t.elapsed_time(), secs(5));
    assert_eq!(t.paused_duration(), secs(14));
}

#[test]
fn test_remaining_time_is_smoothed_and_ignores_pauses() {
    let (clock, mut t) = tracker(100);
    t.start().unwrap();
    assert!(t.estimated_time_remaining().is_none());

    for step in [10, 20, 30] {
        clock.advance(secs(1));
        t.update(step).unwrap();
    }
    // 8s from the first rate, then 0.2 * 7 + 0.8 * 8
    let eta = t.estimated_time_remaining().unwrap().as_secs_f64();
    assert!((eta - 7.8).abs() < 1e-6, "eta {eta}");

    t.pause().unwrap();
    clock.advance(secs(60));
    t.start().unwrap();
    clock.advance(secs(1));
    t.update(40).unwrap();

    let eta = t.estimated_time_remaining().unwrap().as_secs_f64();
    assert!((eta - 7.44).abs() < 1e-6, "eta {eta}");
    assert!((t.rate().unwrap() - 10.0).abs() < 1e-9);
}

#[test]
fn test_remaining_time_by_state() {
    let mut completed = in_state(ProgressState::Completed);
    assert_eq!(completed.estimated_time_remaining(), Some(Duration::ZERO));
    assert_eq!(completed.current_step(), 10);
    assert!(completed.start().is_err());

    assert!(in_state(ProgressState::Cancelled)
        .estimated_time_remaining()
        .is_none());
    assert!(in_state(ProgressState::NotStarted)
        .estimated_time_remaining()
        .is_none());
}

#[test]
fn test_stage_changes_logged_once() {
    let (_, mut t) = tracker(100);
    t.start().unwrap();
    t.set_stage(ProgressStage::Collection, 0.2).unwrap();
    t.update_stage_progress(0.6).unwrap();
    t.set_stage(ProgressStage::Collection, 0.9).unwrap();
    t.set_stage(ProgressStage::Processing, 0.0).unwrap();

    let texts: Vec<&str> = t.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Started example.com",
            "Entered stage collection",
            "Entered stage processing"
        ]
    );
    assert_eq!(t.messages()[1].stage, ProgressStage::Collection);
}

#[test]
fn test_set_stage_rejects_bad_fraction() {
    let (_, mut t) = tracker(100);
    t.start().unwrap();
    for bad in [-0.1, 1.5, f64::NAN] {
        assert!(matches!(
            t.set_stage(ProgressStage::Analysis, bad),
            Err(ProgressError::ProgressOutOfRange { .. })
        ));
    }
    assert_eq!(t.current_stage(), ProgressStage::Initialization);
    assert_eq!(t.current_step(), 0);
}

#[test]
fn test_reweighting_recomputes_step() {
    let (_, mut t) = tracker(200);
    t.start().unwrap();
    t.set_stage(ProgressStage::Reporting, 1.0).unwrap();
    assert_eq!(t.current_step(), 30);

    let reporting_heavy = StageWeights::from_pairs(&[
        (ProgressStage::Analysis, 0.5),
        (ProgressStage::Reporting, 0.5),
    ])
    .unwrap();
    t.set_weights(reporting_heavy);
    assert_eq!(t.current_step(), 100);
}

#[test]
fn test_zero_total_tracker() {
    let (_, mut t) = tracker(0);
    t.start().unwrap();
    t.set_stage(ProgressStage::Cleanup, 1.0).unwrap();
    assert_eq!(t.current_step(), 0);
    assert_eq!(t.progress_percentage(), 0.0);
    t.complete().unwrap();
    assert_eq!(t.progress_percentage(), 100.0);
}

fn arb_progress() -> impl Strategy<Value = [f64; 6]> {
    prop::array::uniform6(0.0f64..=1.0)
}

proptest! {
    #[test]
    fn prop_step_matches_weighted_stage_sum(
        total in 0u64..10_000,
        progress in arb_progress(),
    ) {
        let (_, mut t) = tracker(total);
        t.start().unwrap();
        for stage in ProgressStage::ALL {
            t.set_stage(stage, progress[stage.index()]).unwrap();
        }

        let sum: f64 = ProgressStage::ALL
            .iter()
            .map(|s| t.weights().get(*s) * progress[s.index()])
            .sum();
        let expected = ((total as f64 * sum).round() as Step).min(total);
        prop_assert!(t.current_step().abs_diff(expected) <= 1);
        prop_assert!(t.current_step() <= total);
    }

    #[test]
    fn prop_valid_weights_accepted(raw in prop::array::uniform6(0.01f64..10.0)) {
        let sum: f64 = raw.iter().sum();
        let normalized = raw.map(|w| w / sum);
        prop_assert!(StageWeights::new(normalized).is_ok());

        let doubled = raw.map(|w| 2.0 * w / sum);
        prop_assert!(StageWeights::new(doubled).is_err());
    }
}
