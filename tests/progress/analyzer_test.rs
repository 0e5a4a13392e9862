/*!
 * Analyzer Progress Tests
 * Per-analyzer rollup, snapshots, and rendering through the tracker trait
 */

use pretty_assertions::assert_eq;
use seo_analyzer_core::core::types::Metadata;
use seo_analyzer_core::progress::{
    AnalyzerProgressTracker, JsonRenderer, ProgressError, ProgressSnapshot, ProgressStage,
    ProgressState, ProgressTracker, TextRenderer, Tracker,
};
use seo_analyzer_core::ManualClock;
use serde_json::json;

fn analyzing(total: u64) -> AnalyzerProgressTracker {
    let base = ProgressTracker::new("example.com", total).with_clock(ManualClock::shared());
    let mut tracker = AnalyzerProgressTracker::from_tracker(base);
    Tracker::start(&mut tracker).unwrap();
    Tracker::set_stage(&mut tracker, ProgressStage::Analysis, 0.0).unwrap();
    tracker
}

#[test]
fn test_weighted_rollup_uses_normalized_weights() {
    let mut tracker = analyzing(100);
    tracker.register_analyzer("meta_tags", 1.0).unwrap();
    tracker.register_analyzer("links", 3.0).unwrap();

    tracker.set_analyzer_progress("meta_tags", 1.0, "done").unwrap();
    tracker.set_analyzer_progress("links", 0.5, "crawling").unwrap();

    // 0.25 * 1.0 + 0.75 * 0.5
    assert!((tracker.analysis_progress() - 0.625).abs() < 1e-12);
    assert_eq!(tracker.current_step(), 25);
    assert_eq!(tracker.completed_count(), 1);
}

#[test]
fn test_late_registration_dilutes_progress() {
    let mut tracker = analyzing(100);
    tracker.set_analyzer_progress("headings", 1.0, "done").unwrap();
    assert!((tracker.analysis_progress() - 1.0).abs() < 1e-12);

    tracker.register_analyzer("images", 1.0).unwrap();
    assert!((tracker.analysis_progress() - 0.5).abs() < 1e-12);
    assert!((tracker.base().stage_progress(ProgressStage::Analysis) - 0.5).abs() < 1e-12);
    assert_eq!(tracker.current_step(), 20);
}

#[test]
fn test_rollup_pauses_with_tracker() {
    let mut tracker = analyzing(100);
    Tracker::pause(&mut tracker).unwrap();

    // Unit state still recorded; stage untouched until running again
    tracker.set_analyzer_progress("links", 1.0, "done").unwrap();
    assert_eq!(tracker.analyzer_progress("links"), Some(1.0));
    assert_eq!(tracker.base().stage_progress(ProgressStage::Analysis), 0.0);

    Tracker::start(&mut tracker).unwrap();
    tracker.set_analyzer_progress("links", 1.0, "done").unwrap();
    assert_eq!(tracker.base().stage_progress(ProgressStage::Analysis), 1.0);
}

#[test]
fn test_invalid_weight_and_progress() {
    let mut tracker = analyzing(10);
    assert!(matches!(
        tracker.register_analyzer("meta", 0.0),
        Err(ProgressError::InvalidWeights(_))
    ));
    assert!(matches!(
        tracker.set_analyzer_progress("meta", -0.5, "bad"),
        Err(ProgressError::ProgressOutOfRange { .. })
    ));
    assert!(tracker.units().is_empty());
}

#[test]
fn test_metrics_and_status_survive_updates() {
    let mut tracker = analyzing(10);
    let mut metrics = Metadata::new();
    metrics.insert("missing_alt".into(), json!(3));
    tracker.set_analyzer_metrics("images", metrics).unwrap();
    tracker.set_analyzer_progress("images", 0.4, "scanning").unwrap();

    assert_eq!(tracker.analyzer_status("images"), Some("scanning"));
    assert_eq!(tracker.analyzer_metrics("images").unwrap()["missing_alt"], json!(3));
    assert_eq!(tracker.unit("images").unwrap().weight, 1.0);
}

#[test]
fn test_snapshot_lists_units_in_order() {
    let mut tracker = analyzing(100);
    tracker.set_analyzer_progress("meta_tags", 1.0, "done").unwrap();
    tracker.set_analyzer_progress("performance", 0.5, "measuring").unwrap();

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.kind, "analyzer");
    assert_eq!(snapshot.stage, ProgressStage::Analysis);
    let names: Vec<&str> = snapshot.units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["meta_tags", "performance"]);
    assert!(snapshot.units[0].completed);
    assert!(!snapshot.units[1].completed);
    assert_eq!(snapshot.units[1].weight, 0.5);
    assert_eq!(
        snapshot.last_message.as_deref(),
        Some("Analyzer meta_tags completed")
    );
}

#[test]
fn test_json_render_roundtrips_units() {
    let mut tracker = analyzing(100);
    tracker.set_analyzer_progress("links", 0.25, "crawling").unwrap();

    let rendered = tracker.render(&JsonRenderer::default());
    let snapshot: ProgressSnapshot = serde_json::from_str(&rendered).unwrap();
    assert_eq!(snapshot, tracker.snapshot());
    assert_eq!(snapshot.state, ProgressState::Running);
}

#[test]
fn test_text_render_compact_single_line() {
    let mut tracker = analyzing(100);
    tracker.set_analyzer_progress("links", 1.0, "done").unwrap();

    let rendered = tracker.render(&TextRenderer::compact());
    assert!(!rendered.contains('\n'));
    assert!(rendered.starts_with("example.com ["));
    assert!(rendered.contains("(40/100) running | analysis"));
}
