/*!
 * Resource Monitor Tests
 * History bounds, summaries, background polling, and probe failures
 */

use mockall::mock;
use pretty_assertions::assert_eq;
use seo_analyzer_core::core::types::{Bytes, GIB, MIB};
use seo_analyzer_core::memory::{
    MemoryPressure, MonitorConfig, ResourceError, ResourceMonitor, ResourceResult,
    ResourceUsageSnapshot, ScriptedProbe, UsageProbe,
};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Probe {}

    impl UsageProbe for Probe {
        fn sample(&self) -> ResourceResult<ResourceUsageSnapshot>;
        fn system_memory(&self) -> Bytes;
    }
}

fn scripted(config: MonitorConfig) -> (Arc<ScriptedProbe>, ResourceMonitor) {
    let probe = Arc::new(ScriptedProbe::new(8 * GIB));
    let monitor = ResourceMonitor::with_probe(probe.clone(), config);
    (probe, monitor)
}

#[test]
fn test_history_is_bounded_and_drops_oldest() {
    let config = MonitorConfig::default()
        .with_poll_interval(Duration::from_secs(1))
        .with_history_window(Duration::from_secs(3));
    let (probe, monitor) = scripted(config);
    probe.push_readings((1..=5).map(|mb| mb * MIB));

    for _ in 0..5 {
        monitor.sample().unwrap();
    }

    let history = monitor.history();
    assert_eq!(monitor.history_capacity(), 3);
    assert_eq!(history.len(), 3);
    let rss: Vec<Bytes> = history.iter().map(|s| s.rss).collect();
    assert_eq!(rss, vec![3 * MIB, 4 * MIB, 5 * MIB]);
    assert_eq!(monitor.peak_rss(), 5 * MIB);
}

#[test]
fn test_summary_includes_current_reading() {
    let (probe, monitor) = scripted(MonitorConfig::default());
    probe.push_readings([100 * MIB, 300 * MIB, 200 * MIB]);
    for _ in 0..3 {
        monitor.sample().unwrap();
    }
    probe.set_rss(200 * MIB);

    let summary = monitor.get_usage_summary();
    assert_eq!(summary.samples, 3);
    assert_eq!(summary.peak_rss, 300 * MIB);
    assert_eq!(summary.current_rss, 200 * MIB);
    assert_eq!(summary.average_rss, 200 * MIB);
}

#[test]
fn test_current_usage_is_not_recorded() {
    let (probe, monitor) = scripted(MonitorConfig::default());
    probe.set_rss(42 * MIB);

    let snapshot = monitor.get_current_usage().unwrap();
    assert_eq!(snapshot.rss, 42 * MIB);
    assert_eq!(monitor.history_len(), 0);
    assert_eq!(monitor.peak_rss(), 42 * MIB);
}

#[test]
fn test_background_polling_is_idempotent() {
    let config = MonitorConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_join_timeout(Duration::from_secs(1));
    let (probe, monitor) = scripted(config);
    probe.set_rss(64 * MIB);

    assert!(monitor.start_monitoring().unwrap());
    assert!(!monitor.start_monitoring().unwrap());
    assert!(monitor.is_monitoring());

    std::thread::sleep(Duration::from_millis(100));

    assert!(monitor.stop_monitoring());
    assert!(!monitor.stop_monitoring());
    assert!(!monitor.is_monitoring());
    assert!(monitor.history_len() > 0);

    // No further samples once stopped
    let settled = monitor.history_len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(monitor.history_len(), settled);
}

#[test]
fn test_probe_failure_surfaces_and_summary_degrades() {
    let mut probe = MockProbe::new();
    probe.expect_system_memory().return_const(4 * GIB);
    let mut seq = mockall::Sequence::new();
    probe
        .expect_sample()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(ResourceUsageSnapshot::from_rss(128 * MIB)));
    probe
        .expect_sample()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|| Err(ResourceError::Probe("permission denied".into())));

    let monitor = ResourceMonitor::with_probe(Arc::new(probe), MonitorConfig::default());
    assert_eq!(monitor.system_memory(), 4 * GIB);

    monitor.sample().unwrap();
    assert!(matches!(
        monitor.get_current_usage(),
        Err(ResourceError::Probe(_))
    ));

    let summary = monitor.get_usage_summary();
    assert_eq!(summary.samples, 1);
    assert_eq!(summary.current_rss, 128 * MIB);
    assert_eq!(summary.peak_rss, 128 * MIB);
}

#[test]
fn test_forced_collection_runs_reclaimers() {
    let config = MonitorConfig::default().with_gc_min_interval(Duration::from_secs(3600));
    let (probe, monitor) = scripted(config);
    probe.push_readings([300 * MIB, 200 * MIB]);

    monitor.collector().register("page_cache", || 12);
    monitor.collector().register("link_cache", || 3);

    let report = monitor.force_garbage_collection();
    assert_eq!(report.reclaimed_items, 15);
    assert_eq!(report.reclaimers_run, 2);
    assert_eq!(report.freed_bytes, 100 * MIB);
    assert!(report.freed_any());

    // Within the minimum interval a plain request is skipped
    assert!(monitor.request_garbage_collection().is_none());
}

#[test]
fn test_snapshot_pressure_levels() {
    let snapshot = ResourceUsageSnapshot::from_rss(GIB);
    assert_eq!(snapshot.rss_mb(), 1024.0);
    assert!((snapshot.rss_percent(4 * GIB) - 25.0).abs() < 1e-9);
    assert_eq!(
        ResourceUsageSnapshot::from_rss(7 * GIB).pressure(8 * GIB),
        MemoryPressure::High
    );
}
