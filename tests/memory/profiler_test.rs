/*!
 * Profiler Tests
 * Scoped measurement around blocks, closures, and futures
 */

use pretty_assertions::assert_eq;
use seo_analyzer_core::core::types::{GIB, MIB};
use seo_analyzer_core::memory::{
    MonitorConfig, Profiler, ProfilerConfig, ResourceMonitor, ScriptedProbe,
};
use std::sync::Arc;
use std::time::Duration;

fn setup(config: ProfilerConfig) -> (Arc<ScriptedProbe>, Arc<ResourceMonitor>, Profiler) {
    let probe = Arc::new(ScriptedProbe::new(2 * GIB));
    let monitor = Arc::new(ResourceMonitor::with_probe(
        probe.clone(),
        MonitorConfig::default(),
    ));
    let profiler = Profiler::new(Arc::clone(&monitor), config);
    (probe, monitor, profiler)
}

#[test]
fn test_peak_includes_samples_taken_inside_scope() {
    let (probe, monitor, profiler) = setup(ProfilerConfig::default());
    probe.push_readings([100 * MIB, 500 * MIB, 200 * MIB]);

    let scope = profiler.profile_block("crawl_sitemap");
    monitor.sample().unwrap();
    let result = scope.finish();

    assert_eq!(result.before.as_ref().map(|s| s.rss), Some(100 * MIB));
    assert_eq!(result.after.as_ref().map(|s| s.rss), Some(200 * MIB));
    assert_eq!(result.peak.as_ref().map(|s| s.rss), Some(500 * MIB));
    assert_eq!(result.rss_delta(), 100 * MIB as i64);
}

#[test]
fn test_scope_finalized_on_drop() {
    let (_, _, profiler) = setup(ProfilerConfig::default());
    {
        let mut scope = profiler.profile_block("score_headings");
        scope.record_context("headings", 7);
    }

    let result = profiler.last_result().unwrap();
    assert_eq!(result.name, "score_headings");
    assert_eq!(result.context["headings"], 7);
    assert!(result.ended_at >= result.started_at);
}

#[test]
fn test_measure_returns_value_and_result() {
    let (probe, _, profiler) = setup(ProfilerConfig::default());
    probe.set_rss(64 * MIB);

    let (links, result) = profiler.measure("extract_links", || {
        std::thread::sleep(Duration::from_millis(5));
        vec!["/a", "/b"]
    });

    assert_eq!(links.len(), 2);
    assert!(result.duration >= Duration::from_millis(5));
    assert_eq!(result.rss_delta(), 0);
    assert_eq!(profiler.results().len(), 1);
}

#[test]
fn test_error_shows_in_display() {
    let (_, _, profiler) = setup(ProfilerConfig::default());
    let outcome: Result<u32, std::io::Error> = profiler.profile_result("fetch_robots", || {
        Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "robots.txt timed out"))
    });
    assert!(outcome.is_err());

    let rendered = profiler.last_result().unwrap().to_string();
    assert!(rendered.starts_with("fetch_robots: "));
    assert!(rendered.ends_with("(error: robots.txt timed out)"));
}

#[test]
fn test_cpu_and_allocations_optional() {
    let config = ProfilerConfig::default()
        .with_cpu_tracking(false)
        .with_allocation_tracking(true);
    let (_, _, profiler) = setup(config);

    let result = profiler.measure("noop", || ()).1;
    assert!(result.cpu.is_none());
    // No counting allocator is installed in this test binary
    assert!(result.allocation_deltas.is_none());
}

#[test]
fn test_failed_probe_leaves_readings_empty() {
    let (probe, _, profiler) = setup(ProfilerConfig::default());
    probe.fail_next();

    let result = profiler.profile_block("degraded").finish();
    assert!(result.before.is_none());
    assert!(result.after.is_some());
    assert_eq!(result.rss_delta(), 0);
}

#[tokio::test]
async fn test_profile_async_spans_awaits() {
    let (probe, _, profiler) = setup(ProfilerConfig::default());
    probe.set_rss(10 * MIB);

    let pages = profiler
        .profile_async("fetch_pages", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            3usize
        })
        .await;

    assert_eq!(pages, 3);
    let result = profiler.last_result().unwrap();
    assert_eq!(result.name, "fetch_pages");
    assert!(result.duration >= Duration::from_millis(10));
}

#[tokio::test]
async fn test_concurrent_async_profiles_each_recorded() {
    let (probe, _, profiler) = setup(ProfilerConfig::default());
    probe.set_rss(10 * MIB);

    let (robots, sitemap) = futures::future::join(
        profiler.profile_async("fetch_robots", async { "robots.txt" }),
        profiler.profile_async("fetch_sitemap", async {
            tokio::task::yield_now().await;
            "sitemap.xml"
        }),
    )
    .await;

    assert_eq!((robots, sitemap), ("robots.txt", "sitemap.xml"));
    let mut names: Vec<String> = profiler.results().into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, vec!["fetch_robots", "fetch_sitemap"]);
}
