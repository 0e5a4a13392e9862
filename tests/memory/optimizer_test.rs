/*!
 * Memory Optimizer Tests
 * Pooling, memoization, weak tracking, collection caps, and GC integration
 */

use pretty_assertions::assert_eq;
use seo_analyzer_core::core::types::{GIB, MIB};
use seo_analyzer_core::memory::optimizer::{Layout, Optimizable, Unkeyed};
use seo_analyzer_core::memory::{
    MemoryOptimizer, MonitorConfig, OptimizationConfig, OptimizationLevel, OptimizationStrategy,
    ResourceMonitor, ScriptedProbe,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ParsedPage {
    title: String,
    links: Vec<String>,
}

impl Optimizable for ParsedPage {
    fn reset(&mut self) {
        self.title.clear();
        self.links.clear();
    }

    fn compact(&mut self) {
        self.links.shrink_to_fit();
    }
}

fn optimizer(config: OptimizationConfig) -> (Arc<ScriptedProbe>, MemoryOptimizer) {
    let probe = Arc::new(ScriptedProbe::new(4 * GIB));
    let monitor = Arc::new(ResourceMonitor::with_probe(
        probe.clone(),
        MonitorConfig::default(),
    ));
    (probe, MemoryOptimizer::new(monitor, config))
}

#[test]
fn test_pooled_instances_are_reset_and_reused() {
    let (_, optimizer) = optimizer(OptimizationConfig::default());
    let pages = optimizer.optimize_class(
        ParsedPage::default,
        Some(&[OptimizationStrategy::Pooling]),
    );

    {
        let mut page = pages.create();
        page.title = "Home".into();
        page.links.push("/about".into());
    }
    assert_eq!(pages.pool_size(), 1);

    let page = pages.create();
    assert!(page.title.is_empty());
    assert!(page.links.is_empty());
    assert_eq!(pages.constructed(), 1);

    let stats = pages.pool_stats().unwrap();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_pool_capacity_is_bounded() {
    let (_, optimizer) = optimizer(OptimizationConfig::default().with_pool_size(2));
    let pages = optimizer.optimize_class(
        ParsedPage::default,
        Some(&[OptimizationStrategy::Pooling]),
    );

    let live: Vec<_> = (0..5).map(|_| pages.create()).collect();
    drop(live);

    assert_eq!(pages.pool_size(), 2);
    assert_eq!(pages.pool_stats().unwrap().dropped, 3);
}

#[test]
fn test_cached_method_memoizes_per_instance() {
    let (_, optimizer) = optimizer(OptimizationConfig::default());
    let pages = optimizer.optimize_class(
        ParsedPage::default,
        Some(&[OptimizationStrategy::Caching]),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let count_links = pages.cached_method("count_links", move |page: &ParsedPage, prefix: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        page.links.iter().filter(|l| l.starts_with(prefix)).count()
    });
    assert!(count_links.is_cached());

    let mut first = pages.create();
    first.links = vec!["/a".into(), "/b".into(), "https://x".into()];
    let second = pages.create();

    assert_eq!(count_links.call(&first, "/"), 2);
    assert_eq!(count_links.call(&first, "/"), 2);
    assert_eq!(count_links.call(&second, "/"), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(count_links.hits(), 1);
    assert_eq!(count_links.cached_entries(), 2);

    drop(first);
    assert_eq!(count_links.cached_entries(), 1);
}

#[test]
fn test_mutating_and_unkeyed_calls_bypass_cache() {
    let (_, optimizer) = optimizer(OptimizationConfig::default());
    let pages = optimizer.optimize_class(
        ParsedPage::default,
        Some(&[OptimizationStrategy::Caching]),
    );

    let setter = pages.cached_method("set_title", |_: &ParsedPage, title: &String| title.len());
    assert!(!setter.is_cached());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let score = pages.cached_method("score", move |_: &ParsedPage, weight: &Unkeyed<f64>| {
        counter.fetch_add(1, Ordering::SeqCst);
        weight.0 * 2.0
    });

    let page = pages.create();
    score.call(&page, &Unkeyed(1.5));
    score.call(&page, &Unkeyed(1.5));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(score.cached_entries(), 0);
}

#[test]
fn test_cached_property_evaluated_once() {
    let (_, optimizer) = optimizer(
        OptimizationConfig::default().with_level(OptimizationLevel::Aggressive),
    );
    let pages = optimizer.optimize_class(ParsedPage::default, None);
    assert!(pages.has_strategy(OptimizationStrategy::LazyLoading));

    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    let word_count = pages.cached_property("word_count", move |page: &ParsedPage| {
        counter.fetch_add(1, Ordering::SeqCst);
        page.title.split_whitespace().count()
    });

    let mut page = pages.create();
    page.title = "SEO audit report".into();
    assert_eq!(word_count.get(&page), 3);
    assert_eq!(word_count.get(&page), 3);
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cached_property_computed_once_across_threads() {
    let (_, optimizer) = optimizer(OptimizationConfig::default());
    let pages = optimizer.optimize_class(
        ParsedPage::default,
        Some(&[OptimizationStrategy::LazyLoading]),
    );

    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    let link_count = pages.cached_property("link_count", move |page: &ParsedPage| {
        counter.fetch_add(1, Ordering::SeqCst);
        page.links.len()
    });

    let mut page = pages.create();
    page.links = vec!["/a".into(), "/b".into()];
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| assert_eq!(link_count.get(&page), 2));
        }
    });

    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    assert_eq!(link_count.cached_entries(), 1);
    drop(page);
    assert_eq!(link_count.cached_entries(), 0);
}

#[test]
fn test_weak_tracking_of_shared_instances() {
    let (_, optimizer) = optimizer(OptimizationConfig::default());
    let pages = optimizer.optimize_class(
        ParsedPage::default,
        Some(&[OptimizationStrategy::WeakRefs]),
    );

    let first = pages.create_shared();
    let second = pages.create_shared();
    assert_eq!(pages.live_instances(), 2);

    drop(first);
    assert_eq!(pages.live_instances(), 1);
    drop(second);
    assert_eq!(pages.live_instances(), 0);
}

#[test]
fn test_collection_of_pools_through_monitor() {
    let (_, optimizer) = optimizer(OptimizationConfig::default());
    let pages = optimizer.optimize_class(
        ParsedPage::default,
        Some(&[
            OptimizationStrategy::Pooling,
            OptimizationStrategy::GcOptimization,
        ]),
    );

    let live: Vec<_> = (0..3).map(|_| pages.create()).collect();
    drop(live);
    assert_eq!(pages.pool_size(), 3);

    let report = optimizer.monitor().force_garbage_collection();
    assert!(report.reclaimed_items >= 3);
    assert_eq!(pages.pool_size(), 0);
}

#[test]
fn test_fixed_layout_skips_slots() {
    #[derive(Default)]
    struct Counter(u64);

    impl Optimizable for Counter {
        fn layout() -> Layout {
            Layout::Fixed
        }
    }

    let (_, optimizer) = optimizer(OptimizationConfig::default());
    let counters = optimizer.optimize_class(
        Counter::default,
        Some(&[OptimizationStrategy::Slots, OptimizationStrategy::Compression]),
    );

    let report = counters.report();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(counters.create().0, 0);
}

#[test]
fn test_optimize_collections_mixed_types() {
    let (_, optimizer) = optimizer(OptimizationConfig::default().with_max_collection_size(3));

    let mut urls: Vec<String> = (0..10).map(|i| format!("/p/{i}")).collect();
    let mut scores: BTreeMap<u32, f64> = (0..10).map(|i| (i, i as f64)).collect();
    let mut seen: HashSet<u32> = (0..2).collect();

    let report = optimizer.optimize_collections(&mut [&mut urls, &mut scores, &mut seen]);
    assert_eq!(report.inspected, 3);
    assert_eq!(report.truncated, 2);
    assert_eq!(report.items_removed, 14);
    assert_eq!(urls, vec!["/p/0", "/p/1", "/p/2"]);
    assert_eq!(scores.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(seen.len(), 2);
}

#[test]
fn test_monitor_operation_reports_delta() {
    let (probe, optimizer) = optimizer(
        OptimizationConfig::default().with_level(OptimizationLevel::Minimal),
    );
    probe.set_rss(200 * MIB);

    let operation = optimizer.monitor_operation("render_report");
    probe.set_rss(180 * MIB);
    let summary = operation.finish();

    assert_eq!(summary.name, "render_report");
    assert_eq!(summary.rss_delta, -(20 * MIB as i64));
    assert!(summary.gc.is_some());
}
