/*!
 * SEO Analyzer - Demo Entry Point
 *
 * Runs a simulated analysis pipeline end to end:
 * - Memory limiter polling in the background with default thresholds
 * - Analyzer tracker driven through all six stages
 * - Throttling honored between work units
 * - Limit failures converted into a failed tracker
 */

use anyhow::{Context, Result};
use seo_analyzer_core::core::types::Metadata;
use seo_analyzer_core::memory::alloc::{enter_site, CountingAllocator};
use seo_analyzer_core::memory::optimizer::{Instance, Optimizable, OptimizationStrategy};
use seo_analyzer_core::memory::{
    LimiterConfig, MemoryOptimizer, MonitorConfig, OptimizationConfig, Profiler, ProfilerConfig,
    ResourceLimiter, ResourceMonitor,
};
use seo_analyzer_core::progress::{
    create_tracker, JsonRenderer, ProgressStage, TextRenderer, Tracker,
};
use seo_analyzer_core::{init_tracing, span_stage, CoreResult};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: CountingAllocator<tikv_jemallocator::Jemalloc> =
    CountingAllocator::with_allocator(tikv_jemallocator::Jemalloc);

#[cfg(not(all(feature = "jemalloc", not(target_env = "msvc"))))]
#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator::new();

/// Work units simulated per non-analysis stage
const UNITS_PER_STAGE: usize = 4;

const ANALYZERS: [&str; 5] = ["meta_tags", "headings", "links", "images", "performance"];

/// Reusable scratch buffer for a fetched page
#[derive(Debug, Default)]
struct PageBuffer {
    html: String,
    links: Vec<String>,
}

impl Optimizable for PageBuffer {
    fn reset(&mut self) {
        self.html.clear();
        self.links.clear();
    }

    fn compact(&mut self) {
        self.html.shrink_to_fit();
        self.links.shrink_to_fit();
    }
}

struct Pipeline<'a> {
    url: String,
    limiter: &'a ResourceLimiter,
    profiler: &'a Profiler,
    optimizer: &'a MemoryOptimizer,
}

impl Pipeline<'_> {
    /// Wait out throttling, then check usage against thresholds
    async fn admit_unit(&self) -> CoreResult<()> {
        let waited = self.limiter.throttle_if_needed().await;
        if !waited.is_zero() {
            warn!(waited_ms = waited.as_millis() as u64, "Throttled before work unit");
        }
        let usage = self.limiter.monitor().get_current_usage()?;
        self.limiter.check_usage(usage.rss)?;
        Ok(())
    }

    fn simulate_page(&self, page: &mut Instance<PageBuffer>, unit: usize) {
        let _site = enter_site("simulate_page");
        page.html = format!("<html><title>{} #{}</title></html>", self.url, unit);
        page.links = (0..2_000).map(|i| format!("{}/page/{}", self.url, i)).collect();
    }

    async fn run(&self, tracker: &mut dyn Tracker) -> CoreResult<()> {
        let pages = self.optimizer.optimize_class(
            PageBuffer::default,
            Some(&[
                OptimizationStrategy::Pooling,
                OptimizationStrategy::Slots,
                OptimizationStrategy::GcOptimization,
            ]),
        );

        for stage in ProgressStage::ALL {
            let span = span_stage(tracker.name(), stage);
            tracker.set_stage(stage, 0.0)?;

            if stage == ProgressStage::Analysis {
                self.run_analysis(tracker).await?;
                span.record_items_processed(ANALYZERS.len());
                continue;
            }

            let _operation = self.optimizer.monitor_operation(stage.as_str());
            for unit in 1..=UNITS_PER_STAGE {
                self.admit_unit().await?;

                let mut page = pages.create();
                self.profiler.profile_fn(stage.as_str(), || {
                    self.simulate_page(&mut page, unit);
                });
                let report = self.optimizer.optimize_collections(&mut [&mut page.links]);
                if report.truncated > 0 {
                    info!(removed = report.items_removed, "Link list capped");
                }

                tracker.update_stage_progress(unit as f64 / UNITS_PER_STAGE as f64)?;
                tokio::task::yield_now().await;
            }
            span.record_items_processed(UNITS_PER_STAGE);
        }

        Ok(())
    }

    async fn run_analysis(&self, tracker: &mut dyn Tracker) -> CoreResult<()> {
        for step in 1..=4 {
            for (i, name) in ANALYZERS.iter().enumerate() {
                self.admit_unit().await?;

                let progress = (step as f64 * 0.25).min(1.0);
                let status = if progress >= 1.0 { "done" } else { "running" };
                if let Some(analyzer) = tracker.as_analyzer_mut() {
                    analyzer.set_analyzer_progress(name, progress, status)?;

                    let mut metrics = Metadata::new();
                    metrics.insert("checks_run".into(), json!(step * (i + 1)));
                    analyzer.set_analyzer_metrics(name, metrics)?;
                } else {
                    tracker.update_stage_progress(progress)?;
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());
    info!(url = %url, "SEO analyzer starting");

    let monitor = Arc::new(ResourceMonitor::new(MonitorConfig::from_env()));
    let limiter = ResourceLimiter::new(Arc::clone(&monitor), LimiterConfig::from_env());
    limiter
        .add_default_thresholds()
        .context("installing default memory thresholds")?;
    limiter.start().context("starting memory limiter")?;

    let profiler = Profiler::new(Arc::clone(&monitor), ProfilerConfig::from_env());
    let optimizer = MemoryOptimizer::new(Arc::clone(&monitor), OptimizationConfig::from_env());

    let mut tracker = create_tracker("analyzer", url.clone(), 100)?;
    tracker.start()?;

    let pipeline = Pipeline {
        url,
        limiter: &limiter,
        profiler: &profiler,
        optimizer: &optimizer,
    };

    match pipeline.run(tracker.as_mut()).await {
        Ok(()) => tracker.complete()?,
        Err(e) => {
            error!(error = %e, "Pipeline aborted");
            if tracker.state().is_active() {
                let reason = if e.is_limit_exceeded() {
                    format!("memory limit reached: {}", e)
                } else {
                    e.to_string()
                };
                tracker.fail(&reason)?;
            }
        }
    }

    limiter.stop();

    println!("{}", tracker.render(&TextRenderer::default()));
    if std::env::var("SEO_OUTPUT_JSON").is_ok_and(|v| v == "1") {
        println!("{}", tracker.render(&JsonRenderer { pretty: true }));
    }

    let summary = monitor.get_usage_summary();
    info!(
        peak_rss = summary.peak_rss,
        samples = summary.samples,
        profiles = profiler.results().len(),
        "Run finished"
    );
    for result in profiler.results().iter().rev().take(3) {
        info!(profile = %result, "Recent profile");
    }

    Ok(())
}
