/*!
 * Structured Tracing
 * Subscriber setup and pipeline stage spans using the tracing crate
 *
 * Features:
 * - Env-filtered output (`RUST_LOG`, default `info`)
 * - JSON-formatted logs for structured parsing (`SEO_TRACE_JSON`)
 * - Trace IDs for correlating a stage's log lines
 */

use crate::progress::ProgressStage;
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Stages slower than this log a warning on close
pub const SLOW_STAGE: Duration = Duration::from_secs(30);

fn json_requested() -> bool {
    std::env::var("SEO_TRACE_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - SEO_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = json_requested(), "Structured tracing initialized");
    }
    installed
}

/// Generate a unique trace ID for log correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one pipeline stage of a tracked run
pub struct StageSpan {
    span: Span,
    start: Instant,
    stage: ProgressStage,
    trace_id: String,
}

impl StageSpan {
    pub fn new(tracker: &str, stage: ProgressStage) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::INFO,
            "stage",
            trace_id = %trace_id,
            tracker = tracker,
            stage = stage.as_str(),
            duration_ms = tracing::field::Empty,
            items_processed = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        let _entered = span.enter();
        debug!(tracker, stage = %stage, "stage started");
        drop(_entered);

        Self {
            span,
            start: Instant::now(),
            stage,
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn stage(&self) -> ProgressStage {
        self.stage
    }

    pub fn record_items_processed(&self, count: usize) {
        self.span.record("items_processed", count);
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Clone of the underlying span, for instrumenting futures
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Drop for StageSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_ms", duration.as_millis() as u64);

        if duration > SLOW_STAGE {
            warn!(
                trace_id = %self.trace_id,
                stage = %self.stage,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow stage detected"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                stage = %self.stage,
                duration_ms = duration.as_millis() as u64,
                "stage completed"
            );
        }
    }
}

/// Helper to open a stage span
#[inline]
pub fn span_stage(tracker: &str, stage: ProgressStage) -> StageSpan {
    StageSpan::new(tracker, stage)
}
