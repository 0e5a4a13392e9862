/*!
 * Operation Monitoring
 * Scoped usage measurement around a unit of work
 */

use crate::core::guard::{Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
use crate::core::serde::duration_secs;
use crate::core::types::format_byte_delta;
use crate::memory::monitor::ResourceMonitor;
use crate::memory::types::{GcReport, ResourceUsageSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, Span};

/// Usage observed across a monitored operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSummary {
    pub name: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub before: Option<ResourceUsageSnapshot>,
    pub after: Option<ResourceUsageSnapshot>,
    /// Signed RSS change (zero when either reading failed)
    pub rss_delta: i64,
    pub gc: Option<GcReport>,
}

/// RAII guard returned by `MemoryOptimizer::monitor_operation`
///
/// Finalizes on [`finish`](Self::finish) or drop, whichever comes first.
pub struct OperationGuard {
    monitor: Arc<ResourceMonitor>,
    metadata: GuardMetadata,
    span: Span,
    before: Option<ResourceUsageSnapshot>,
    started: Instant,
    collect_on_exit: bool,
    summary: Option<OperationSummary>,
}

impl OperationGuard {
    pub(super) fn begin(monitor: Arc<ResourceMonitor>, name: &str, collect_on_exit: bool) -> Self {
        let span = tracing::info_span!("monitor_operation", operation = name);
        let before = monitor.get_current_usage().ok();

        Self {
            monitor,
            metadata: GuardMetadata::new("operation", name),
            span,
            before,
            started: Instant::now(),
            collect_on_exit,
            summary: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Baseline reading taken on entry
    pub fn baseline(&self) -> Option<&ResourceUsageSnapshot> {
        self.before.as_ref()
    }

    fn build_summary(&self) -> OperationSummary {
        let _entered = self.span.enter();
        let duration = self.started.elapsed();
        let gc = self
            .collect_on_exit
            .then(|| self.monitor.force_garbage_collection());
        let after = self.monitor.get_current_usage().ok();
        let rss_delta = match (&self.before, &after) {
            (Some(before), Some(after)) => after.rss_delta_since(before),
            _ => 0,
        };

        info!(
            operation = %self.metadata.name,
            duration_ms = duration.as_millis() as u64,
            rss_delta = %format_byte_delta(rss_delta),
            "Operation finished"
        );

        OperationSummary {
            name: self.metadata.name.clone(),
            duration,
            before: self.before.clone(),
            after,
            rss_delta,
            gc,
        }
    }

    fn finalize(&mut self) -> OperationSummary {
        match &self.summary {
            Some(summary) => summary.clone(),
            None => {
                let summary = self.build_summary();
                self.summary = Some(summary.clone());
                summary
            }
        }
    }

    /// Finalize now and return the summary
    pub fn finish(mut self) -> OperationSummary {
        self.finalize()
    }

    /// Summary, if already finalized
    pub fn summary(&self) -> Option<&OperationSummary> {
        self.summary.as_ref()
    }
}

impl Guard for OperationGuard {
    fn resource_type(&self) -> &'static str {
        "operation"
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn is_active(&self) -> bool {
        self.summary.is_none()
    }

    fn release(&mut self) -> GuardResult<()> {
        if self.summary.is_some() {
            return Err(GuardError::AlreadyReleased);
        }
        self.finalize();
        Ok(())
    }
}

impl GuardDrop for OperationGuard {}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.on_drop();
    }
}
