//! Consumes cycle reports: updates metrics and logs a summary per cycle.

use crate::metrics::MetricsRegistry;
use sitewatch::{CycleReport, Disposition};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Cycle reporter
pub struct CycleReporter {
    /// Cycle report receiver
    reports_rx: mpsc::Receiver<CycleReport>,

    /// Metrics registry (optional)
    metrics: Option<Arc<MetricsRegistry>>,
}

impl CycleReporter {
    pub fn new(reports_rx: mpsc::Receiver<CycleReport>, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self { reports_rx, metrics }
    }

    /// Run until every sender is gone. Returns the number of reports handled.
    pub async fn run(mut self) -> usize {
        info!("Cycle reporter started");

        let mut handled = 0;
        while let Some(report) = self.reports_rx.recv().await {
            self.handle(&report);
            handled += 1;
        }

        info!(cycles = handled, "Cycle reporter stopped");
        handled
    }

    fn handle(&self, report: &CycleReport) {
        if let Some(ref m) = self.metrics {
            m.record_cycle(report);
        }

        for entry in &report.entries {
            match &entry.outcome.disposition {
                Disposition::Failed(reason) => {
                    warn!(
                        resource_id = entry.resource_id,
                        kind = %entry.kind,
                        reason = %reason,
                        "Audit could not be persisted"
                    );
                }
                Disposition::Suppressed => {
                    debug!(
                        resource_id = entry.resource_id,
                        attempts = entry.outcome.probe_attempts,
                        "Audit suppressed"
                    );
                }
                Disposition::Recorded(_) => {}
            }
        }

        info!(
            resources = report.entries.len(),
            recorded = report.recorded(),
            suppressed = report.suppressed(),
            failed = report.failed(),
            unreachable = report.unreachable(),
            probe_attempts = report.probe_attempts(),
            duration_ms = report.duration.as_millis() as u64,
            "Collection cycle complete"
        );
    }
}
