//! Prometheus metrics for the sitewatch server.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use sitewatch::{CycleReport, Disposition, ResourceKind};

/// Labels for per-kind metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    /// Resource kind (site, page)
    pub kind: String,
}

impl KindLabels {
    fn of(kind: ResourceKind) -> Self {
        Self {
            kind: kind.to_string(),
        }
    }
}

/// Metrics registry with all sitewatch server metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Audits written
    audits_recorded_total: Family<KindLabels, Counter>,
    /// Resources skipped because the audit service failed while they were up
    audits_suppressed_total: Family<KindLabels, Counter>,
    /// Resources abandoned on a persistence failure
    collect_failures_total: Family<KindLabels, Counter>,
    /// Performance probe attempts, retries included
    probe_attempts_total: Counter,
    /// Completed collection cycles
    cycles_total: Counter,
    /// Collection cycle duration
    cycle_duration_seconds: Histogram,
    /// Resources in the directory
    resources_monitored: Gauge,
    /// Resources whose last liveness probe failed
    resources_unreachable: Gauge,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // Counters get their `_total` suffix from the encoder

        let audits_recorded_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "sitewatch_audits_recorded",
            "Total audits written",
            audits_recorded_total.clone(),
        );

        let audits_suppressed_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "sitewatch_audits_suppressed",
            "Total audits suppressed after the audit service exhausted its retries",
            audits_suppressed_total.clone(),
        );

        let collect_failures_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "sitewatch_collect_failures",
            "Total resources abandoned because the audit could not be persisted",
            collect_failures_total.clone(),
        );

        let probe_attempts_total = Counter::default();
        registry.register(
            "sitewatch_probe_attempts",
            "Total performance probe attempts",
            probe_attempts_total.clone(),
        );

        let cycles_total = Counter::default();
        registry.register(
            "sitewatch_cycles",
            "Total completed collection cycles",
            cycles_total.clone(),
        );

        // 1s to ~4.5h
        let cycle_duration_seconds = Histogram::new(exponential_buckets(1.0, 2.0, 15));
        registry.register(
            "sitewatch_cycle_duration_seconds",
            "Collection cycle duration in seconds",
            cycle_duration_seconds.clone(),
        );

        let resources_monitored = Gauge::default();
        registry.register(
            "sitewatch_resources_monitored",
            "Number of monitored resources",
            resources_monitored.clone(),
        );

        let resources_unreachable = Gauge::default();
        registry.register(
            "sitewatch_resources_unreachable",
            "Resources that failed their liveness probe in the last cycle",
            resources_unreachable.clone(),
        );

        Self {
            registry,
            audits_recorded_total,
            audits_suppressed_total,
            collect_failures_total,
            probe_attempts_total,
            cycles_total,
            cycle_duration_seconds,
            resources_monitored,
            resources_unreachable,
        }
    }

    /// Record the outcome of a collection cycle
    pub fn record_cycle(&self, report: &CycleReport) {
        for entry in &report.entries {
            let labels = KindLabels::of(entry.kind);
            let family = match entry.outcome.disposition {
                Disposition::Recorded(_) => &self.audits_recorded_total,
                Disposition::Suppressed => &self.audits_suppressed_total,
                Disposition::Failed(_) => &self.collect_failures_total,
            };
            family.get_or_create(&labels).inc();
        }

        self.probe_attempts_total.inc_by(report.probe_attempts());
        self.cycles_total.inc();
        self.cycle_duration_seconds
            .observe(report.duration.as_secs_f64());
        self.resources_unreachable.set(report.unreachable() as i64);
    }

    /// Update monitored resource count
    pub fn update_resource_count(&self, count: usize) {
        self.resources_monitored.set(count as i64);
    }

    /// Audits recorded so far for a kind
    pub fn recorded(&self, kind: ResourceKind) -> u64 {
        self.audits_recorded_total.get_or_create(&KindLabels::of(kind)).get()
    }

    /// Audits suppressed so far for a kind
    pub fn suppressed(&self, kind: ResourceKind) -> u64 {
        self.audits_suppressed_total.get_or_create(&KindLabels::of(kind)).get()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles_total.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use prometheus_client::encoding::text::encode;
    use sitewatch::collector::ResourceReport;
    use sitewatch::{CollectOutcome, NewAudit};
    use std::time::Duration;

    fn entry(id: i64, kind: ResourceKind, liveness_status: u16, disposition: Disposition) -> ResourceReport {
        ResourceReport {
            resource_id: id,
            kind,
            outcome: CollectOutcome {
                liveness_status,
                probe_attempts: 2,
                disposition,
            },
        }
    }

    fn report() -> CycleReport {
        let audit = NewAudit::liveness_only(1, 200, Utc::now()).into_audit(1);
        CycleReport {
            entries: vec![
                entry(1, ResourceKind::Site, 200, Disposition::Recorded(audit)),
                entry(2, ResourceKind::Page, 200, Disposition::Suppressed),
                entry(3, ResourceKind::Page, 0, Disposition::Failed("disk full".to_string())),
            ],
            duration: Duration::from_secs(42),
        }
    }

    #[test]
    fn test_record_cycle() {
        let metrics = MetricsRegistry::new();
        metrics.record_cycle(&report());
        metrics.record_cycle(&report());

        assert_eq!(metrics.recorded(ResourceKind::Site), 2);
        assert_eq!(metrics.recorded(ResourceKind::Page), 0);
        assert_eq!(metrics.suppressed(ResourceKind::Page), 2);
        assert_eq!(metrics.cycles(), 2);
        assert_eq!(metrics.probe_attempts_total.get(), 12);
        assert_eq!(metrics.resources_unreachable.get(), 1);
    }

    #[test]
    fn test_encode() {
        let metrics = MetricsRegistry::new();
        metrics.update_resource_count(3);
        metrics.record_cycle(&report());

        let mut buffer = String::new();
        encode(&mut buffer, &metrics.registry).unwrap();

        assert!(buffer.contains("sitewatch_audits_recorded_total{kind=\"site\"} 1"));
        assert!(buffer.contains("sitewatch_audits_suppressed_total{kind=\"page\"} 1"));
        assert!(buffer.contains("sitewatch_collect_failures_total{kind=\"page\"} 1"));
        assert!(buffer.contains("sitewatch_probe_attempts_total 6"));
        assert!(buffer.contains("sitewatch_cycles_total 1"));
        assert!(buffer.contains("sitewatch_resources_monitored 3"));
        assert!(buffer.contains("sitewatch_cycle_duration_seconds_count 1"));
        assert!(!buffer.contains("_total_total"));
    }
}
