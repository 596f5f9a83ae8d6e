//! Audit collection: probes one resource and persists at most one audit.

use crate::checkers::{LivenessProbe, LivenessResult};
use crate::directory::{CredentialResolver, ResourceDirectory};
use crate::pagespeed::{PerformanceProbe, ProbeError, ProbeReport, ProbeRequest, Strategy};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::ssl::{CertificateInspector, CertificateStatus};
use crate::store::AuditStore;
use crate::types::{
    Audit, NewAudit, Resource, ResourceId, ResourceKind, ServiceCredential, is_failure_status,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Mobile and desktop reports from one successful attempt
#[derive(Debug, Clone)]
pub struct ProbePair {
    pub mobile: ProbeReport,
    pub desktop: ProbeReport,
}

/// What to do when the performance probes exhausted their retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedAction {
    /// Resource reachable: write nothing, the last good audit stays authoritative
    Suppress,
    /// Resource unreachable or erroring: write the outage
    Record,
}

/// The single decision point for exhausted probes, keyed strictly on liveness.
pub fn exhausted_action(liveness_status: u16) -> ExhaustedAction {
    if is_failure_status(liveness_status) {
        ExhaustedAction::Record
    } else {
        ExhaustedAction::Suppress
    }
}

/// Result of collecting one resource
#[derive(Debug, Clone)]
pub enum Disposition {
    Recorded(Audit),
    Suppressed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub liveness_status: u16,
    pub probe_attempts: u32,
    pub disposition: Disposition,
}

impl CollectOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self.disposition, Disposition::Recorded(_))
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self.disposition, Disposition::Suppressed)
    }
}

/// Per-resource entry of a cycle report
#[derive(Debug, Clone)]
pub struct ResourceReport {
    pub resource_id: ResourceId,
    pub kind: ResourceKind,
    pub outcome: CollectOutcome,
}

/// Summary of one pass over the directory
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub entries: Vec<ResourceReport>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn recorded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_recorded()).count()
    }

    pub fn suppressed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_suppressed()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome.disposition, Disposition::Failed(_)))
            .count()
    }

    pub fn unreachable(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| is_failure_status(e.outcome.liveness_status))
            .count()
    }

    pub fn probe_attempts(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.outcome.probe_attempts)).sum()
    }
}

/// Orchestrates liveness, performance and certificate probes per resource
pub struct AuditCollector {
    liveness: Arc<dyn LivenessProbe>,
    performance: Arc<dyn PerformanceProbe>,
    certificates: Arc<dyn CertificateInspector>,
    store: Arc<dyn AuditStore>,
    retry: RetryPolicy,
    resource_pause: Duration,
}

impl AuditCollector {
    pub fn new(
        liveness: Arc<dyn LivenessProbe>,
        performance: Arc<dyn PerformanceProbe>,
        certificates: Arc<dyn CertificateInspector>,
        store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            liveness,
            performance,
            certificates,
            store,
            retry: RetryPolicy::default(),
            resource_pause: Duration::from_secs(2),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fixed pause between consecutive resources in a cycle
    pub fn with_resource_pause(mut self, pause: Duration) -> Self {
        self.resource_pause = pause;
        self
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Probe one resource and persist at most one audit.
    pub async fn collect(
        &self,
        resource: &Resource,
        credential: Option<&ServiceCredential>,
    ) -> CollectOutcome {
        let (liveness, probes, certificate) = tokio::join!(
            self.liveness.probe(&resource.url),
            self.run_probes(resource, credential),
            self.certificates.inspect(&resource.url),
        );
        let now = Utc::now();
        let probe_attempts = probes.attempts();
        let liveness_status = liveness.status_code;

        let reachable = !is_failure_status(liveness_status);
        if let Err(e) = self.store.set_reachable(resource.id, reachable).await {
            warn!(resource_id = resource.id, error = %e, "Failed to update reachability flag");
        }

        let audit = match probes {
            RetryOutcome::Success { value, .. } => {
                measured_audit(resource.id, &liveness, certificate, value, now)
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => match exhausted_action(liveness_status) {
                ExhaustedAction::Suppress => {
                    info!(
                        resource_id = resource.id,
                        url = %resource.url,
                        attempts,
                        error = %last_error,
                        "Audit service failing for reachable resource, keeping last known metrics"
                    );
                    return CollectOutcome {
                        liveness_status,
                        probe_attempts,
                        disposition: Disposition::Suppressed,
                    };
                }
                ExhaustedAction::Record => {
                    warn!(
                        resource_id = resource.id,
                        url = %resource.url,
                        status = liveness_status,
                        "Resource unreachable, recording outage"
                    );
                    outage_audit(resource.id, &liveness, certificate, &last_error, attempts, now)
                }
            },
        };

        let disposition = match self.store.insert(audit).await {
            Ok(audit) => {
                debug!(
                    resource_id = resource.id,
                    audit_id = audit.id,
                    status = audit.status_code,
                    "Audit recorded"
                );
                Disposition::Recorded(audit)
            }
            Err(e) => {
                warn!(resource_id = resource.id, error = %e, "Failed to persist audit");
                Disposition::Failed(e.to_string())
            }
        };

        CollectOutcome {
            liveness_status,
            probe_attempts,
            disposition,
        }
    }

    /// Mobile and desktop calls run concurrently within each attempt; the
    /// attempt fails if either fails.
    async fn run_probes(
        &self,
        resource: &Resource,
        credential: Option<&ServiceCredential>,
    ) -> RetryOutcome<ProbePair, ProbeError> {
        let mobile = ProbeRequest {
            url: resource.url.clone(),
            strategy: Strategy::Mobile,
            credential: credential.cloned(),
        };
        let desktop = ProbeRequest {
            strategy: Strategy::Desktop,
            ..mobile.clone()
        };

        let performance = &self.performance;
        let (mobile, desktop) = (&mobile, &desktop);

        self.retry
            .run(&resource.url, move |_| async move {
                let (mobile, desktop) = tokio::join!(performance.run(mobile), performance.run(desktop));
                Ok::<_, ProbeError>(ProbePair {
                    mobile: mobile?,
                    desktop: desktop?,
                })
            })
            .await
    }

    /// Collect every resource once: root sites first, then each site's pages.
    ///
    /// Resources are processed sequentially with a fixed pause between them.
    /// A failure on one resource never stops the cycle.
    pub async fn run_cycle(
        &self,
        directory: &dyn ResourceDirectory,
        credentials: &dyn CredentialResolver,
    ) -> CycleReport {
        let start = Instant::now();
        let sites = directory.sites().await;

        let mut resources = sites.clone();
        for site in &sites {
            resources.extend(directory.pages(site.id).await);
        }

        info!(resources = resources.len(), "Starting collection cycle");

        let mut report = CycleReport::default();
        for (index, resource) in resources.iter().enumerate() {
            if index > 0 && !self.resource_pause.is_zero() {
                tokio::time::sleep(self.resource_pause).await;
            }

            let credential = credentials.credential(resource).await;
            let outcome = self.collect(resource, credential.as_ref()).await;
            report.entries.push(ResourceReport {
                resource_id: resource.id,
                kind: resource.kind(),
                outcome,
            });
        }

        report.duration = start.elapsed();
        info!(
            recorded = report.recorded(),
            suppressed = report.suppressed(),
            failed = report.failed(),
            duration_ms = report.duration.as_millis() as u64,
            "Collection cycle finished"
        );
        report
    }
}

fn liveness_json(liveness: &LivenessResult) -> Value {
    json!({
        "status_code": liveness.status_code,
        "duration_ms": liveness.duration.as_millis() as u64,
    })
}

fn certificate_json(certificate: CertificateStatus) -> Value {
    match certificate {
        CertificateStatus::NotApplicable => json!({"status": "not_applicable"}),
        CertificateStatus::Unknown => json!({"status": "unknown"}),
        CertificateStatus::Expires(at) => json!({"status": "ok", "expires_at": at.to_rfc3339()}),
    }
}

fn measured_audit(
    resource_id: ResourceId,
    liveness: &LivenessResult,
    certificate: CertificateStatus,
    pair: ProbePair,
    now: DateTime<Utc>,
) -> NewAudit {
    let ProbePair { mobile, desktop } = pair;

    NewAudit {
        resource_id,
        created_at: now,
        status_code: liveness.status_code,
        https_valid: certificate.is_valid_at(now),
        ssl_expires_at: certificate.expires_at(),
        performance_mobile: mobile.performance,
        performance_desktop: desktop.performance,
        seo: mobile.seo.or(desktop.seo),
        accessibility: mobile.accessibility.or(desktop.accessibility),
        best_practices: mobile.best_practices.or(desktop.best_practices),
        ttfb_ms: mobile.ttfb_ms.or(desktop.ttfb_ms),
        raw_payload: json!({
            "liveness": liveness_json(liveness),
            "certificate": certificate_json(certificate),
            "mobile": mobile.diagnostics,
            "desktop": desktop.diagnostics,
        }),
        screenshot: mobile.screenshot.or(desktop.screenshot),
    }
}

fn outage_audit(
    resource_id: ResourceId,
    liveness: &LivenessResult,
    certificate: CertificateStatus,
    error: &ProbeError,
    attempts: u32,
    now: DateTime<Utc>,
) -> NewAudit {
    let mut audit = NewAudit::liveness_only(resource_id, liveness.status_code, now);
    audit.https_valid = certificate.is_valid_at(now);
    audit.ssl_expires_at = certificate.expires_at();
    audit.raw_payload = json!({
        "error": format!("resource unreachable and audit service failed: {}", error),
        "attempts": attempts,
        "liveness": liveness_json(liveness),
        "certificate": certificate_json(certificate),
    });
    audit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::MockLivenessProbe;
    use crate::directory::StaticDirectory;
    use crate::pagespeed::MockPerformanceProbe;
    use crate::ssl::MockCertificateInspector;
    use crate::store::MemoryAuditStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use common::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn report(strategy: Strategy) -> ProbeReport {
        let performance = match strategy {
            Strategy::Mobile => 72.0,
            Strategy::Desktop => 95.0,
        };
        ProbeReport {
            strategy,
            performance: Some(performance),
            seo: Some(100.0),
            accessibility: Some(90.0),
            best_practices: Some(80.0),
            ttfb_ms: Some(180.0),
            screenshot: Some("data:image/jpeg;base64,AAAA".to_string()),
            diagnostics: json!({"strategy": strategy.as_str()}),
        }
    }

    fn liveness(status_code: u16) -> Arc<dyn LivenessProbe> {
        let mut probe = MockLivenessProbe::new();
        probe.expect_probe().returning(move |_| LivenessResult {
            status_code,
            duration: Duration::from_millis(40),
        });
        Arc::new(probe)
    }

    fn certificates(status: CertificateStatus) -> Arc<dyn CertificateInspector> {
        let mut inspector = MockCertificateInspector::new();
        inspector.expect_inspect().returning(move |_| status);
        Arc::new(inspector)
    }

    /// Performance probe failing the first `failures` calls
    fn flaky_performance(failures: usize, expected_calls: usize) -> Arc<dyn PerformanceProbe> {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut probe = MockPerformanceProbe::new();
        probe
            .expect_run()
            .times(expected_calls)
            .returning(move |request| {
                if calls.fetch_add(1, Ordering::SeqCst) < failures {
                    Err(ProbeError::Quota("rateLimitExceeded".to_string()))
                } else {
                    Ok(report(request.strategy))
                }
            });
        Arc::new(probe)
    }

    fn collector(
        liveness: Arc<dyn LivenessProbe>,
        performance: Arc<dyn PerformanceProbe>,
        certificates: Arc<dyn CertificateInspector>,
        store: Arc<MemoryAuditStore>,
    ) -> AuditCollector {
        AuditCollector::new(liveness, performance, certificates, store)
            .with_retry(RetryPolicy::new(3, Duration::from_secs(1)))
            .with_resource_pause(Duration::from_secs(2))
    }

    fn site() -> Resource {
        Resource::site(1, "Example", "https://example.test/")
    }

    #[test]
    fn test_exhausted_action_keys_on_liveness() {
        assert_eq!(exhausted_action(200), ExhaustedAction::Suppress);
        assert_eq!(exhausted_action(301), ExhaustedAction::Suppress);
        assert_eq!(exhausted_action(0), ExhaustedAction::Record);
        assert_eq!(exhausted_action(404), ExhaustedAction::Record);
        assert_eq!(exhausted_action(502), ExhaustedAction::Record);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_writes_single_audit() {
        let store = Arc::new(MemoryAuditStore::new());
        let expires = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        let collector = collector(
            liveness(200),
            // attempts 1 and 2 fail (two calls each), attempt 3 succeeds
            flaky_performance(4, 6),
            certificates(CertificateStatus::Expires(expires)),
            store.clone(),
        );

        let outcome = collector.collect(&site(), None).await;

        assert_eq!(outcome.probe_attempts, 3);
        assert_eq!(store.len(), 1);
        let Disposition::Recorded(audit) = outcome.disposition else {
            panic!("expected a recorded audit");
        };
        assert_eq!(audit.status_code, 200);
        assert_eq!(audit.performance_mobile, Some(72.0));
        assert_eq!(audit.performance_desktop, Some(95.0));
        assert_eq!(audit.seo, Some(100.0));
        assert_eq!(audit.ttfb_ms, Some(180.0));
        assert!(audit.https_valid);
        assert_eq!(audit.ssl_expires_at, Some(expires));
        assert_eq!(audit.raw_payload["desktop"]["strategy"], "desktop");
        assert_eq!(store.latest(1).await.unwrap().unwrap(), audit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_resource_with_failing_service_is_suppressed() {
        let store = Arc::new(MemoryAuditStore::new());
        let previous = store
            .insert(NewAudit::liveness_only(1, 200, Utc::now() - chrono::Duration::days(1)))
            .await
            .unwrap();
        let collector = collector(
            liveness(200),
            flaky_performance(usize::MAX, 6),
            certificates(CertificateStatus::NotApplicable),
            store.clone(),
        );

        let outcome = collector.collect(&site(), None).await;

        assert!(outcome.is_suppressed());
        assert_eq!(outcome.probe_attempts, 3);
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest(1).await.unwrap().unwrap(), previous);
        assert_eq!(store.reachable(1).await.unwrap(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_resource_with_failing_service_is_recorded() {
        let store = Arc::new(MemoryAuditStore::new());
        let collector = collector(
            liveness(0),
            flaky_performance(usize::MAX, 6),
            certificates(CertificateStatus::Unknown),
            store.clone(),
        );

        let outcome = collector.collect(&site(), None).await;

        let Disposition::Recorded(audit) = outcome.disposition else {
            panic!("expected the outage to be recorded");
        };
        assert_eq!(audit.status_code, 0);
        assert_eq!(audit.performance_mobile, None);
        assert_eq!(audit.raw_payload["attempts"], 3);
        assert!(audit.raw_payload["error"].as_str().unwrap().contains("quota exceeded"));
        assert!(!audit.https_valid);
        assert_eq!(store.len(), 1);
        assert_eq!(store.reachable(1).await.unwrap(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_error_with_failing_service_is_recorded() {
        let store = Arc::new(MemoryAuditStore::new());
        let collector = collector(
            liveness(503),
            flaky_performance(usize::MAX, 6),
            certificates(CertificateStatus::Unknown),
            store.clone(),
        );

        let outcome = collector.collect(&site(), None).await;
        assert!(outcome.is_recorded());
        assert_eq!(store.latest(1).await.unwrap().unwrap().status_code, 503);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_http_has_no_certificate_data() {
        let store = Arc::new(MemoryAuditStore::new());
        let collector = collector(
            liveness(200),
            flaky_performance(0, 2),
            certificates(CertificateStatus::NotApplicable),
            store.clone(),
        );

        let resource = Resource::site(9, "Plain", "http://plain.test/");
        let outcome = collector.collect(&resource, None).await;

        let Disposition::Recorded(audit) = outcome.disposition else {
            panic!("expected a recorded audit");
        };
        assert_eq!(audit.ssl_expires_at, None);
        assert!(!audit.https_valid);
        assert_eq!(audit.status_code, 200);
        assert_eq!(audit.performance_mobile, Some(72.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_is_passed_to_service() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut performance = MockPerformanceProbe::new();
        performance
            .expect_run()
            .withf(|request| {
                request.credential.as_ref().map(|c| c.api_key.as_str()) == Some("tenant-key")
            })
            .times(2)
            .returning(|request| Ok(report(request.strategy)));

        let collector = collector(
            liveness(200),
            Arc::new(performance),
            certificates(CertificateStatus::NotApplicable),
            store,
        );
        let credential = ServiceCredential {
            api_key: "tenant-key".to_string(),
        };

        assert!(collector.collect(&site(), Some(&credential)).await.is_recorded());
    }

    struct FailingStore;

    #[async_trait]
    impl AuditStore for FailingStore {
        async fn insert(&self, _audit: NewAudit) -> common::Result<Audit> {
            Err(Error::storage("database is locked"))
        }

        async fn latest(&self, _resource_id: ResourceId) -> common::Result<Option<Audit>> {
            Ok(None)
        }

        async fn history(
            &self,
            _resource_id: ResourceId,
            _since: Option<DateTime<Utc>>,
        ) -> common::Result<Vec<Audit>> {
            Ok(Vec::new())
        }

        async fn set_reachable(&self, _resource_id: ResourceId, _reachable: bool) -> common::Result<()> {
            Err(Error::storage("database is locked"))
        }

        async fn reachable(&self, _resource_id: ResourceId) -> common::Result<Option<bool>> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_is_reported_not_raised() {
        let collector = AuditCollector::new(
            liveness(200),
            flaky_performance(0, 2),
            certificates(CertificateStatus::NotApplicable),
            Arc::new(FailingStore),
        );

        let outcome = collector.collect(&site(), None).await;
        assert!(matches!(outcome.disposition, Disposition::Failed(ref e) if e.contains("locked")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_visits_sites_then_pages_with_pause() {
        let store = Arc::new(MemoryAuditStore::new());
        let directory = StaticDirectory::new()
            .with_tenant("acme", None)
            .with_resource("acme", Resource::site(1, "A", "https://a.test/"))
            .with_resource("acme", Resource::page(2, 1, "A pricing", "https://a.test/pricing"))
            .with_resource("acme", Resource::site(3, "B", "https://b.test/"));

        let collector = collector(
            liveness(200),
            flaky_performance(0, 6),
            certificates(CertificateStatus::NotApplicable),
            store.clone(),
        );

        let start = tokio::time::Instant::now();
        let report = collector.run_cycle(&directory, &directory).await;

        let order: Vec<_> = report.entries.iter().map(|e| e.resource_id).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(report.entries[2].kind, ResourceKind::Page);
        assert_eq!(report.recorded(), 3);
        assert_eq!(report.probe_attempts(), 3);
        assert_eq!(store.len(), 3);
        // Two pauses between three resources
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_continues_after_failures() {
        let directory = StaticDirectory::new()
            .with_resource("acme", Resource::site(1, "A", "https://a.test/"))
            .with_resource("acme", Resource::site(2, "B", "https://b.test/"));

        let collector = AuditCollector::new(
            liveness(200),
            flaky_performance(0, 4),
            certificates(CertificateStatus::NotApplicable),
            Arc::new(FailingStore),
        )
        .with_resource_pause(Duration::ZERO);

        let report = collector.run_cycle(&directory, &directory).await;
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.unreachable(), 0);
    }
}
