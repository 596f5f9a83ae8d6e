//! Periodic collection cycles.

use crate::collector::{AuditCollector, CycleReport};
use crate::directory::{CredentialResolver, ResourceDirectory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

/// Runs one collection cycle per interval until stopped
pub struct CollectionScheduler {
    collector: Arc<AuditCollector>,
    directory: Arc<dyn ResourceDirectory>,
    credentials: Arc<dyn CredentialResolver>,
    interval: Duration,
    last_report: Arc<RwLock<Option<CycleReport>>>,
    reports_tx: Option<mpsc::Sender<CycleReport>>,
    stop_signal: Arc<Notify>,
}

impl CollectionScheduler {
    pub fn new(
        collector: Arc<AuditCollector>,
        directory: Arc<dyn ResourceDirectory>,
        credentials: Arc<dyn CredentialResolver>,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            directory,
            credentials,
            interval,
            last_report: Arc::new(RwLock::new(None)),
            reports_tx: None,
            stop_signal: Arc::new(Notify::new()),
        }
    }

    /// Publish every cycle report on `tx`
    pub fn with_reports(mut self, tx: mpsc::Sender<CycleReport>) -> Self {
        self.reports_tx = Some(tx);
        self
    }

    /// Start cycling in the background. The first cycle runs immediately.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let collector = self.collector.clone();
        let directory = self.directory.clone();
        let credentials = self.credentials.clone();
        let last_report = self.last_report.clone();
        let reports_tx = self.reports_tx.clone();
        let stop_signal = self.stop_signal.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = collector
                            .run_cycle(directory.as_ref(), credentials.as_ref())
                            .await;

                        if let Some(tx) = &reports_tx {
                            if let Err(e) = tx.send(report.clone()).await {
                                warn!(error = %e, "Failed to publish cycle report");
                            }
                        }
                        *last_report.write().await = Some(report);
                    }
                    _ = stop_signal.notified() => {
                        info!("Collection scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Stop cycling after the current cycle
    pub fn stop(&self) {
        self.stop_signal.notify_one();
    }

    /// Report of the last completed cycle
    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::MockLivenessProbe;
    use crate::checkers::LivenessResult;
    use crate::directory::StaticDirectory;
    use crate::pagespeed::{MockPerformanceProbe, ProbeError};
    use crate::ssl::{CertificateStatus, MockCertificateInspector};
    use crate::store::MemoryAuditStore;
    use crate::types::Resource;

    fn scheduler(store: Arc<MemoryAuditStore>) -> CollectionScheduler {
        let mut liveness = MockLivenessProbe::new();
        liveness.expect_probe().returning(|_| LivenessResult::unreachable(Duration::ZERO));
        let mut performance = MockPerformanceProbe::new();
        performance
            .expect_run()
            .returning(|_| Err(ProbeError::Transport("connection refused".to_string())));
        let mut certificates = MockCertificateInspector::new();
        certificates
            .expect_inspect()
            .returning(|_| CertificateStatus::NotApplicable);

        let collector = AuditCollector::new(
            Arc::new(liveness),
            Arc::new(performance),
            Arc::new(certificates),
            store,
        )
        .with_retry(crate::retry::RetryPolicy::new(1, Duration::ZERO));

        let directory = Arc::new(
            StaticDirectory::new().with_resource("t", Resource::site(1, "Down", "http://down.test/")),
        );

        CollectionScheduler::new(
            Arc::new(collector),
            directory.clone(),
            directory,
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_publishes_reports() {
        let store = Arc::new(MemoryAuditStore::new());
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = scheduler(store.clone()).with_reports(tx);

        let handle = scheduler.start();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.recorded(), 1);
        assert_eq!(first.unreachable(), 1);

        // Second tick one interval later
        let second = rx.recv().await.unwrap();
        assert_eq!(second.recorded(), 1);
        assert_eq!(store.len(), 2);

        scheduler.stop();
        handle.await.unwrap();
        assert!(scheduler.last_report().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_without_reports_channel() {
        let store = Arc::new(MemoryAuditStore::new());
        let scheduler = scheduler(store);

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop();
        handle.await.unwrap();

        assert_eq!(scheduler.last_report().await.unwrap().entries.len(), 1);
    }
}
