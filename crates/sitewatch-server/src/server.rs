//! Main sitewatch server implementation.

use crate::http_server::{AppState, HttpServer};
use crate::metrics::MetricsRegistry;
use crate::reporter::CycleReporter;
use crate::types::ServerConfig;
use sitewatch::{
    AuditCollector, AuditStore, CollectionScheduler, CycleReport, HttpLivenessProbe,
    MemoryAuditStore, PageSpeedClient, SqliteAuditStore, StaticDirectory, TlsCertificateInspector,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Sitewatch server
pub struct SitewatchServer {
    config: ServerConfig,
    directory: Arc<StaticDirectory>,
}

impl SitewatchServer {
    /// Create a new sitewatch server
    pub fn new(config: ServerConfig, directory: StaticDirectory) -> Self {
        Self {
            config,
            directory: Arc::new(directory),
        }
    }

    /// Open the configured audit store
    pub fn open_store(config: &ServerConfig) -> common::Result<Arc<dyn AuditStore>> {
        match &config.database_path {
            Some(path) => {
                info!(path = %path.display(), "Opening SQLite audit store");
                Ok(Arc::new(SqliteAuditStore::open(path)?))
            }
            None => {
                warn!("No storage path configured, audits are kept in memory");
                Ok(Arc::new(MemoryAuditStore::new()))
            }
        }
    }

    /// Run the server until a task exits or ctrl-c
    pub async fn run(self) -> anyhow::Result<()> {
        info!(resources = self.directory.len(), "Starting sitewatch server");

        let store = Self::open_store(&self.config)?;

        let collector = AuditCollector::new(
            Arc::new(HttpLivenessProbe::new(self.config.liveness_timeout)?),
            Arc::new(PageSpeedClient::new(
                self.config.pagespeed_endpoint.clone(),
                self.config.probe_timeout,
            )?),
            Arc::new(TlsCertificateInspector::new(self.config.liveness_timeout)?),
            store.clone(),
        )
        .with_retry(self.config.retry)
        .with_resource_pause(self.config.resource_pause);

        let metrics = Arc::new(MetricsRegistry::new());
        metrics.update_resource_count(self.directory.len());

        let (reports_tx, reports_rx) =
            mpsc::channel::<CycleReport>(self.config.report_channel_size);

        let scheduler = CollectionScheduler::new(
            Arc::new(collector),
            self.directory.clone(),
            self.directory.clone(),
            self.config.cycle_interval,
        )
        .with_reports(reports_tx);

        let reporter = CycleReporter::new(reports_rx, Some(metrics.clone()));

        let http = HttpServer::new(
            AppState {
                metrics,
                store,
                directory: self.directory.clone(),
                incident_policy: self.config.incident_policy,
                weights: self.config.weights,
            },
            self.config.listen_addr.clone(),
        );

        let http_handle = tokio::spawn(async move {
            if let Err(e) = http.run().await {
                warn!(error = %e, "HTTP server error");
            }
        });

        let reporter_handle = tokio::spawn(async move {
            reporter.run().await;
        });

        let scheduler_handle = scheduler.start();

        info!(
            interval_secs = self.config.cycle_interval.as_secs(),
            "All tasks spawned, server running"
        );

        tokio::select! {
            _ = http_handle => {
                info!("HTTP server task completed");
            }
            _ = reporter_handle => {
                info!("Reporter task completed");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutdown requested");
            }
        }

        scheduler.stop();
        if let Err(e) = scheduler_handle.await {
            warn!(error = %e, "Scheduler task failed");
        }

        info!("Sitewatch server stopped");
        Ok(())
    }
}
