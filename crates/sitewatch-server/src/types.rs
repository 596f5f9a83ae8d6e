//! Types for the sitewatch server.

use sitewatch::{IncidentPolicy, MetricWeights, RetryPolicy, pagespeed::DEFAULT_ENDPOINT};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address of the metrics and views HTTP server
    pub listen_addr: String,

    /// Interval between collection cycles
    pub cycle_interval: Duration,

    /// Pause between resources within a cycle
    pub resource_pause: Duration,

    /// Hard timeout of the liveness probe
    pub liveness_timeout: Duration,

    /// Timeout of one performance probe attempt
    pub probe_timeout: Duration,

    /// Retry bound and backoff of the performance probes
    pub retry: RetryPolicy,

    /// Audit service endpoint
    pub pagespeed_endpoint: String,

    /// SQLite database file; audits are kept in memory without one
    pub database_path: Option<PathBuf>,

    /// Incident view window and cap
    pub incident_policy: IncidentPolicy,

    /// Health score weights
    pub weights: MetricWeights,

    /// Cycle report channel buffer size
    pub report_channel_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9180".to_string(),
            cycle_interval: Duration::from_secs(24 * 60 * 60),
            resource_pause: Duration::from_secs(2),
            liveness_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            pagespeed_endpoint: DEFAULT_ENDPOINT.to_string(),
            database_path: None,
            incident_policy: IncidentPolicy::default(),
            weights: MetricWeights::default(),
            report_channel_size: 16,
        }
    }
}
