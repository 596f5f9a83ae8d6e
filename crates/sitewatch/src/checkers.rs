//! Liveness probe implementations.

use crate::types::STATUS_UNREACHABLE;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of a single reachability request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessResult {
    /// HTTP status code, 0 when unreachable
    pub status_code: u16,

    /// Duration of the request
    pub duration: Duration,
}

impl LivenessResult {
    pub fn unreachable(duration: Duration) -> Self {
        Self {
            status_code: STATUS_UNREACHABLE,
            duration,
        }
    }
}

/// Lightweight reachability check
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probe `url` once. Never fails: errors map to status 0.
    async fn probe(&self, url: &str) -> LivenessResult;
}

/// HTTP liveness probe with a hard timeout
pub struct HttpLivenessProbe {
    timeout_duration: Duration,
    client: reqwest::Client,
}

impl HttpLivenessProbe {
    /// Create a new HTTP liveness probe
    pub fn new(timeout_duration: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .user_agent(concat!("sitewatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            timeout_duration,
            client,
        })
    }
}

#[async_trait]
impl LivenessProbe for HttpLivenessProbe {
    async fn probe(&self, url: &str) -> LivenessResult {
        let start = Instant::now();

        match timeout(self.timeout_duration, self.client.get(url).send()).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status_code = response.status().as_u16();
                debug!(url, status = status_code, duration_ms = duration.as_millis() as u64,
                       "Liveness probe answered");
                LivenessResult {
                    status_code,
                    duration,
                }
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                warn!(url, error = %e, "Liveness probe failed");
                LivenessResult::unreachable(duration)
            }
            Err(_) => {
                let duration = start.elapsed();
                warn!(url, "Liveness probe timed out");
                LivenessResult::unreachable(duration)
            }
        }
    }
}
