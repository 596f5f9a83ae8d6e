//! Performance probe against the external audit service.
//!
//! The service follows the PageSpeed Insights v5 contract: one request per
//! URL and strategy, category scores in `[0, 1]` under
//! `lighthouseResult.categories`, timing entries under
//! `lighthouseResult.audits`.

use crate::types::ServiceCredential;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default public endpoint of the audit service
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

/// Categories requested on every call
const CATEGORIES: [&str; 4] = ["performance", "seo", "accessibility", "best-practices"];

/// Timing entries copied into the diagnostic payload
const TIMING_AUDITS: [&str; 7] = [
    "server-response-time",
    "first-contentful-paint",
    "largest-contentful-paint",
    "total-blocking-time",
    "cumulative-layout-shift",
    "speed-index",
    "interactive",
];

/// Error reasons the service uses for quota exhaustion
const QUOTA_REASONS: [&str; 4] = [
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "quotaExceeded",
];

/// Measurement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Mobile,
    Desktop,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Mobile => "mobile",
            Strategy::Desktop => "desktop",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit service failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("service returned HTTP {0}")]
    Http(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProbeError::Timeout
        } else if e.is_decode() {
            ProbeError::Malformed(e.to_string())
        } else {
            ProbeError::Transport(e.to_string())
        }
    }
}

/// One performance-probe call
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub url: String,
    pub strategy: Strategy,
    pub credential: Option<ServiceCredential>,
}

/// Parsed result of one performance-probe call. Scores are on a 0-100 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub strategy: Strategy,
    pub performance: Option<f64>,
    pub seo: Option<f64>,
    pub accessibility: Option<f64>,
    pub best_practices: Option<f64>,
    pub ttfb_ms: Option<f64>,
    pub screenshot: Option<String>,

    /// Trimmed diagnostic payload
    pub diagnostics: Value,
}

/// Deep performance measurement
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PerformanceProbe: Send + Sync {
    async fn run(&self, request: &ProbeRequest) -> Result<ProbeReport, ProbeError>;
}

/// HTTP client for the audit service
pub struct PageSpeedClient {
    endpoint: String,
    client: reqwest::Client,
}

impl PageSpeedClient {
    /// Create a new client. `attempt_timeout` bounds each call.
    pub fn new(endpoint: impl Into<String>, attempt_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(attempt_timeout).build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    fn query(request: &ProbeRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("url", request.url.clone()),
            ("strategy", request.strategy.as_str().to_string()),
        ];
        query.extend(CATEGORIES.iter().map(|c| ("category", c.to_string())));
        if let Some(credential) = &request.credential {
            query.push(("key", credential.api_key.clone()));
        }
        query
    }
}

#[async_trait]
impl PerformanceProbe for PageSpeedClient {
    async fn run(&self, request: &ProbeRequest) -> Result<ProbeReport, ProbeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&Self::query(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = classify_error(status.as_u16(), &body);
            warn!(url = %request.url, strategy = %request.strategy, error = %err, "Audit service call failed");
            return Err(err);
        }

        let payload: Value =
            serde_json::from_str(&body).map_err(|e| ProbeError::Malformed(e.to_string()))?;
        let report = parse_report(request.strategy, &payload)?;
        debug!(
            url = %request.url,
            strategy = %request.strategy,
            performance = ?report.performance,
            "Audit service call succeeded"
        );
        Ok(report)
    }
}

/// Map a non-success response to a probe error
pub fn classify_error(status: u16, body: &str) -> ProbeError {
    if status == 429 {
        return ProbeError::Quota(format!("HTTP {}", status));
    }

    let reason = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/error/errors/0/reason")
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match reason {
        Some(reason) if QUOTA_REASONS.contains(&reason.as_str()) => ProbeError::Quota(reason),
        _ => ProbeError::Http(status),
    }
}

fn category_score(lighthouse: &Value, name: &str) -> Option<f64> {
    lighthouse
        .get("categories")?
        .get(name)?
        .get("score")?
        .as_f64()
        .map(|score| (score * 100.0).round())
}

/// Parse a successful service payload
pub fn parse_report(strategy: Strategy, payload: &Value) -> Result<ProbeReport, ProbeError> {
    let lighthouse = payload
        .get("lighthouseResult")
        .filter(|v| v.is_object())
        .ok_or_else(|| ProbeError::Malformed("missing lighthouseResult".to_string()))?;

    let categories = lighthouse.get("categories").and_then(Value::as_object);
    if categories.is_none_or(|c| c.is_empty()) {
        return Err(ProbeError::Malformed("no category scores".to_string()));
    }

    let audits = lighthouse.get("audits");
    let ttfb_ms = audits
        .and_then(|a| a.pointer("/server-response-time/numericValue"))
        .and_then(Value::as_f64);
    let screenshot = audits
        .and_then(|a| a.pointer("/final-screenshot/details/data"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut timings = serde_json::Map::new();
    if let Some(audits) = audits {
        for name in TIMING_AUDITS {
            if let Some(value) = audits.get(name).and_then(|a| a.get("numericValue")) {
                timings.insert(name.to_string(), value.clone());
            }
        }
    }

    let diagnostics = json!({
        "strategy": strategy.as_str(),
        "final_url": lighthouse.get("finalUrl").cloned().unwrap_or(Value::Null),
        "fetch_time": lighthouse.get("fetchTime").cloned().unwrap_or(Value::Null),
        "timings": timings,
    });

    Ok(ProbeReport {
        strategy,
        performance: category_score(lighthouse, "performance"),
        seo: category_score(lighthouse, "seo"),
        accessibility: category_score(lighthouse, "accessibility"),
        best_practices: category_score(lighthouse, "best-practices"),
        ttfb_ms,
        screenshot,
        diagnostics,
    })
}
