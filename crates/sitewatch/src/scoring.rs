//! Weighted health scoring over latest audits.
//!
//! A page's score is the weighted mean of the metrics present on its latest
//! audit. A resource's score is the plain mean over analyzed pages, so one
//! broken page drags the aggregate down no matter how many healthy pages
//! surround it.

use crate::store::AuditStore;
use crate::types::{Audit, Resource, is_failure_status};
use common::Result;
use serde::Serialize;

/// Metric weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricWeights {
    pub performance_mobile: f64,
    pub performance_desktop: f64,
    pub seo: f64,
    pub accessibility: f64,
    pub best_practices: f64,
}

pub const DEFAULT_WEIGHTS: MetricWeights = MetricWeights {
    performance_mobile: 3.0,
    performance_desktop: 2.0,
    seo: 1.0,
    accessibility: 1.0,
    best_practices: 1.0,
};

impl Default for MetricWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl MetricWeights {
    /// Weighted mean over present metrics, `None` when none is present
    pub fn weighted_mean(&self, audit: &Audit) -> Option<f64> {
        let metrics = [
            (audit.performance_mobile, self.performance_mobile),
            (audit.performance_desktop, self.performance_desktop),
            (audit.seo, self.seo),
            (audit.accessibility, self.accessibility),
            (audit.best_practices, self.best_practices),
        ];

        let (sum, weight) = metrics
            .iter()
            .filter_map(|(value, weight)| value.map(|v| (v * weight, *weight)))
            .fold((0.0, 0.0), |(sum, total), (v, w)| (sum + v, total + w));

        (weight > 0.0).then(|| sum / weight)
    }
}

/// Score of one page from its latest audit.
///
/// Failing pages (unreachable or HTTP error) score 0. A healthy audit with
/// no metric yields `None` and the page counts as not analyzed.
pub fn page_score(latest: &Audit, weights: &MetricWeights) -> Option<f64> {
    if is_failure_status(latest.status_code) {
        return Some(0.0);
    }
    weights.weighted_mean(latest)
}

/// Mean of the page scores of all analyzed pages
pub fn resource_score<'a>(
    latest_per_page: impl IntoIterator<Item = Option<&'a Audit>>,
    weights: &MetricWeights,
) -> Option<f64> {
    let scores: Vec<f64> = latest_per_page
        .into_iter()
        .flatten()
        .filter_map(|audit| page_score(audit, weights))
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// Round a score for display
pub fn display_score(score: Option<f64>) -> Option<u8> {
    score.map(|s| s.round().clamp(0.0, 100.0) as u8)
}

/// Health summary of a site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    /// Rounded score, `None` if no page was ever analyzed
    pub score: Option<u8>,
    pub exact: Option<f64>,
    pub analyzed_pages: usize,
    pub failing_pages: usize,
    pub total_pages: usize,
}

/// Score a site from the latest audit of the site itself and of each of its pages
pub async fn score_site(
    store: &dyn AuditStore,
    site: &Resource,
    pages: &[Resource],
    weights: &MetricWeights,
) -> Result<HealthScore> {
    let mut latest = Vec::with_capacity(pages.len() + 1);
    for resource in std::iter::once(site).chain(pages) {
        latest.push(store.latest(resource.id).await?);
    }

    let scored: Vec<&Audit> = latest
        .iter()
        .flatten()
        .filter(|audit| page_score(audit, weights).is_some())
        .collect();
    let exact = resource_score(latest.iter().map(Option::as_ref), weights);

    Ok(HealthScore {
        score: display_score(exact),
        exact,
        analyzed_pages: scored.len(),
        failing_pages: scored.iter().filter(|a| a.is_failure()).count(),
        total_pages: latest.len(),
    })
}
