//! Read-only views derived from the audit log.

use chrono::{DateTime, Days, Utc};
use common::Result;
use serde::Serialize;
use sitewatch::scoring::score_site;
use sitewatch::uptime::{self, HISTORY_DAYS};
use sitewatch::{
    Audit, AuditStore, HealthScore, IncidentPolicy, IncidentReport, MetricWeights, Resource,
    ResourceAudits, ResourceDirectory, ResourceId, ResourceKind, UptimeDay, incidents,
};

/// Health of one resource. Sites are scored over themselves and their pages.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub resource: Resource,
    pub reachable: Option<bool>,
    pub latest: Option<Audit>,
    #[serde(flatten)]
    pub health: HealthScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeView {
    pub resource_id: ResourceId,
    pub days: Vec<UptimeDay>,
    pub uptime_ratio: Option<f64>,
}

/// `None` when the resource is unknown
pub async fn health_view(
    store: &dyn AuditStore,
    directory: &dyn ResourceDirectory,
    id: ResourceId,
    weights: &MetricWeights,
) -> Result<Option<HealthView>> {
    let Some(resource) = directory.resource(id).await else {
        return Ok(None);
    };

    let pages = match resource.kind() {
        ResourceKind::Site => directory.pages(id).await,
        ResourceKind::Page => Vec::new(),
    };

    let health = score_site(store, &resource, &pages, weights).await?;
    let latest = store.latest(id).await?;
    let reachable = store.reachable(id).await?;

    Ok(Some(HealthView {
        resource,
        reachable,
        latest,
        health,
    }))
}

/// 60-day timeline ending today, `None` when the resource is unknown
pub async fn uptime_view(
    store: &dyn AuditStore,
    directory: &dyn ResourceDirectory,
    id: ResourceId,
    now: DateTime<Utc>,
) -> Result<Option<UptimeView>> {
    if directory.resource(id).await.is_none() {
        return Ok(None);
    }

    let since = now
        .date_naive()
        .checked_sub_days(Days::new(HISTORY_DAYS as u64))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc());
    let audits = store.history(id, since).await?;
    let days = uptime::build_history(&audits, now);

    Ok(Some(UptimeView {
        resource_id: id,
        uptime_ratio: uptime::uptime_ratio(&days),
        days,
    }))
}

/// Active and past incidents across every site and page of the directory
pub async fn incident_view(
    store: &dyn AuditStore,
    directory: &dyn ResourceDirectory,
    now: DateTime<Utc>,
    policy: &IncidentPolicy,
) -> Result<IncidentReport> {
    let cutoff = now - policy.window;
    let mut resources = Vec::new();

    for site in directory.sites().await {
        let pages = directory.pages(site.id).await;
        for resource in std::iter::once(site).chain(pages) {
            let mut audits = store.history(resource.id, Some(cutoff)).await?;
            // Outside the window only the newest audit matters
            if audits.is_empty() {
                audits.extend(store.latest(resource.id).await?);
            }
            resources.push(ResourceAudits { resource, audits });
        }
    }

    Ok(incidents::detect(&resources, now, policy))
}
