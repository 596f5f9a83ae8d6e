//! Active and past incident detection.

use crate::types::{Audit, AuditId, ResourceAudits, ResourceId, ResourceKind};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Detection window and display cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentPolicy {
    /// Trailing window for past incidents
    pub window: Duration,
    /// Maximum past incidents returned
    pub past_limit: usize,
}

impl Default for IncidentPolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(10),
            past_limit: 20,
        }
    }
}

/// A failing audit attributed to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub resource_id: ResourceId,
    pub kind: ResourceKind,
    pub name: String,
    pub url: String,
    pub audit_id: AuditId,
    pub status_code: u16,
    pub detected_at: DateTime<Utc>,
}

impl Incident {
    fn from_audit(resource: &ResourceAudits, audit: &Audit) -> Self {
        Self {
            resource_id: resource.resource.id,
            kind: resource.resource.kind(),
            name: resource.resource.name.clone(),
            url: resource.resource.url.clone(),
            audit_id: audit.id,
            status_code: audit.status_code,
            detected_at: audit.created_at,
        }
    }
}

/// Incidents split into "broken now" and "recently broken"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncidentReport {
    pub active: Vec<Incident>,
    pub past: Vec<Incident>,
}

/// Classify incidents across resources.
///
/// Per resource, the newest audit failing yields one active incident. Older
/// failing audits inside the window are past incidents; scanning stops at
/// the first audit older than the window.
pub fn detect(resources: &[ResourceAudits], now: DateTime<Utc>, policy: &IncidentPolicy) -> IncidentReport {
    let cutoff = now - policy.window;
    let mut report = IncidentReport::default();

    for resource in resources {
        let mut audits: Vec<&Audit> = resource.audits.iter().collect();
        audits.sort_by_key(|a| std::cmp::Reverse(a.recency_key()));

        let Some((newest, older)) = audits.split_first() else {
            continue;
        };

        if newest.is_failure() {
            report.active.push(Incident::from_audit(resource, newest));
        }

        for audit in older {
            if audit.created_at < cutoff {
                break;
            }
            if audit.is_failure() {
                report.past.push(Incident::from_audit(resource, audit));
            }
        }
    }

    report
        .active
        .sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
    report.past.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
    report.past.truncate(policy.past_limit);
    report
}
