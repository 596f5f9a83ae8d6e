//! Resource and audit types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource identifier (site or page)
pub type ResourceId = i64;

/// Audit identifier, assigned by the store
pub type AuditId = i64;

/// Kind of a monitored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Root site
    Site,
    /// Page nested under a site
    Page,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Site => write!(f, "site"),
            ResourceKind::Page => write!(f, "page"),
        }
    }
}

/// A monitored root site or a page nested under one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,

    /// Parent site, `None` for root sites
    pub site_id: Option<ResourceId>,

    /// Target URL
    pub url: String,

    /// Display name
    pub name: String,
}

impl Resource {
    /// Create a root site
    pub fn site(id: ResourceId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            site_id: None,
            url: url.into(),
            name: name.into(),
        }
    }

    /// Create a page under `site_id`
    pub fn page(
        id: ResourceId,
        site_id: ResourceId,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            site_id: Some(site_id),
            url: url.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        if self.site_id.is_some() {
            ResourceKind::Page
        } else {
            ResourceKind::Site
        }
    }
}

/// Credential for the external audit service, resolved per tenant
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredential {
    pub api_key: String,
}

impl fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredential")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Liveness status code meaning the resource could not be reached at all
pub const STATUS_UNREACHABLE: u16 = 0;

/// Status in [200, 400)
pub fn is_healthy_status(code: u16) -> bool {
    (200..400).contains(&code)
}

/// Status >= 400
pub fn is_http_error(code: u16) -> bool {
    code >= 400
}

/// Unreachable or HTTP error
pub fn is_failure_status(code: u16) -> bool {
    code == STATUS_UNREACHABLE || is_http_error(code)
}

/// Audit fields before the store assigns an identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAudit {
    pub resource_id: ResourceId,
    pub created_at: DateTime<Utc>,
    pub status_code: u16,
    pub https_valid: bool,
    pub ssl_expires_at: Option<DateTime<Utc>>,

    /// Category scores on a 0-100 scale
    pub performance_mobile: Option<f64>,
    pub performance_desktop: Option<f64>,
    pub seo: Option<f64>,
    pub accessibility: Option<f64>,
    pub best_practices: Option<f64>,

    /// Time to first byte in milliseconds
    pub ttfb_ms: Option<f64>,

    /// Raw diagnostic payload
    pub raw_payload: serde_json::Value,

    /// Screenshot as a data URI
    pub screenshot: Option<String>,
}

impl NewAudit {
    /// An audit carrying only liveness data
    pub fn liveness_only(resource_id: ResourceId, status_code: u16, at: DateTime<Utc>) -> Self {
        Self {
            resource_id,
            created_at: at,
            status_code,
            https_valid: false,
            ssl_expires_at: None,
            performance_mobile: None,
            performance_desktop: None,
            seo: None,
            accessibility: None,
            best_practices: None,
            ttfb_ms: None,
            raw_payload: serde_json::Value::Null,
            screenshot: None,
        }
    }

    /// Attach the store-assigned identifier
    pub fn into_audit(self, id: AuditId) -> Audit {
        Audit {
            id,
            resource_id: self.resource_id,
            created_at: self.created_at,
            status_code: self.status_code,
            https_valid: self.https_valid,
            ssl_expires_at: self.ssl_expires_at,
            performance_mobile: self.performance_mobile,
            performance_desktop: self.performance_desktop,
            seo: self.seo,
            accessibility: self.accessibility,
            best_practices: self.best_practices,
            ttfb_ms: self.ttfb_ms,
            raw_payload: self.raw_payload,
            screenshot: self.screenshot,
        }
    }
}

/// One immutable measurement event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub id: AuditId,
    pub resource_id: ResourceId,
    pub created_at: DateTime<Utc>,
    pub status_code: u16,
    pub https_valid: bool,
    pub ssl_expires_at: Option<DateTime<Utc>>,
    pub performance_mobile: Option<f64>,
    pub performance_desktop: Option<f64>,
    pub seo: Option<f64>,
    pub accessibility: Option<f64>,
    pub best_practices: Option<f64>,
    pub ttfb_ms: Option<f64>,
    pub raw_payload: serde_json::Value,
    pub screenshot: Option<String>,
}

impl Audit {
    pub fn is_healthy(&self) -> bool {
        is_healthy_status(self.status_code)
    }

    pub fn is_failure(&self) -> bool {
        is_failure_status(self.status_code)
    }

    /// Ordering key for "latest": creation time, then identifier
    pub fn recency_key(&self) -> (DateTime<Utc>, AuditId) {
        (self.created_at, self.id)
    }
}

/// A resource together with its audits, as handed to read-side derivations
#[derive(Debug, Clone)]
pub struct ResourceAudits {
    pub resource: Resource,
    pub audits: Vec<Audit>,
}
