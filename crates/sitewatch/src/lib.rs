//! Audit ingestion and health derivation for monitored web resources.
//!
//! This crate collects immutable audit records for sites and their pages and
//! derives presentation data from the accumulated audit log:
//! - Liveness probing with a hard timeout
//! - Mobile and desktop performance probes with bounded retry
//! - TLS certificate expiry inspection
//! - Weighted health scores, incident lists and 60-day uptime timelines
//!
//! # Failure policy
//!
//! When the performance service keeps failing for a resource that answers
//! its liveness probe, no audit is written and the last known metrics stay
//! authoritative. When the resource itself is down, the outage is recorded.
//!
//! # Example
//!
//! ```no_run
//! use sitewatch::{AuditCollector, HttpLivenessProbe, MemoryAuditStore, PageSpeedClient,
//!                 Resource, TlsCertificateInspector, pagespeed::DEFAULT_ENDPOINT};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let collector = AuditCollector::new(
//!     Arc::new(HttpLivenessProbe::new(Duration::from_secs(10))?),
//!     Arc::new(PageSpeedClient::new(DEFAULT_ENDPOINT, Duration::from_secs(60))?),
//!     Arc::new(TlsCertificateInspector::new(Duration::from_secs(10))?),
//!     Arc::new(MemoryAuditStore::new()),
//! );
//!
//! let site = Resource::site(1, "Example", "https://example.com/");
//! let outcome = collector.collect(&site, None).await;
//! println!("recorded: {}", outcome.is_recorded());
//! # Ok(())
//! # }
//! ```

pub mod checkers;
pub mod collector;
pub mod directory;
pub mod incidents;
pub mod pagespeed;
pub mod retry;
pub mod scheduler;
pub mod scoring;
pub mod sqlite;
pub mod ssl;
pub mod store;
pub mod types;
pub mod uptime;

pub use checkers::{HttpLivenessProbe, LivenessProbe, LivenessResult};
pub use collector::{AuditCollector, CollectOutcome, CycleReport, Disposition, ExhaustedAction};
pub use directory::{CredentialResolver, ResourceDirectory, StaticDirectory};
pub use incidents::{Incident, IncidentPolicy, IncidentReport};
pub use pagespeed::{PageSpeedClient, PerformanceProbe, ProbeError, Strategy};
pub use retry::{RetryOutcome, RetryPolicy};
pub use scheduler::CollectionScheduler;
pub use scoring::{HealthScore, MetricWeights};
pub use sqlite::SqliteAuditStore;
pub use ssl::{CertificateInspector, CertificateStatus, TlsCertificateInspector};
pub use store::{AuditStore, MemoryAuditStore};
pub use types::{Audit, NewAudit, Resource, ResourceAudits, ResourceId, ResourceKind, ServiceCredential};
pub use uptime::{DayState, UptimeDay};
