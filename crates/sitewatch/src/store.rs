//! Append-only audit storage.

use crate::types::{Audit, AuditId, NewAudit, ResourceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Append-only audit log plus the coarse per-resource reachability flag.
///
/// Rows are never updated or deleted. `latest` is a top-1 query by
/// `(created_at, id)`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one audit atomically and return it with its identifier
    async fn insert(&self, audit: NewAudit) -> Result<Audit>;

    /// Most recent audit of a resource
    async fn latest(&self, resource_id: ResourceId) -> Result<Option<Audit>>;

    /// Audits of a resource, newest first, optionally limited to `created_at >= since`
    async fn history(
        &self,
        resource_id: ResourceId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Audit>>;

    /// Record the latest liveness outcome
    async fn set_reachable(&self, resource_id: ResourceId, reachable: bool) -> Result<()>;

    /// Latest liveness outcome, `None` if never probed
    async fn reachable(&self, resource_id: ResourceId) -> Result<Option<bool>>;
}

/// In-memory store. Each resource's audits are kept in ascending
/// `(created_at, id)` order so the latest is always the last element.
#[derive(Default)]
pub struct MemoryAuditStore {
    audits: DashMap<ResourceId, Vec<Audit>>,
    reachability: DashMap<ResourceId, bool>,
    next_id: AtomicI64,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored audits
    pub fn len(&self) -> usize {
        self.audits.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, audit: NewAudit) -> Result<Audit> {
        let id: AuditId = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let audit = audit.into_audit(id);

        let mut entry = self.audits.entry(audit.resource_id).or_default();
        let key = audit.recency_key();
        let position = entry.partition_point(|a| a.recency_key() <= key);
        entry.insert(position, audit.clone());

        Ok(audit)
    }

    async fn latest(&self, resource_id: ResourceId) -> Result<Option<Audit>> {
        Ok(self
            .audits
            .get(&resource_id)
            .and_then(|audits| audits.last().cloned()))
    }

    async fn history(
        &self,
        resource_id: ResourceId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Audit>> {
        let Some(audits) = self.audits.get(&resource_id) else {
            return Ok(Vec::new());
        };

        Ok(audits
            .iter()
            .rev()
            .take_while(|a| since.is_none_or(|since| a.created_at >= since))
            .cloned()
            .collect())
    }

    async fn set_reachable(&self, resource_id: ResourceId, reachable: bool) -> Result<()> {
        self.reachability.insert(resource_id, reachable);
        Ok(())
    }

    async fn reachable(&self, resource_id: ResourceId) -> Result<Option<bool>> {
        Ok(self.reachability.get(&resource_id).map(|r| *r))
    }
}
