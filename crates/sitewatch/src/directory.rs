//! Resource directory and credential resolution.

use crate::types::{Resource, ResourceId, ServiceCredential};
use async_trait::async_trait;
use std::collections::HashMap;

/// Supplies the resources to monitor
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Active root sites
    async fn sites(&self) -> Vec<Resource>;

    /// Active pages of a site
    async fn pages(&self, site_id: ResourceId) -> Vec<Resource>;

    /// Look up any resource by identifier
    async fn resource(&self, id: ResourceId) -> Option<Resource>;
}

/// Resolves the audit-service credential of a resource's owning tenant
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn credential(&self, resource: &Resource) -> Option<ServiceCredential>;
}

/// Fixed directory built from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    resources: Vec<Resource>,
    tenant_of: HashMap<ResourceId, String>,
    credentials: HashMap<String, ServiceCredential>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant's credential
    pub fn with_tenant(mut self, tenant: impl Into<String>, credential: Option<ServiceCredential>) -> Self {
        let tenant = tenant.into();
        if let Some(credential) = credential {
            self.credentials.insert(tenant, credential);
        }
        self
    }

    /// Register a resource owned by `tenant`
    pub fn with_resource(mut self, tenant: impl Into<String>, resource: Resource) -> Self {
        self.tenant_of.insert(resource.id, tenant.into());
        self.resources.push(resource);
        self
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Owning site of a resource (itself for sites)
    fn site_of(&self, resource: &Resource) -> ResourceId {
        resource.site_id.unwrap_or(resource.id)
    }
}

#[async_trait]
impl ResourceDirectory for StaticDirectory {
    async fn sites(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .filter(|r| r.site_id.is_none())
            .cloned()
            .collect()
    }

    async fn pages(&self, site_id: ResourceId) -> Vec<Resource> {
        self.resources
            .iter()
            .filter(|r| r.site_id == Some(site_id))
            .cloned()
            .collect()
    }

    async fn resource(&self, id: ResourceId) -> Option<Resource> {
        self.resources.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl CredentialResolver for StaticDirectory {
    async fn credential(&self, resource: &Resource) -> Option<ServiceCredential> {
        let tenant = self
            .tenant_of
            .get(&resource.id)
            .or_else(|| self.tenant_of.get(&self.site_of(resource)))?;
        self.credentials.get(tenant).cloned()
    }
}
