//! Configuration loading and validation for the sitewatch server

use crate::types::ServerConfig;
use serde::{Deserialize, Serialize};
use sitewatch::{
    IncidentPolicy, Resource, RetryPolicy, ServiceCredential, StaticDirectory,
    pagespeed::DEFAULT_ENDPOINT,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub collector: CollectorSettings,

    #[serde(default)]
    pub pagespeed: PageSpeedSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub incidents: IncidentSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub tenants: Vec<TenantSettings>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.server.validate()?;
        self.collector.validate()?;
        self.pagespeed.validate()?;
        self.incidents.validate()?;

        let mut ids = HashSet::new();
        for tenant in &self.tenants {
            tenant.validate()?;
            for site in &tenant.sites {
                site.validate()?;
                for page in &site.pages {
                    page.validate()?;
                }

                let site_ids = std::iter::once(site.id).chain(site.pages.iter().map(|p| p.id));
                for id in site_ids {
                    if !ids.insert(id) {
                        let mut errors = ValidationErrors::new();
                        errors.add("tenants", ValidationError::new("duplicate_resource_id"));
                        return Err(errors);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Server-level settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerSettings {
    #[validate(length(min = 1), custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Collection cycle settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CollectorSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_cycle_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub resource_pause: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub liveness_timeout: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub probe_timeout: Duration,

    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

/// External audit service settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PageSpeedSettings {
    #[validate(custom = "validate_http_url")]
    pub endpoint: String,
}

/// Audit persistence. Without a path audits are kept in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    pub path: Option<PathBuf>,
}

/// Incident view settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IncidentSettings {
    #[validate(range(min = 1, max = 365))]
    pub window_days: u32,

    #[validate(range(min = 1, max = 1000))]
    pub past_limit: usize,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// A tenant, its audit-service key and its sites
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TenantSettings {
    #[validate(length(min = 1))]
    pub name: String,

    pub api_key: Option<String>,

    #[serde(default)]
    pub sites: Vec<SiteSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SiteSettings {
    pub id: i64,

    #[validate(length(min = 1))]
    pub name: String,

    #[validate(custom = "validate_http_url")]
    pub url: String,

    #[serde(default)]
    pub pages: Vec<PageSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PageSettings {
    pub id: i64,

    #[validate(length(min = 1))]
    pub name: String,

    #[validate(custom = "validate_http_url")]
    pub url: String,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9180".to_string(),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            resource_pause: Duration::from_secs(2),
            liveness_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(60),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl Default for PageSpeedSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Default for IncidentSettings {
    fn default() -> Self {
        Self {
            window_days: 10,
            past_limit: 20,
        }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    let trimmed = addr.trim();
    match trimmed.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ValidationError::new("listen_addr_invalid_format")),
    }
}

fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));

    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ValidationError::new("url_must_be_http")),
    }
}

fn validate_cycle_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.as_secs() < 60 {
        return Err(ValidationError::new("cycle_interval_too_short"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 100 || millis > 600_000 {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Path given by SITEWATCH_CONFIG, else the first existing standard location
    pub fn find_config_file() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("SITEWATCH_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let mut paths = vec![PathBuf::from("/etc/sitewatch/sitewatch.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./sitewatch.yaml"));

        paths.into_iter().find(|p| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/sitewatch/sitewatch.yaml"))
    }

    /// Convert to the internal server configuration
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.server.listen_addr.clone(),
            cycle_interval: self.collector.interval,
            resource_pause: self.collector.resource_pause,
            liveness_timeout: self.collector.liveness_timeout,
            probe_timeout: self.collector.probe_timeout,
            retry: RetryPolicy::new(self.collector.max_attempts, self.collector.base_delay),
            pagespeed_endpoint: self.pagespeed.endpoint.clone(),
            database_path: self.storage.path.clone(),
            incident_policy: IncidentPolicy {
                window: chrono::Duration::days(i64::from(self.incidents.window_days)),
                past_limit: self.incidents.past_limit,
            },
            ..ServerConfig::default()
        }
    }

    /// Build the resource directory from the tenant list
    pub fn to_directory(&self) -> StaticDirectory {
        let mut directory = StaticDirectory::new();

        for tenant in &self.tenants {
            let credential = tenant.api_key.clone().map(|api_key| ServiceCredential { api_key });
            directory = directory.with_tenant(&tenant.name, credential);

            for site in &tenant.sites {
                directory = directory.with_resource(
                    &tenant.name,
                    Resource::site(site.id, &site.name, &site.url),
                );
                for page in &site.pages {
                    directory = directory.with_resource(
                        &tenant.name,
                        Resource::page(page.id, site.id, &page.name, &page.url),
                    );
                }
            }
        }

        directory
    }
}
