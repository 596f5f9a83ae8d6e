//! Sitewatch server
//!
//! Runs periodic audit collection for the configured sites and pages and
//! serves the derived views over HTTP.
//!
//! # Components
//!
//! - **Scheduler**: runs one collection cycle per interval
//! - **Reporter**: turns cycle reports into metrics and log lines
//! - **HTTP server**: Prometheus metrics, health scores, uptime timelines and incidents

pub mod config;
pub mod http_server;
pub mod metrics;
pub mod reporter;
pub mod server;
pub mod types;
pub mod views;

pub use config::{Config, ConfigError};
pub use http_server::{AppState, HttpServer};
pub use metrics::MetricsRegistry;
pub use reporter::CycleReporter;
pub use server::SitewatchServer;
pub use types::ServerConfig;
