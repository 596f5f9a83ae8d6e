//! TLS certificate expiry inspection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::tls::TlsInfo;
use std::time::Duration;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

/// Secure port used when the URL names none
const HTTPS_PORT: u16 = 443;

/// Result of inspecting a resource's certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    /// URL does not use TLS
    NotApplicable,
    /// Leaf certificate valid-to
    Expires(DateTime<Utc>),
    /// Handshake or parse failed
    Unknown,
}

impl CertificateStatus {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CertificateStatus::Expires(at) => Some(*at),
            CertificateStatus::NotApplicable | CertificateStatus::Unknown => None,
        }
    }

    /// True when the certificate is known and not yet expired at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at > now)
    }
}

/// Certificate inspection. Never fails: errors map to `Unknown`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CertificateInspector: Send + Sync {
    async fn inspect(&self, url: &str) -> CertificateStatus;
}

/// Inspector performing a minimal TLS handshake to the host's secure port.
///
/// Chain and hostname verification are disabled: an expired or untrusted
/// certificate must still yield its valid-to date.
pub struct TlsCertificateInspector {
    client: reqwest::Client,
}

impl TlsCertificateInspector {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tls_info(true)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

/// Host and secure port of `url` when its scheme is `https`
pub fn tls_target(url: &str) -> Option<(String, u16)> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?.to_string();
    Some((host, parsed.port().unwrap_or(HTTPS_PORT)))
}

/// Read valid-to from a DER-encoded certificate
pub fn parse_not_after(der: &[u8]) -> Option<DateTime<Utc>> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
}

#[async_trait]
impl CertificateInspector for TlsCertificateInspector {
    async fn inspect(&self, url: &str) -> CertificateStatus {
        let Some((host, port)) = tls_target(url) else {
            return CertificateStatus::NotApplicable;
        };

        let target = format!("https://{}:{}/", host, port);
        let response = match self.client.head(&target).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(host = %host, error = %e, "Certificate handshake failed");
                return CertificateStatus::Unknown;
            }
        };

        let expires = response
            .extensions()
            .get::<TlsInfo>()
            .and_then(TlsInfo::peer_certificate)
            .and_then(parse_not_after);

        match expires {
            Some(at) => {
                debug!(host = %host, expires_at = %at, "Certificate inspected");
                CertificateStatus::Expires(at)
            }
            None => {
                warn!(host = %host, "Peer certificate unavailable or unparseable");
                CertificateStatus::Unknown
            }
        }
    }
}
