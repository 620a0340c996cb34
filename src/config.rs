//! Daemon configuration
//!
//! Values come from three layers, later ones winning:
//! built-in defaults, an optional TOML file, then command-line flags and
//! `PINSTREAM_*` environment variables. The merged result is checked by
//! [`DaemonConfig::validate`] before anything is bound or opened.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 9847
//! db_path = "/var/lib/pinstream/connections.db"
//!
//! [links]
//! base_url = "https://files.example.com"
//! bucket = "pin-images"
//! ttl_secs = 900
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::changelog::RedeliveryPolicy;
use crate::error::{PinstreamError, Result};
use crate::links::{LinkResolver, LocalEndpointLinks, PassthroughLinks, SignedLinkResolver};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9847;

/// Largest frame the push channel accepts by default (128 KiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 128 * 1024;

/// Default registry location: `<data_local_dir>/pinstream/connections.db`
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pinstream")
        .join("connections.db")
}

/// Download-link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    /// Object-store base URL for signed links
    pub base_url: Option<String>,
    pub bucket: Option<String>,
    /// HMAC key; required together with `base_url`
    pub secret: Option<String>,
    /// Lifetime of a signed link
    pub ttl_secs: u64,
    /// Unsigned local object store, used instead of signing when set
    pub local_endpoint: Option<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            bucket: None,
            secret: None,
            ttl_secs: 900,
            local_endpoint: None,
        }
    }
}

/// Everything the push daemon needs to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub max_payload_bytes: usize,
    pub push_timeout_ms: u64,
    /// Outbound frames buffered per socket
    pub queue_capacity: usize,
    /// Push through a connection-management API instead of local sockets
    pub callback_endpoint: Option<String>,
    pub max_redeliveries: u32,
    pub redelivery_delay_ms: u64,
    pub links: LinksConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: default_db_path(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            push_timeout_ms: 5_000,
            queue_capacity: 64,
            callback_endpoint: None,
            max_redeliveries: 3,
            redelivery_delay_ms: 500,
            links: LinksConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load a TOML file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PinstreamError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    }

    /// Check the merged configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(config_error("host must not be empty"));
        }
        if self.max_payload_bytes == 0 {
            return Err(config_error("max_payload_bytes must be positive"));
        }
        if self.push_timeout_ms == 0 {
            return Err(config_error("push_timeout_ms must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(config_error("queue_capacity must be positive"));
        }
        if let Some(endpoint) = &self.callback_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(config_error("callback_endpoint must be an http(s) URL"));
            }
        }

        let links = &self.links;
        if links.base_url.is_some() || links.local_endpoint.is_some() {
            if links.bucket.as_deref().map_or(true, str::is_empty) {
                return Err(config_error("links.bucket is required when links are enabled"));
            }
        }
        if links.base_url.is_some() && links.local_endpoint.is_none() {
            if links.secret.as_deref().map_or(true, str::is_empty) {
                return Err(config_error("links.secret is required to sign links"));
            }
            if links.ttl_secs == 0 {
                return Err(config_error("links.ttl_secs must be positive"));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn redelivery(&self) -> RedeliveryPolicy {
        RedeliveryPolicy {
            max_redeliveries: self.max_redeliveries,
            delay: Duration::from_millis(self.redelivery_delay_ms),
        }
    }

    /// Pick the link resolver the settings ask for
    pub fn link_resolver(&self) -> Result<Arc<dyn LinkResolver>> {
        let links = &self.links;
        let bucket = links.bucket.as_deref().unwrap_or_default();
        let resolver: Arc<dyn LinkResolver> = match (&links.local_endpoint, &links.base_url, &links.secret) {
            (Some(endpoint), _, _) => Arc::new(LocalEndpointLinks::new(endpoint, bucket)),
            (None, Some(base_url), Some(secret)) => Arc::new(SignedLinkResolver::new(
                base_url,
                bucket,
                secret.as_bytes(),
                Duration::from_secs(links.ttl_secs),
            )?),
            _ => Arc::new(PassthroughLinks),
        };
        Ok(resolver)
    }
}

fn config_error(message: &str) -> PinstreamError {
    PinstreamError::Config {
        message: message.to_string(),
    }
}
