//! Connection settings for the wireless tag cloud

use crate::error::{CloudError, CloudResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Cloud connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL of the cloud API
    pub api_endpoint: String,

    /// OAuth bearer token
    pub bearer_token: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Whole-request timeout in milliseconds
    pub request_timeout_ms: u64,

    pub user_agent: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://my.wirelesstag.net".to_string(),
            bearer_token: None,
            connect_timeout_ms: 10000,
            request_timeout_ms: 30000,
            user_agent: format!("wtag-cloud/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CloudConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WTAG_API_ENDPOINT") {
            config.api_endpoint = val;
        }
        if let Ok(val) = std::env::var("WTAG_BEARER_TOKEN") {
            config.bearer_token = Some(val);
        }
        if let Ok(val) = std::env::var("WTAG_CONNECT_TIMEOUT_MS") {
            match val.parse() {
                Ok(ms) => config.connect_timeout_ms = ms,
                Err(_) => warn!("Ignoring invalid WTAG_CONNECT_TIMEOUT_MS: {}", val),
            }
        }
        if let Ok(val) = std::env::var("WTAG_REQUEST_TIMEOUT_MS") {
            match val.parse() {
                Ok(ms) => config.request_timeout_ms = ms,
                Err(_) => warn!("Ignoring invalid WTAG_REQUEST_TIMEOUT_MS: {}", val),
            }
        }

        config
    }

    /// Parse from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> CloudResult<Self> {
        toml::from_str(s).map_err(|e| CloudError::Config(e.to_string()))
    }

    /// Check the endpoint and timeouts
    pub fn validate(&self) -> CloudResult<()> {
        let url = self.endpoint_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CloudError::Config(format!(
                "api_endpoint must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(CloudError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Parsed endpoint, normalized to end with a slash
    pub fn endpoint_url(&self) -> CloudResult<Url> {
        let mut url = Url::parse(&self.api_endpoint)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
