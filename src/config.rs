//! Session configuration for one management endpoint.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::envelope;
use crate::error::WsmanError;

/// Connection parameters for a management controller's WS-Man endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Endpoint hostname or IP address. Raw IPv6 addresses are accepted and
    /// bracketed when the URL is built.
    pub host: String,

    /// HTTPS port.
    pub port: u16,

    /// HTTP basic-auth username.
    pub username: String,

    /// HTTP basic-auth password.
    pub password: String,

    /// Default per-call timeout in seconds. Every protocol operation also
    /// accepts an explicit timeout; this is what the bound objects use.
    pub timeout_secs: u64,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Disable TLS certificate validation. Off by default (certificates are
    /// validated); management controllers commonly ship self-signed
    /// certificates, so the opt-out exists but must be explicit.
    pub danger_accept_invalid_certs: bool,

    /// Base URI of the vendor's schema resource namespace.
    pub resource_base: String,

    /// Maximum elements requested per Pull page during enumeration.
    pub max_pull_elements: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 443,
            username: "root".to_string(),
            password: "calvin".to_string(),
            timeout_secs: 120,
            connect_timeout_secs: 12,
            danger_accept_invalid_certs: false,
            resource_base: envelope::DCIM_NS.to_string(),
            max_pull_elements: 50,
        }
    }
}

impl SessionConfig {
    /// Create a config for the given endpoint with default timeouts.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Load a config from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, WsmanError> {
        serde_yaml::from_str(yaml).map_err(|e| WsmanError::Config(e.to_string()))
    }

    /// The management endpoint URL this config addresses.
    pub fn endpoint_url(&self) -> String {
        if self.host.contains(':') {
            format!("https://[{}]:{}/wsman", self.host, self.port)
        } else {
            format!("https://{}:{}/wsman", self.host, self.port)
        }
    }

    /// Default per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// TCP connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
