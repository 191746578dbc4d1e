//! Client configuration

use anyhow::{bail, Result};
use rockwire_cloud::{CloudClientConfig, DEFAULT_CLOUD_URL};
use rockwire_transport::DeviceClientConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Local device protocol
    #[serde(default)]
    pub device: DeviceConfig,

    /// Cloud account
    #[serde(default)]
    pub cloud: CloudConfig,
}

impl ClientConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.device.validate()?;
        Ok(config)
    }

    /// Settings for a device client
    pub fn device_client_config(&self) -> DeviceClientConfig {
        DeviceClientConfig {
            local_keys: self.device.local_keys.clone(),
            endpoint_seed: self.device.endpoint_seed.clone(),
            command_timeout: Duration::from_millis(self.device.command_timeout_ms),
            length_prefixed: self.device.length_prefixed,
            notification_capacity: self.device.notification_capacity,
        }
    }

    /// Settings for a cloud client, or `None` when no account is configured
    pub fn cloud_client_config(&self) -> Option<CloudClientConfig> {
        let username = self.cloud.username.clone()?;
        Some(CloudClientConfig {
            username,
            default_url: self.cloud.default_url.clone(),
            base_url: self.cloud.base_url.clone(),
            installation_id: self.cloud.installation_id.clone(),
            request_timeout: Duration::from_secs(self.cloud.request_timeout_secs),
        })
    }
}

/// Local device protocol configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Seed hashed into the security endpoint
    #[serde(default = "default_endpoint_seed")]
    pub endpoint_seed: String,

    /// Command timeout (milliseconds)
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// 4-byte length prefix on every frame (stream transports)
    #[serde(default)]
    pub length_prefixed: bool,

    /// Notification channel capacity
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Device id -> local key
    #[serde(default)]
    pub local_keys: HashMap<String, String>,
}

fn default_endpoint_seed() -> String {
    "rockwire".to_string()
}

fn default_command_timeout_ms() -> u64 {
    4000
}

fn default_notification_capacity() -> usize {
    64
}

impl DeviceConfig {
    fn validate(&self) -> Result<()> {
        if self.command_timeout_ms == 0 {
            bail!("device.command_timeout_ms must be greater than zero");
        }
        for (device_id, key) in &self.local_keys {
            if key.len() != 16 {
                bail!(
                    "local key for device {} must be 16 characters, got {}",
                    device_id,
                    key.len()
                );
            }
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            endpoint_seed: default_endpoint_seed(),
            command_timeout_ms: default_command_timeout_ms(),
            length_prefixed: false,
            notification_capacity: default_notification_capacity(),
            local_keys: HashMap::new(),
        }
    }
}

/// Cloud account configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    /// Account e-mail
    #[serde(default)]
    pub username: Option<String>,

    /// Region lookup endpoint
    #[serde(default = "default_cloud_url")]
    pub default_url: String,

    /// Pre-resolved regional base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Stable installation identifier
    #[serde(default)]
    pub installation_id: Option<String>,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_cloud_url() -> String {
    DEFAULT_CLOUD_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            username: None,
            default_url: default_cloud_url(),
            base_url: None,
            installation_id: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}
