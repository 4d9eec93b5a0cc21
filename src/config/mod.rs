//! Configuration management for serialosc-gw
//!
//! Loads the YAML application config and owns the device settings file that
//! holds the persisted device port.

pub mod settings;
pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::session::DeviceClass;

pub use settings::{PortValue, SettingsStore};
pub use watcher::SettingsWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Fixed endpoints of the bridge
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Host of serialosc and the device; also announced as our listener host
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_serialosc_port")]
    pub serialosc_port: u16,
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,
}

/// Device addressing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// OSC prefix announced to the device
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub class: DeviceClass,
    /// YAML file holding the persisted device port
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

/// Discovery behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Request the device list at the start of every cycle
    #[serde(default = "default_true")]
    pub auto_detect: bool,
    /// Request add/remove notifications
    #[serde(default = "default_true")]
    pub subscribe: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            serialosc_port: default_serialosc_port(),
            listener_port: default_listener_port(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            class: DeviceClass::default(),
            settings_file: default_settings_file(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            subscribe: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            return Self::load(path).await;
        }

        info!("No config file at {}, using defaults", path.display());
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let prefix = &self.device.prefix;
        if !prefix.starts_with('/') {
            anyhow::bail!("Device prefix '{}' must start with '/'", prefix);
        }
        if prefix.len() > 1 && prefix.ends_with('/') {
            anyhow::bail!("Device prefix '{}' must not end with '/'", prefix);
        }
        if prefix == "/" || prefix.contains(char::is_whitespace) {
            anyhow::bail!("Device prefix '{}' is not a valid OSC address", prefix);
        }

        if self.network.host.is_empty() {
            anyhow::bail!("network.host cannot be empty");
        }
        if self.network.listener_port == 0 {
            anyhow::bail!("network.listener_port cannot be 0");
        }
        if self.network.serialosc_port == 0 {
            anyhow::bail!("network.serialosc_port cannot be 0");
        }

        if self.device.settings_file.as_os_str().is_empty() {
            anyhow::bail!("device.settings_file cannot be empty");
        }

        Ok(())
    }
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_serialosc_port() -> u16 { 12002 }
fn default_listener_port() -> u16 { 19996 }
fn default_prefix() -> String { "/monome".to_string() }
fn default_settings_file() -> PathBuf { PathBuf::from("device.yaml") }
fn default_true() -> bool { true }
