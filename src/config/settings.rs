//! Persisted device settings
//!
//! The device port lives in its own small YAML file so it can be written back
//! by the bridge and edited by hand. Values are read raw; validation belongs
//! to the connection manager.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Device port as written in the file, before validation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortValue::Number(n) => write!(f, "{}", n),
            PortValue::Float(n) => write!(f, "{}", n),
            PortValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceSettings {
    /// 0 or empty means no device is bound
    #[serde(default)]
    pub device_port: Option<PortValue>,
}

impl DeviceSettings {
    /// Raw text of the device port, empty when unset
    pub fn raw_port(&self) -> String {
        self.device_port
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// File-backed store for [`DeviceSettings`]
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with an unbound port if it does not exist yet
    pub async fn ensure_exists(&self) -> Result<()> {
        if fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        info!("Creating device settings file: {}", self.path.display());
        self.save_port(0).await
    }

    pub async fn load(&self) -> Result<DeviceSettings> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No device settings at {}", self.path.display());
                return Ok(DeviceSettings::default());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read device settings: {}", self.path.display())
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(DeviceSettings::default());
        }

        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse device settings: {}", self.path.display()))
    }

    /// Raw device port text, for validation by the connection manager
    pub async fn load_raw_port(&self) -> Result<String> {
        Ok(self.load().await?.raw_port())
    }

    pub async fn save_port(&self, port: u16) -> Result<()> {
        let settings = DeviceSettings {
            device_port: Some(PortValue::Number(i64::from(port))),
        };
        let yaml = serde_yaml::to_string(&settings)
            .context("Failed to serialize device settings to YAML")?;

        fs::write(&self.path, yaml)
            .await
            .with_context(|| format!("Failed to write device settings: {}", self.path.display()))?;

        debug!("Persisted device port {} to {}", port, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load_port() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = SettingsStore::new(temp_dir.path().join("device.yaml"));

        store.save_port(16000).await?;
        assert_eq!(store.load_raw_port().await?, "16000");

        store.save_port(0).await?;
        assert_eq!(store.load_raw_port().await?, "0");

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_or_empty_file_is_unbound() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("device.yaml");
        let store = SettingsStore::new(&path);

        assert_eq!(store.load_raw_port().await?, "");

        std::fs::write(&path, "device_port:\n")?;
        assert_eq!(store.load_raw_port().await?, "");

        std::fs::write(&path, "")?;
        assert_eq!(store.load_raw_port().await?, "");

        Ok(())
    }

    #[tokio::test]
    async fn test_hand_edited_values_kept_raw() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("device.yaml");
        let store = SettingsStore::new(&path);

        std::fs::write(&path, "device_port: \"15000\"\n")?;
        assert_eq!(store.load_raw_port().await?, "15000");

        std::fs::write(&path, "device_port: grid\n")?;
        assert_eq!(store.load_raw_port().await?, "grid");

        std::fs::write(&path, "device_port: 16000.5\n")?;
        assert_eq!(store.load_raw_port().await?, "16000.5");

        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_exists_creates_unbound_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("device.yaml");
        let store = SettingsStore::new(&path);

        store.ensure_exists().await?;
        assert_eq!(store.load_raw_port().await?, "0");

        // Existing values are left alone
        store.save_port(17000).await?;
        store.ensure_exists().await?;
        assert_eq!(store.load_raw_port().await?, "17000");

        Ok(())
    }
}
