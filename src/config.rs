//! UPnP client settings

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for gateway discovery and mapping requests
///
/// Stored as JSON. Missing fields take their default values.
///
/// # Example
/// ```rust,no_run
/// use portgate::config::UpnpSettings;
///
/// let mut settings = UpnpSettings::load("upnp.json").expect("Failed to load");
/// settings.lease_duration_secs = 3600;
/// settings.save("upnp.json").expect("Failed to save");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpnpSettings {
    /// SSDP search timeout in milliseconds
    pub search_timeout_ms: u64,
    /// Requested mapping lease in seconds (0 = permanent until reboot)
    pub lease_duration_secs: u32,
    /// Prefix of mapping descriptions sent to the gateway
    pub description: String,
}

impl UpnpSettings {
    /// Load settings from a JSON file
    ///
    /// Returns the defaults if the file doesn't exist or is empty.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;

        Ok(settings)
    }

    /// Save settings to a JSON file, creating parent directories
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create settings directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| Error::Config(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Reject values the gateway client cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.search_timeout_ms == 0 {
            return Err(Error::Config(
                "search_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// SSDP search timeout
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

impl Default for UpnpSettings {
    fn default() -> Self {
        Self {
            search_timeout_ms: 5_000,
            lease_duration_secs: 0,
            description: "portgate".to_string(),
        }
    }
}
