use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::utils::get_config_path;
use crate::error::Result;

// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSetting {
    // Port for the session server (WebSocket upgrade endpoint)
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    // Auxiliary port the peer listens on for bulk uploads
    #[serde(default = "default_transfer_port")]
    pub transfer_port: u16,
}

fn default_server_port() -> u16 {
    8765
}

fn default_transfer_port() -> u16 {
    8766
}

impl Default for NetworkSetting {
    fn default() -> Self {
        Self {
            server_port: default_server_port(),
            transfer_port: default_transfer_port(),
        }
    }
}

// Transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSetting {
    // Directory incoming files are written to
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("PhoneLink")
}

impl Default for TransferSetting {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
        }
    }
}

// Security settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySetting {
    // When enabled, clipboard content is sealed with the session key
    #[serde(default)]
    pub encrypt_clipboard: bool,
}

impl Default for SecuritySetting {
    fn default() -> Self {
        Self {
            encrypt_clipboard: false,
        }
    }
}

// Device settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceSetting {
    // Optional alias shown to peers instead of the hostname
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub network: NetworkSetting,
    #[serde(default)]
    pub transfer: TransferSetting,
    #[serde(default)]
    pub security: SecuritySetting,
    #[serde(default)]
    pub device: DeviceSetting,
}

impl Settings {
    /// Load settings from the config file, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        match get_config_path() {
            Ok(path) if path.exists() => match fs::read_to_string(&path) {
                Ok(json) => match serde_json::from_str(&json) {
                    Ok(settings) => {
                        info!("Loaded settings from {}", path.display());
                        settings
                    }
                    Err(e) => {
                        warn!("Invalid config file {}: {}, using defaults", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!("Failed to read config file: {}, using defaults", e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Persist settings as pretty-printed JSON.
    pub fn save(&self) -> Result<()> {
        let path = get_config_path()?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }
}
