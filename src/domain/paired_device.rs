use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device that has completed pairing at least once.
///
/// Created on the first successful pairing, refreshed on every reconnection,
/// removed only by an explicit unpair.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PairedDevice {
    pub device_id: String,
    pub device_name: String,
    #[serde(default)]
    pub device_model: String,
    /// Reserved for persisted trust material; never logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
    #[serde(default)]
    pub last_ip_address: Option<String>,
    #[serde(default)]
    pub last_connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trusted: bool,
}

impl PairedDevice {
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            device_model: String::new(),
            shared_secret: None,
            last_ip_address: None,
            last_connected_at: None,
            trusted: true,
        }
    }
}

impl std::fmt::Debug for PairedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairedDevice")
            .field("device_id", &self.device_id)
            .field("device_name", &self.device_name)
            .field("device_model", &self.device_model)
            .field("shared_secret", &"[REDACTED]")
            .field("last_ip_address", &self.last_ip_address)
            .field("last_connected_at", &self.last_connected_at)
            .field("trusted", &self.trusted)
            .finish()
    }
}
