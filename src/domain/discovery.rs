use serde::{Deserialize, Serialize};

/// Wire shape of a discovery datagram. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryAnnouncement {
    pub alias: String,
    pub version: String,
    pub device_model: String,
    pub device_type: String,
    pub fingerprint: String,
    pub port: u16,
    pub protocol: String,
    pub announce: bool,
}

pub const PROTOCOL_VERSION: &str = "1.0";
pub const PROTOCOL_TAG: &str = "ws";
pub const DEVICE_TYPE_DESKTOP: &str = "desktop";

impl DiscoveryAnnouncement {
    pub fn new(
        alias: impl Into<String>,
        device_model: impl Into<String>,
        fingerprint: impl Into<String>,
        port: u16,
        announce: bool,
    ) -> Self {
        Self {
            alias: alias.into(),
            version: PROTOCOL_VERSION.to_string(),
            device_model: device_model.into(),
            device_type: DEVICE_TYPE_DESKTOP.to_string(),
            fingerprint: fingerprint.into(),
            port,
            protocol: PROTOCOL_TAG.to_string(),
            announce,
        }
    }
}

/// A peer surfaced by the discovery beacon.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeer {
    pub alias: String,
    pub device_model: String,
    pub device_type: String,
    pub fingerprint: String,
    pub ip: String,
    pub port: u16,
}
