use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single active pairing window.
///
/// Exactly one session exists at a time; a new `generate_code` overwrites it.
/// The code is accepted at most once and only before `expires_at`.
#[derive(Debug, Clone)]
pub struct PairingSession {
    pub code: String,
    pub public_key: String,
    pub expires_at: DateTime<Utc>,
}

impl PairingSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Payload rendered into a scannable code by an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairingAdvertisement {
    pub ip: String,
    pub port: u16,
    pub code: String,
    pub key: String,
}

impl PairingAdvertisement {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
