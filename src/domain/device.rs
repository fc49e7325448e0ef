use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::utils::helpers::{generate_device_id, local_host_name};

/// Process-wide identity, generated once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub device_id: String,
    pub display_name: String,
}

impl Identity {
    /// Generate a fresh identity from the OS user and hostname.
    ///
    /// An `alias` from settings overrides the hostname when present.
    pub fn generate(alias: Option<&str>) -> Self {
        let display_name = match alias {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => local_host_name(),
        };
        Self {
            device_id: generate_device_id(),
            display_name,
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.device_id)
    }
}
