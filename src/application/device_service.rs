//! Paired-device bookkeeping.
//!
//! In-memory map keyed by device id with best-effort JSON persistence next
//! to the config file. Entries are created on first pairing, refreshed on
//! every reconnect, and removed only by an explicit unpair.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::RwLock;

use crate::domain::paired_device::PairedDevice;
use crate::error::Result;

pub struct DeviceManager {
    devices: RwLock<HashMap<String, PairedDevice>>,
    store_path: Option<PathBuf>,
}

impl DeviceManager {
    /// Manager backed by a JSON file; missing or corrupt files start empty.
    pub fn new(store_path: Option<PathBuf>) -> Self {
        let devices = store_path
            .as_deref()
            .filter(|path| path.exists())
            .and_then(|path| match fs::read_to_string(path) {
                Ok(json) => match serde_json::from_str::<Vec<PairedDevice>>(&json) {
                    Ok(devices) => Some(devices),
                    Err(e) => {
                        warn!("Invalid paired device store: {}, starting empty", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Failed to read paired device store: {}, starting empty", e);
                    None
                }
            })
            .unwrap_or_default()
            .into_iter()
            .map(|device| (device.device_id.clone(), device))
            .collect();

        Self {
            devices: RwLock::new(devices),
            store_path,
        }
    }

    /// In-memory only; used by tests and embedders that persist elsewhere.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub async fn get(&self, device_id: &str) -> Option<PairedDevice> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn all(&self) -> Vec<PairedDevice> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Record a successful pairing or reconnection.
    ///
    /// Creates the entry if this is the first pairing, otherwise refreshes
    /// name, model, address and timestamp in place.
    pub async fn record_connected(
        &self,
        device_id: &str,
        device_name: &str,
        device_model: Option<&str>,
        ip_address: Option<&str>,
    ) {
        {
            let mut devices = self.devices.write().await;
            let entry = devices
                .entry(device_id.to_string())
                .or_insert_with(|| PairedDevice::new(device_id, device_name));
            entry.device_name = device_name.to_string();
            if let Some(model) = device_model {
                entry.device_model = model.to_string();
            }
            if let Some(ip) = ip_address {
                entry.last_ip_address = Some(ip.to_string());
            }
            entry.last_connected_at = Some(Utc::now());
        }
        self.persist().await;
    }

    /// Remove a device from the trusted set.
    pub async fn unpair(&self, device_id: &str) -> bool {
        let removed = self.devices.write().await.remove(device_id).is_some();
        if removed {
            info!("Unpaired device {}", device_id);
            self.persist().await;
        }
        removed
    }

    pub async fn last_ip(&self, device_id: &str) -> Option<String> {
        self.devices
            .read()
            .await
            .get(device_id)
            .and_then(|device| device.last_ip_address.clone())
    }

    async fn persist(&self) {
        let Some(path) = self.store_path.as_ref() else {
            return;
        };
        let devices: Vec<PairedDevice> = self.devices.read().await.values().cloned().collect();
        if let Err(e) = write_store(path, &devices) {
            warn!("Failed to persist paired devices: {}", e);
        }
    }
}

fn write_store(path: &PathBuf, devices: &[PairedDevice]) -> Result<()> {
    let json = serde_json::to_string_pretty(devices)?;
    fs::write(path, json)?;
    Ok(())
}
