//! Engine-wide event fan-out.
//!
//! A single broadcast channel carries every state-changing event; UI and
//! feature collaborators subscribe and marshal onto their own threads
//! however they like. The bus is injected into components, never global.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::domain::discovery::DiscoveredPeer;

#[derive(Debug, Clone)]
pub enum AppEvent {
    PeerDiscovered(DiscoveredPeer),
    DeviceConnected {
        device_id: String,
        device_name: String,
    },
    DeviceDisconnected {
        device_id: String,
    },
    BatteryUpdated {
        level: i32,
    },
    PairingCodeGenerated {
        code: String,
        expires_at: DateTime<Utc>,
    },
    TransferProgress {
        file_name: String,
        sent: u64,
        total: u64,
        fraction: f64,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(128);
        Self { tx }
    }

    pub fn publish(&self, event: AppEvent) {
        // No subscribers is fine; events are fire-and-forget
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
