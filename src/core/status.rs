//! Observable connection status snapshot.
//!
//! Updated only on state-changing events, never polled. Consumers hold the
//! watch receiver and react to changes on whatever thread model they use.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Name of the most recently connected device.
    pub device_name: Option<String>,
    /// Last battery level reported over a heartbeat.
    pub battery: Option<i32>,
}

pub struct StatusTracker {
    tx: watch::Sender<ConnectionStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ConnectionStatus {
        self.tx.borrow().clone()
    }

    pub fn device_connected(&self, device_name: &str) {
        self.tx.send_modify(|status| {
            status.connected = true;
            status.device_name = Some(device_name.to_string());
        });
    }

    /// Called when a session is removed; `any_left` is whether the registry
    /// still has at least one entry.
    pub fn device_disconnected(&self, any_left: bool) {
        self.tx.send_modify(|status| {
            status.connected = any_left;
        });
    }

    pub fn battery_updated(&self, level: i32) {
        self.tx.send_modify(|status| {
            status.battery = Some(level);
        });
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
