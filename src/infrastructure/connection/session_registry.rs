//! The authoritative map of device id to live transport handle.
//!
//! This is the single place where "is a device connected" is decided: a
//! device with no entry is disconnected. Entries are created after a pairing
//! handoff and removed when the transport closes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

use super::DeviceId;
use crate::error::Result;
use crate::message::Envelope;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// A serialized envelope to write as one text frame.
    Frame(String),
    /// Close the transport and end its write task.
    Close,
}

/// Write half of one live connection.
///
/// Cloneable; the per-connection write task owns the receiving end and maps
/// commands onto the socket.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send_frame(&self, frame: String) -> bool {
        self.tx.send(SessionCommand::Frame(frame)).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(SessionCommand::Close);
    }
}

struct Session {
    handle: SessionHandle,
    remote_addr: SocketAddr,
    #[allow(dead_code)]
    connected_at: DateTime<Utc>,
}

pub struct SessionRegistry {
    sessions: DashMap<DeviceId, Session>,
    connected_tx: watch::Sender<bool>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        let (connected_tx, _) = watch::channel(false);
        Arc::new(Self {
            sessions: DashMap::new(),
            connected_tx,
        })
    }

    /// Insert or replace the entry for `device_id`.
    ///
    /// Called only after a pairing handoff. A superseded handle from a
    /// previous connection with the same id is closed before being dropped.
    pub fn register(&self, device_id: &str, handle: SessionHandle, remote_addr: SocketAddr) {
        let session = Session {
            handle,
            remote_addr,
            connected_at: Utc::now(),
        };
        if let Some(old) = self.sessions.insert(device_id.to_string(), session) {
            warn!(
                "Device {} reconnected, closing superseded session",
                device_id
            );
            old.handle.close();
        }
        info!("Session registered for device {}", device_id);
        self.recompute_connected();
    }

    /// Remove the entry for `device_id` if it still belongs to `handle_id`.
    ///
    /// The guard keeps a slow teardown of a superseded connection from
    /// evicting the replacement that took its key. Returns whether an entry
    /// was removed.
    pub fn remove(&self, device_id: &str, handle_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(device_id, |_, session| session.handle.id() == handle_id)
            .is_some();
        if removed {
            info!("Session removed for device {}", device_id);
            self.recompute_connected();
        }
        removed
    }

    /// Unicast to one device, or broadcast to every live session when
    /// `device_id` is `None`.
    ///
    /// Unicast to an unknown or dead handle logs a warning and drops the
    /// message; there is no queueing and no retry. Broadcast snapshots the
    /// handle set first so a concurrent removal cannot skip delivery to the
    /// remaining sessions.
    pub fn send(&self, device_id: Option<&str>, envelope: &Envelope) -> Result<()> {
        let frame = envelope.to_json()?;
        match device_id {
            Some(id) => {
                let handle = self.sessions.get(id).map(|s| s.handle.clone());
                match handle {
                    Some(handle) => {
                        if !handle.send_frame(frame) {
                            warn!("Dropped message to {}: connection closed", id);
                        }
                    }
                    None => warn!("Device not connected: {}", id),
                }
            }
            None => {
                let handles: Vec<(DeviceId, SessionHandle)> = self
                    .sessions
                    .iter()
                    .map(|entry| (entry.key().clone(), entry.value().handle.clone()))
                    .collect();
                debug!("Broadcasting {} to {} sessions", envelope, handles.len());
                for (id, handle) in handles {
                    if !handle.send_frame(frame.clone()) {
                        warn!("Dropped broadcast to {}: connection closed", id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Last-known remote address of a live session.
    pub fn session_addr(&self, device_id: &str) -> Option<SocketAddr> {
        self.sessions.get(device_id).map(|s| s.remote_addr)
    }

    /// Remote address of any live session, when the caller does not care
    /// which device.
    pub fn any_addr(&self) -> Option<SocketAddr> {
        self.sessions
            .iter()
            .next()
            .map(|entry| entry.value().remote_addr)
    }

    pub fn is_connected(&self) -> bool {
        !self.sessions.is_empty()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Observable aggregate flag: true while at least one entry remains.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    /// Close every session and clear the map.
    pub fn close_all(&self) {
        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().handle.clone())
            .collect();
        for handle in handles {
            handle.close();
        }
        self.sessions.clear();
        self.recompute_connected();
    }

    fn recompute_connected(&self) {
        self.connected_tx.send_if_modified(|connected| {
            let now = self.is_connected();
            if *connected != now {
                *connected = now;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{types, Envelope};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn handle_pair() -> (SessionHandle, UnboundedReceiver<SessionCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionHandle::new(tx), rx)
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn frames(rx: &mut UnboundedReceiver<SessionCommand>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let SessionCommand::Frame(frame) = cmd {
                out.push(frame);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let registry = SessionRegistry::new();
        let (handle_a, mut rx_a) = handle_pair();
        let (handle_b, mut rx_b) = handle_pair();
        registry.register("dev-A", handle_a, addr(1000));
        registry.register("dev-B", handle_b, addr(1001));

        let envelope = Envelope::new(types::NOTIFICATION).set("title", "hi");
        registry.send(None, &envelope).unwrap();

        let got_a = frames(&mut rx_a);
        let got_b = frames(&mut rx_b);
        assert_eq!(got_a.len(), 1);
        assert_eq!(got_a, got_b);
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_session() {
        let registry = SessionRegistry::new();
        let (handle_a, rx_a) = handle_pair();
        let (handle_b, mut rx_b) = handle_pair();
        registry.register("dev-A", handle_a, addr(1000));
        registry.register("dev-B", handle_b, addr(1001));

        // dev-A's write task died; its channel is gone
        drop(rx_a);

        let envelope = Envelope::new(types::NOTIFICATION).set("title", "still here");
        registry.send(None, &envelope).unwrap();
        assert_eq!(frames(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_unicast_to_unknown_device_is_dropped() {
        let registry = SessionRegistry::new();
        let envelope = Envelope::new(types::CLIPBOARD);
        registry.send(Some("ghost"), &envelope).unwrap();
    }

    #[tokio::test]
    async fn test_reregister_closes_superseded_handle() {
        let registry = SessionRegistry::new();
        let (old_handle, mut old_rx) = handle_pair();
        let (new_handle, mut new_rx) = handle_pair();
        registry.register("dev-A", old_handle, addr(1000));
        registry.register("dev-A", new_handle, addr(1002));

        assert!(matches!(old_rx.try_recv(), Ok(SessionCommand::Close)));
        assert_eq!(registry.count(), 1);

        let envelope = Envelope::new(types::CLIPBOARD);
        registry.send(Some("dev-A"), &envelope).unwrap();
        assert_eq!(frames(&mut new_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_stale_removal_does_not_evict_replacement() {
        let registry = SessionRegistry::new();
        let (old_handle, _old_rx) = handle_pair();
        let old_id = old_handle.id();
        let (new_handle, _new_rx) = handle_pair();
        registry.register("dev-A", old_handle, addr(1000));
        registry.register("dev-A", new_handle, addr(1002));

        // The superseded connection's teardown must not remove the new entry
        assert!(!registry.remove("dev-A", old_id));
        assert!(registry.is_connected());
    }

    #[tokio::test]
    async fn test_connected_flag_tracks_membership() {
        let registry = SessionRegistry::new();
        let mut connected = registry.subscribe_connected();
        assert!(!*connected.borrow());

        let (handle, _rx) = handle_pair();
        let handle_id = handle.id();
        registry.register("dev-A", handle, addr(1000));
        connected.changed().await.unwrap();
        assert!(*connected.borrow());

        registry.remove("dev-A", handle_id);
        connected.changed().await.unwrap();
        assert!(!*connected.borrow());
    }

    #[tokio::test]
    async fn test_close_all_clears_registry() {
        let registry = SessionRegistry::new();
        let (handle_a, mut rx_a) = handle_pair();
        registry.register("dev-A", handle_a, addr(1000));
        registry.close_all();

        assert_eq!(registry.count(), 0);
        assert!(!registry.is_connected());
        assert!(matches!(rx_a.try_recv(), Ok(SessionCommand::Close)));
    }
}
