//! UDP multicast presence beacon.
//!
//! Announces this endpoint every five seconds and listens for peer
//! announcements on the same group. Replies to announcements are unicast so
//! that peers on networks without working multicast egress still learn about
//! us. Announcements carrying our own fingerprint are discarded.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::domain::discovery::{DiscoveredPeer, DiscoveryAnnouncement};
use crate::error::{AppError, Result};

pub const MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 167);
pub const DISCOVERY_PORT: u16 = 53318;

const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);
const RECV_BUFFER_SIZE: usize = 4096;

struct BeaconState {
    multicast: Arc<UdpSocket>,
    announce_task: JoinHandle<()>,
    listen_task: JoinHandle<()>,
}

pub struct DiscoveryBeacon {
    alias: String,
    device_model: String,
    fingerprint: String,
    server_port: u16,
    running: Arc<AtomicBool>,
    peers_tx: broadcast::Sender<DiscoveredPeer>,
    state: Mutex<Option<BeaconState>>,
}

impl DiscoveryBeacon {
    pub fn new(
        alias: impl Into<String>,
        device_model: impl Into<String>,
        fingerprint: impl Into<String>,
        server_port: u16,
    ) -> Self {
        let (peers_tx, _) = broadcast::channel(32);
        Self {
            alias: alias.into(),
            device_model: device_model.into(),
            fingerprint: fingerprint.into(),
            server_port,
            running: Arc::new(AtomicBool::new(false)),
            peers_tx,
            state: Mutex::new(None),
        }
    }

    /// Peers surfaced by the listen loop.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveredPeer> {
        self.peers_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the sockets and start both loops.
    ///
    /// Bind or group-join failure aborts startup; partially opened sockets
    /// are dropped before returning the error.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Discovery beacon already running");
            return Ok(());
        }

        let multicast = match Self::open_multicast_socket() {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let unicast = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(AppError::discovery(format!(
                    "failed to bind unicast socket: {}",
                    e
                )));
            }
        };

        let announce_task = self.spawn_announce_loop(multicast.clone());
        let listen_task = self.spawn_listen_loop(multicast.clone(), unicast);

        *self.state.lock().await = Some(BeaconState {
            multicast,
            announce_task,
            listen_task,
        });

        info!(
            "Discovery beacon started on {}:{}",
            MULTICAST_ADDRESS, DISCOVERY_PORT
        );
        Ok(())
    }

    /// Stop both loops, leave the group and close the sockets. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(state) = self.state.lock().await.take() {
            state.announce_task.abort();
            state.listen_task.abort();
            if let Err(e) = state
                .multicast
                .leave_multicast_v4(MULTICAST_ADDRESS, Ipv4Addr::UNSPECIFIED)
            {
                warn!("Error leaving multicast group: {}", e);
            }
        }

        info!("Discovery beacon stopped");
    }

    fn open_multicast_socket() -> Result<UdpSocket> {
        let std_socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT))
            .map_err(|e| {
                AppError::discovery(format!("failed to bind {}: {}", DISCOVERY_PORT, e))
            })?;
        std_socket
            .join_multicast_v4(&MULTICAST_ADDRESS, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| AppError::discovery(format!("failed to join multicast group: {}", e)))?;
        std_socket
            .set_nonblocking(true)
            .map_err(|e| AppError::discovery(format!("failed to set nonblocking: {}", e)))?;
        UdpSocket::from_std(std_socket)
            .map_err(|e| AppError::discovery(format!("failed to register socket: {}", e)))
    }

    fn build_announcement(&self, announce: bool) -> DiscoveryAnnouncement {
        DiscoveryAnnouncement::new(
            self.alias.clone(),
            self.device_model.clone(),
            self.fingerprint.clone(),
            self.server_port,
            announce,
        )
    }

    fn spawn_announce_loop(&self, socket: Arc<UdpSocket>) -> JoinHandle<()> {
        let running = self.running.clone();
        let announcement = self.build_announcement(true);

        tokio::spawn(async move {
            let mut ticker = interval(ANNOUNCE_INTERVAL);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                let json = match serde_json::to_vec(&announcement) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode announcement: {}", e);
                        continue;
                    }
                };
                if let Err(e) = socket
                    .send_to(&json, (MULTICAST_ADDRESS, DISCOVERY_PORT))
                    .await
                {
                    if running.load(Ordering::SeqCst) {
                        error!("Failed to send announcement: {}", e);
                    }
                } else {
                    debug!("Sent announcement");
                }
            }
        })
    }

    fn spawn_listen_loop(
        &self,
        multicast: Arc<UdpSocket>,
        unicast: Arc<UdpSocket>,
    ) -> JoinHandle<()> {
        let running = self.running.clone();
        let fingerprint = self.fingerprint.clone();
        let peers_tx = self.peers_tx.clone();
        let reply = self.build_announcement(false);

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
            while running.load(Ordering::SeqCst) {
                let (len, sender) = match multicast.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        if running.load(Ordering::SeqCst) {
                            error!("Socket error while listening: {}", e);
                        }
                        continue;
                    }
                };

                let Some((peer, wants_reply)) =
                    Self::evaluate_datagram(&buffer[..len], sender.ip(), &fingerprint)
                else {
                    continue;
                };

                info!(
                    "Discovered device: {} ({}) at {}:{}",
                    peer.alias, peer.device_type, peer.ip, peer.port
                );
                let _ = peers_tx.send(peer);

                if wants_reply {
                    match serde_json::to_vec(&reply) {
                        Ok(json) => {
                            if let Err(e) = unicast
                                .send_to(&json, SocketAddr::new(sender.ip(), DISCOVERY_PORT))
                                .await
                            {
                                error!("Failed to send discovery reply to {}: {}", sender.ip(), e);
                            } else {
                                debug!("Sent discovery reply to {}", sender.ip());
                            }
                        }
                        Err(e) => error!("Failed to encode discovery reply: {}", e),
                    }
                }
            }
        })
    }

    /// Parse one datagram and decide what to do with it.
    ///
    /// Returns the discovered peer and whether the sender expects a unicast
    /// reply. `None` for malformed payloads and for our own echoes.
    fn evaluate_datagram(
        payload: &[u8],
        sender_ip: IpAddr,
        self_fingerprint: &str,
    ) -> Option<(DiscoveredPeer, bool)> {
        let announcement: DiscoveryAnnouncement = match serde_json::from_slice(payload) {
            Ok(announcement) => announcement,
            Err(e) => {
                warn!(
                    "Failed to parse discovery message from {}: {}",
                    sender_ip, e
                );
                return None;
            }
        };

        if announcement.fingerprint == self_fingerprint {
            return None;
        }

        let wants_reply = announcement.announce;
        let peer = DiscoveredPeer {
            alias: announcement.alias,
            device_model: announcement.device_model,
            device_type: announcement.device_type,
            fingerprint: announcement.fingerprint,
            ip: sender_ip.to_string(),
            port: announcement.port,
        };
        Some((peer, wants_reply))
    }
}
