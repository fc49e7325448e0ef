//! Main orchestrator: owns every component and drives startup/shutdown.

use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use tokio::select;
use tokio::signal::ctrl_c;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::application::device_service::DeviceManager;
use crate::application::file_service::FileTransferService;
use crate::application::pairing_service::PairingCoordinator;
use crate::core::event_bus::{AppEvent, EventBus};
use crate::core::status::{ConnectionStatus, StatusTracker};
use crate::domain::device::Identity;
use crate::domain::paired_device::PairedDevice;
use crate::domain::pairing::PairingAdvertisement;
use crate::error::Result;
use crate::infrastructure::connection::SessionRegistry;
use crate::infrastructure::discovery::DiscoveryBeacon;
use crate::infrastructure::security::CryptoEngine;
use crate::infrastructure::web::handlers::message_router::{MessageCategory, MessageRouter};
use crate::infrastructure::web::WebServer;
use crate::message::{types, Envelope};

pub struct PhoneLink {
    pub(crate) identity: Identity,
    pub(crate) crypto: Arc<CryptoEngine>,
    pub(crate) events: EventBus,
    pub(crate) status: Arc<StatusTracker>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) devices: Arc<DeviceManager>,
    pub(crate) pairing: Arc<PairingCoordinator>,
    pub(crate) router: Arc<MessageRouter>,
    pub(crate) webserver: Arc<WebServer>,
    pub(crate) beacon: Arc<DiscoveryBeacon>,
    pub(crate) transfer: Arc<FileTransferService>,
    pub(crate) seal_clipboard: bool,
    discovery_forward: Mutex<Option<JoinHandle<()>>>,
}

impl PhoneLink {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        identity: Identity,
        crypto: Arc<CryptoEngine>,
        events: EventBus,
        status: Arc<StatusTracker>,
        registry: Arc<SessionRegistry>,
        devices: Arc<DeviceManager>,
        pairing: Arc<PairingCoordinator>,
        router: Arc<MessageRouter>,
        webserver: Arc<WebServer>,
        beacon: Arc<DiscoveryBeacon>,
        transfer: Arc<FileTransferService>,
        seal_clipboard: bool,
    ) -> Self {
        Self {
            identity,
            crypto,
            events,
            status,
            registry,
            devices,
            pairing,
            router,
            webserver,
            beacon,
            transfer,
            seal_clipboard,
            discovery_forward: Mutex::new(None),
        }
    }

    /// Start the session server and the discovery beacon.
    ///
    /// A port that will not bind is fatal; a discovery failure is logged and
    /// the server keeps running without presence announcements.
    pub async fn start(&self) -> Result<()> {
        info!("Starting phonelink engine as {}", self.identity);
        self.webserver.start().await?;

        if let Err(e) = self.beacon.start().await {
            error!("Failed to start discovery beacon: {}", e);
        } else {
            let mut peers = self.beacon.subscribe();
            let events = self.events.clone();
            let forwarder = tokio::spawn(async move {
                while let Ok(peer) = peers.recv().await {
                    events.publish(AppEvent::PeerDiscovered(peer));
                }
            });
            if let Some(old) = self.discovery_forward.lock().await.replace(forwarder) {
                old.abort();
            }
        }

        info!("Engine started");
        Ok(())
    }

    /// Stop everything: beacon, listener, every open session. Idempotent and
    /// callable from any task, including event subscribers.
    pub async fn stop(&self) {
        self.beacon.stop().await;
        if let Some(task) = self.discovery_forward.lock().await.take() {
            task.abort();
        }
        self.webserver.shutdown().await;
        self.registry.close_all();
        info!("Engine stopped");
    }

    /// Block until Ctrl-C, then stop.
    pub async fn wait_for_stop(&self) -> Result<()> {
        select! {
            _ = ctrl_c() => {
                info!("Received Ctrl+C, stopping...");
            }
        }
        self.stop().await;
        Ok(())
    }

    // ----- observation -----

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.registry.subscribe_connected()
    }

    pub fn subscribe_messages(
        &self,
        category: MessageCategory,
    ) -> tokio::sync::broadcast::Receiver<Envelope> {
        self.router.subscribe(category)
    }

    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    /// Bound session-server address; differs from the configured port when
    /// it was 0.
    pub async fn server_addr(&self) -> Option<std::net::SocketAddr> {
        self.webserver.bound_addr().await
    }

    // ----- pairing -----

    pub async fn generate_pairing_code(&self) -> (String, String) {
        self.pairing.generate_code().await
    }

    pub async fn pairing_advertisement(&self) -> Option<PairingAdvertisement> {
        self.pairing.advertisement().await
    }

    pub async fn paired_devices(&self) -> Vec<PairedDevice> {
        self.devices.all().await
    }

    pub async fn unpair(&self, device_id: &str) -> bool {
        self.devices.unpair(device_id).await
    }

    // ----- outbound messages -----

    /// Unicast to one device, or broadcast when `device_id` is `None`.
    pub fn send_message(&self, device_id: Option<&str>, envelope: &Envelope) -> Result<()> {
        self.registry.send(device_id, envelope)
    }

    /// Push clipboard text to the connected phone, sealing it with the
    /// session key when clipboard sealing is enabled and ready.
    pub async fn send_clipboard(&self, content: &str) -> Result<()> {
        let envelope = if self.seal_clipboard && self.crypto.is_ready().await {
            Envelope::new(types::CLIPBOARD)
                .set("content", self.crypto.encrypt(content).await?)
                .set("contentType", "text")
                .set("sealed", true)
        } else {
            Envelope::new(types::CLIPBOARD)
                .set("content", content)
                .set("contentType", "text")
        };
        self.registry.send(None, &envelope)
    }

    /// Ask the phone to send an SMS.
    pub fn send_sms(&self, number: &str, body: &str, sim_slot: Option<i64>) -> Result<()> {
        let mut envelope = Envelope::new(types::SMS_SEND)
            .set("number", number)
            .set("body", body);
        if let Some(slot) = sim_slot {
            envelope = envelope.set("simSlot", slot);
        }
        self.registry.send(None, &envelope)
    }

    /// Ask the phone to start a call.
    pub fn dial(&self, number: &str) -> Result<()> {
        let envelope = Envelope::new(types::CALL_DIAL).set("number", number);
        self.registry.send(None, &envelope)
    }

    /// Act on the phone's current call (answer, reject, hang up).
    pub fn call_action(&self, action: &str) -> Result<()> {
        let envelope = Envelope::new(types::CALL_ACTION).set("action", action);
        self.registry.send(None, &envelope)
    }

    /// Ask the phone for its SIM card list.
    pub fn request_sim_list(&self) -> Result<()> {
        self.registry.send(None, &Envelope::new(types::SIM_LIST_REQUEST))
    }

    // ----- file transfer -----

    pub async fn send_file(&self, device_id: Option<&str>, path: &Path) -> Result<()> {
        self.transfer.send_file(device_id, path).await
    }
}
