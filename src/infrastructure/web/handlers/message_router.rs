//! Typed dispatch for session frames.
//!
//! Frames arriving on a connection are handled in arrival order. Built-in
//! protocol behavior (heartbeat replies, pairing, file-offer acceptance)
//! runs first; every decoded frame is then fanned out to the subscribers of
//! its category, so multiple feature collaborators can observe one type.
//! Unknown types are logged and ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::application::device_service::DeviceManager;
use crate::application::pairing_service::PairingCoordinator;
use crate::core::event_bus::{AppEvent, EventBus};
use crate::core::status::StatusTracker;
use crate::domain::device::Identity;
use crate::infrastructure::connection::{SessionHandle, SessionRegistry};
use crate::infrastructure::security::CryptoEngine;
use crate::message::{types, Envelope};

/// Feature categories a subscriber can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    Heartbeat,
    Pairing,
    Notification,
    Sms,
    Call,
    Clipboard,
    File,
    SimList,
    Error,
}

impl MessageCategory {
    pub fn of(message_type: &str) -> Option<Self> {
        match message_type {
            types::HEARTBEAT => Some(Self::Heartbeat),
            types::PAIRING_REQUEST | types::PAIRING_RESPONSE => Some(Self::Pairing),
            types::NOTIFICATION | types::NOTIFICATION_ACTION => Some(Self::Notification),
            types::SMS_LIST | types::SMS_MESSAGES | types::SMS_SEND | types::SMS_RECEIVED => {
                Some(Self::Sms)
            }
            types::CALL_STATE | types::CALL_ACTION | types::CALL_DIAL => Some(Self::Call),
            types::CLIPBOARD => Some(Self::Clipboard),
            types::FILE_OFFER | types::FILE_ACCEPT | types::FILE_CHUNK | types::FILE_COMPLETE => {
                Some(Self::File)
            }
            types::SIM_LIST | types::SIM_LIST_REQUEST => Some(Self::SimList),
            types::ERROR => Some(Self::Error),
            _ => None,
        }
    }
}

/// Per-connection state handed to the router with every frame.
pub struct ConnectionContext {
    pub remote_addr: SocketAddr,
    pub handle: SessionHandle,
    /// Device id bound to this connection once pairing succeeds.
    pub bound_device: StdMutex<Option<String>>,
}

impl ConnectionContext {
    pub fn new(remote_addr: SocketAddr, handle: SessionHandle) -> Self {
        Self {
            remote_addr,
            handle,
            bound_device: StdMutex::new(None),
        }
    }

    /// Reply on this connection, preserving arrival order.
    pub fn reply(&self, envelope: &Envelope) {
        match envelope.to_json() {
            Ok(frame) => {
                if !self.handle.send_frame(frame) {
                    warn!("Failed to reply on closed connection {}", self.remote_addr);
                }
            }
            Err(e) => error!("Failed to encode reply: {}", e),
        }
    }

    pub fn bound_device(&self) -> Option<String> {
        self.bound_device.lock().unwrap().clone()
    }
}

pub struct MessageRouter {
    identity: Identity,
    pairing: Arc<PairingCoordinator>,
    registry: Arc<SessionRegistry>,
    devices: Arc<DeviceManager>,
    crypto: Arc<CryptoEngine>,
    status: Arc<StatusTracker>,
    events: EventBus,
    unseal_clipboard: bool,
    subscribers: RwLock<HashMap<MessageCategory, broadcast::Sender<Envelope>>>,
}

impl MessageRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Identity,
        pairing: Arc<PairingCoordinator>,
        registry: Arc<SessionRegistry>,
        devices: Arc<DeviceManager>,
        crypto: Arc<CryptoEngine>,
        status: Arc<StatusTracker>,
        events: EventBus,
        unseal_clipboard: bool,
    ) -> Self {
        Self {
            identity,
            pairing,
            registry,
            devices,
            crypto,
            status,
            events,
            unseal_clipboard,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a subscriber to one category. Any number of subscribers may
    /// listen to the same category.
    pub fn subscribe(&self, category: MessageCategory) -> broadcast::Receiver<Envelope> {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers
            .entry(category)
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }

    /// Handle one decoded frame from a connection.
    pub async fn route(&self, ctx: &ConnectionContext, envelope: Envelope) {
        debug!("Handling message type: {}", envelope.message_type);

        let Some(category) = MessageCategory::of(&envelope.message_type) else {
            warn!("Unknown message type: {}", envelope.message_type);
            return;
        };

        let envelope = match category {
            MessageCategory::Heartbeat => {
                self.handle_heartbeat(ctx, envelope).await
            }
            MessageCategory::Pairing if envelope.message_type == types::PAIRING_REQUEST => {
                self.handle_pairing_request(ctx, envelope).await
            }
            MessageCategory::File if envelope.message_type == types::FILE_OFFER => {
                self.handle_file_offer(ctx, envelope)
            }
            MessageCategory::Clipboard => self.handle_clipboard(envelope).await,
            MessageCategory::Error => {
                error!(
                    "Device error: {} - {}",
                    envelope.data_str("code").unwrap_or("?"),
                    envelope.data_str("message").unwrap_or("?")
                );
                envelope
            }
            _ => envelope,
        };

        self.publish(category, envelope);
    }

    fn publish(&self, category: MessageCategory, envelope: Envelope) {
        let sender = {
            let subscribers = self.subscribers.read().unwrap();
            subscribers.get(&category).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(envelope);
        }
    }

    /// Battery level is optional and loosely typed: numbers and numeric
    /// strings are accepted, anything else leaves the last value unchanged.
    /// Every heartbeat draws an immediate reply carrying the current time.
    async fn handle_heartbeat(&self, ctx: &ConnectionContext, envelope: Envelope) -> Envelope {
        if let Some(level) = envelope.data.get("battery").and_then(parse_battery) {
            self.status.battery_updated(level);
            self.events.publish(AppEvent::BatteryUpdated { level });
        }

        let reply = Envelope::new(types::HEARTBEAT).set("timestamp", Utc::now().timestamp_millis());
        ctx.reply(&reply);
        envelope
    }

    async fn handle_pairing_request(
        &self,
        ctx: &ConnectionContext,
        envelope: Envelope,
    ) -> Envelope {
        let code = envelope.data_str("code").unwrap_or_default().to_string();
        let device_id = envelope.data_str("deviceId").unwrap_or_default().to_string();
        let device_name = envelope
            .data_str("deviceName")
            .unwrap_or("Unknown Device")
            .to_string();
        let device_model = envelope.data_str("deviceModel").map(str::to_string);
        let public_key = envelope.data_str("publicKey").map(str::to_string);

        info!("Pairing request from: {} with code: {}", device_name, code);

        let accepted = !device_id.is_empty()
            && self
                .pairing
                .validate(&code, &device_id, public_key.as_deref())
                .await;

        let mut reply = Envelope::new(types::PAIRING_RESPONSE).set("success", accepted);

        if accepted {
            self.registry
                .register(&device_id, ctx.handle.clone(), ctx.remote_addr);
            *ctx.bound_device.lock().unwrap() = Some(device_id.clone());

            self.devices
                .record_connected(
                    &device_id,
                    &device_name,
                    device_model.as_deref(),
                    Some(&ctx.remote_addr.ip().to_string()),
                )
                .await;
            self.status.device_connected(&device_name);
            self.events.publish(AppEvent::DeviceConnected {
                device_id: device_id.clone(),
                device_name: device_name.clone(),
            });

            reply = reply
                .set("deviceId", self.identity.device_id.clone())
                .set("deviceName", self.identity.display_name.clone());
            info!("Pairing successful with: {}", device_name);
        } else {
            warn!("Pairing failed - invalid code");
        }

        ctx.reply(&reply);
        envelope
    }

    /// Incoming offers are accepted automatically; the body arrives on the
    /// bulk endpoint, not over the session socket.
    fn handle_file_offer(&self, ctx: &ConnectionContext, envelope: Envelope) -> Envelope {
        let Some(file_name) = envelope.data_str("fileName").filter(|name| !name.is_empty())
        else {
            warn!("Received file offer with no fileName");
            return envelope;
        };
        info!("Received file offer: {}", file_name);

        let mut accept = Envelope::new(types::FILE_ACCEPT).set("fileName", file_name);
        if let Some(uri) = envelope.data_str("uri") {
            accept = accept.set("uri", uri);
        }
        ctx.reply(&accept);
        envelope
    }

    /// When clipboard sealing is enabled, frames marked `sealed` carry
    /// AEAD-protected content; unseal before fan-out so subscribers see
    /// plaintext. A frame that fails to open keeps its sealed content and
    /// the failure is logged.
    async fn handle_clipboard(&self, mut envelope: Envelope) -> Envelope {
        if !self.unseal_clipboard || envelope.data_bool("sealed") != Some(true) {
            return envelope;
        }

        let Some(content) = envelope.data_str("content").map(str::to_string) else {
            return envelope;
        };
        match self.crypto.decrypt(&content).await {
            Ok(plaintext) => {
                envelope.data.insert("content".to_string(), Value::String(plaintext));
                envelope.data.remove("sealed");
            }
            Err(e) => {
                warn!("Failed to unseal clipboard content: {}", e);
            }
        }
        envelope
    }
}

fn parse_battery(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().map(|level| level as i32),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
