//! Wires the engine together with explicit dependency injection so tests
//! can assemble isolated instances with independent crypto and registries.

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::device_service::DeviceManager;
use crate::application::file_service::FileTransferService;
use crate::application::pairing_service::PairingCoordinator;
use crate::config::{get_paired_devices_path, Settings};
use crate::core::engine::PhoneLink;
use crate::core::event_bus::EventBus;
use crate::core::status::StatusTracker;
use crate::domain::device::Identity;
use crate::error::Result;
use crate::infrastructure::connection::SessionRegistry;
use crate::infrastructure::discovery::DiscoveryBeacon;
use crate::infrastructure::security::CryptoEngine;
use crate::infrastructure::web::handlers::message_router::MessageRouter;
use crate::infrastructure::web::handlers::websocket::WebSocketHandler;
use crate::infrastructure::web::WebServer;
use crate::utils::helpers::device_model;

pub struct PhoneLinkBuilder {
    settings: Settings,
    identity: Option<Identity>,
    paired_device_store: Option<PathBuf>,
    persist_paired_devices: bool,
}

impl PhoneLinkBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            identity: None,
            paired_device_store: None,
            persist_paired_devices: true,
        }
    }

    /// Use a fixed identity instead of generating one.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Store paired devices at a specific path.
    pub fn with_paired_device_store(mut self, path: PathBuf) -> Self {
        self.paired_device_store = Some(path);
        self
    }

    /// Keep paired devices in memory only.
    pub fn without_persistence(mut self) -> Self {
        self.persist_paired_devices = false;
        self
    }

    pub fn build(self) -> Result<PhoneLink> {
        let settings = self.settings;
        let identity = self
            .identity
            .unwrap_or_else(|| Identity::generate(settings.device.alias.as_deref()));

        let events = EventBus::new();
        let status = Arc::new(StatusTracker::new());
        let crypto = Arc::new(CryptoEngine::new());
        let registry = SessionRegistry::new();

        let store_path = if self.persist_paired_devices {
            match self.paired_device_store {
                Some(path) => Some(path),
                None => Some(get_paired_devices_path()?),
            }
        } else {
            None
        };
        let devices = Arc::new(DeviceManager::new(store_path));

        let pairing = Arc::new(PairingCoordinator::new(
            crypto.clone(),
            events.clone(),
            settings.network.server_port,
        ));

        let router = Arc::new(MessageRouter::new(
            identity.clone(),
            pairing.clone(),
            registry.clone(),
            devices.clone(),
            crypto.clone(),
            status.clone(),
            events.clone(),
            settings.security.encrypt_clipboard,
        ));

        let ws_handler = Arc::new(WebSocketHandler::new(
            router.clone(),
            registry.clone(),
            status.clone(),
            events.clone(),
        ));
        let webserver = Arc::new(WebServer::new(
            settings.network.server_port,
            settings.transfer.download_dir.clone(),
            ws_handler,
        ));

        let beacon = Arc::new(DiscoveryBeacon::new(
            identity.display_name.clone(),
            device_model(),
            identity.device_id.clone(),
            settings.network.server_port,
        ));

        let transfer = Arc::new(FileTransferService::new(
            registry.clone(),
            devices.clone(),
            events.clone(),
            settings.network.transfer_port,
        ));

        Ok(PhoneLink::assemble(
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
            settings.security.encrypt_clipboard,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_without_persistence() {
        let engine = PhoneLinkBuilder::new(Settings::default())
            .with_identity(Identity {
                device_id: "pc-test-1".to_string(),
                display_name: "Test".to_string(),
            })
            .without_persistence()
            .build()
            .unwrap();
        assert_eq!(engine.identity().device_id, "pc-test-1");
        assert!(!engine.is_connected());
    }

    #[tokio::test]
    async fn test_two_isolated_engines_have_independent_crypto() {
        let a = PhoneLinkBuilder::new(Settings::default())
            .without_persistence()
            .build()
            .unwrap();
        let b = PhoneLinkBuilder::new(Settings::default())
            .without_persistence()
            .build()
            .unwrap();
        let (_, key_a) = a.generate_pairing_code().await;
        let (_, key_b) = b.generate_pairing_code().await;
        assert_ne!(key_a, key_b);
    }
}
