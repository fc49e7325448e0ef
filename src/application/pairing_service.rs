//! Time-boxed pairing window.
//!
//! One six-digit code is valid at a time; generating a new one overwrites
//! the old. A code is accepted at most once and only before it expires.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::Rng;
use tokio::sync::Mutex;

use crate::core::event_bus::{AppEvent, EventBus};
use crate::domain::pairing::{PairingAdvertisement, PairingSession};
use crate::infrastructure::security::CryptoEngine;
use crate::utils::helpers::get_local_ip;

const CODE_TTL: i64 = 300;

pub struct PairingCoordinator {
    crypto: Arc<CryptoEngine>,
    events: EventBus,
    server_port: u16,
    // One active session at most; the mutex also serializes
    // generate/validate races.
    active: Mutex<Option<PairingSession>>,
}

impl PairingCoordinator {
    pub fn new(crypto: Arc<CryptoEngine>, events: EventBus, server_port: u16) -> Self {
        Self {
            crypto,
            events,
            server_port,
            active: Mutex::new(None),
        }
    }

    /// Open a new pairing window: fresh six-digit code, fresh key pair,
    /// 300-second expiry. Any previous window is discarded.
    pub async fn generate_code(&self) -> (String, String) {
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000));
        let public_key = self.crypto.generate_key_pair().await;
        let expires_at = Utc::now() + Duration::seconds(CODE_TTL);

        *self.active.lock().await = Some(PairingSession {
            code: code.clone(),
            public_key: public_key.clone(),
            expires_at,
        });

        info!("Generated pairing code: {}", code);
        self.events.publish(AppEvent::PairingCodeGenerated {
            code: code.clone(),
            expires_at,
        });
        (code, public_key)
    }

    /// Payload for the scannable pairing code; rendering is external.
    ///
    /// `None` when no pairing window is open.
    pub async fn advertisement(&self) -> Option<PairingAdvertisement> {
        let active = self.active.lock().await;
        active.as_ref().map(|session| PairingAdvertisement {
            ip: get_local_ip(),
            port: self.server_port,
            code: session.code.clone(),
            key: session.public_key.clone(),
        })
    }

    /// Validate an incoming pairing attempt against the active window.
    ///
    /// Exact string comparison, no normalization. On acceptance the window
    /// is consumed (single use) and the peer's public key — when present —
    /// is run through key agreement so the session key is ready.
    pub async fn validate(
        &self,
        code: &str,
        device_id: &str,
        peer_public_key: Option<&str>,
    ) -> bool {
        let accepted = self.validate_at(code, device_id, Utc::now()).await;
        if accepted {
            if let Some(key) = peer_public_key {
                if let Err(e) = self.crypto.derive_shared_key_b64(key).await {
                    warn!("Key agreement with {} failed: {}", device_id, e);
                }
            }
        }
        accepted
    }

    /// Clock-injected core of [`validate`](Self::validate).
    pub async fn validate_at(&self, code: &str, device_id: &str, now: DateTime<Utc>) -> bool {
        let mut active = self.active.lock().await;
        let Some(session) = active.as_ref() else {
            warn!("Pairing attempt with no active code");
            return false;
        };

        if session.is_expired(now) {
            warn!("Pairing code expired");
            *active = None;
            return false;
        }

        if code != session.code {
            warn!(
                "Invalid pairing code: received '{}', expected '{}'",
                code, session.code
            );
            return false;
        }

        // Single use: consume on first success
        *active = None;
        info!("Pairing validated for device: {}", device_id);
        true
    }

    #[cfg(test)]
    pub(crate) async fn force_expiry(&self, expires_at: DateTime<Utc>) {
        if let Some(session) = self.active.lock().await.as_mut() {
            session.expires_at = expires_at;
        }
    }
}
