//! Session crypto: P-256 key agreement plus AES-256-GCM sealing.
//!
//! Key material lives in process memory only and is owned exclusively by the
//! engine instance; the private key is never serialized. Each instance is
//! independent so tests can run isolated engines side by side.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Peer key was malformed or no local key pair exists yet.
    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    /// Encrypt was called before a shared key was established.
    #[error("no shared key established")]
    NotReady,

    /// Ciphertext failed authentication (tampered, corrupted, or wrong key).
    #[error("authentication failed")]
    Authentication,
}

pub struct CryptoEngine {
    key_pair: RwLock<Option<EphemeralSecret>>,
    shared_key: RwLock<Option<[u8; 32]>>,
}

impl CryptoEngine {
    pub fn new() -> Self {
        Self {
            key_pair: RwLock::new(None),
            shared_key: RwLock::new(None),
        }
    }

    /// Generate a fresh P-256 key pair, replacing any previous one.
    ///
    /// Returns the public key as base64 over the uncompressed SEC1 point.
    /// A previously derived shared key is invalidated: it belonged to the
    /// key pair being replaced.
    pub async fn generate_key_pair(&self) -> String {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false);
        let encoded = BASE64.encode(public.as_bytes());

        *self.key_pair.write().await = Some(secret);
        *self.shared_key.write().await = None;
        encoded
    }

    /// Run ECDH against the peer's public key and derive the symmetric key
    /// by hashing the raw shared secret with SHA-256.
    pub async fn derive_shared_key(&self, peer_public_key: &[u8]) -> Result<(), CryptoError> {
        let peer = PublicKey::from_sec1_bytes(peer_public_key)
            .map_err(|e| CryptoError::KeyAgreement(format!("invalid peer public key: {}", e)))?;

        let key_pair = self.key_pair.read().await;
        let secret = key_pair
            .as_ref()
            .ok_or_else(|| CryptoError::KeyAgreement("no local key pair generated".to_string()))?;

        let shared = secret.diffie_hellman(&peer);
        let derived: [u8; 32] = Sha256::digest(shared.raw_secret_bytes()).into();
        drop(key_pair);

        *self.shared_key.write().await = Some(derived);
        Ok(())
    }

    /// Convenience wrapper for base64-encoded peer keys.
    pub async fn derive_shared_key_b64(&self, peer_public_key: &str) -> Result<(), CryptoError> {
        let bytes = BASE64
            .decode(peer_public_key)
            .map_err(|e| CryptoError::KeyAgreement(format!("invalid base64 key: {}", e)))?;
        self.derive_shared_key(&bytes).await
    }

    /// Seal a plaintext with a fresh random nonce.
    ///
    /// Output is base64 over `nonce || ciphertext` with a 128-bit tag.
    pub async fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let key = self.get_key().await?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Authentication)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Open a sealed blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Any corruption — bad base64, truncated nonce, failed tag check,
    /// invalid UTF-8 — yields `Authentication`; altered plaintext is never
    /// returned.
    pub async fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        let key = self.get_key().await?;
        let combined = BASE64.decode(blob).map_err(|_| CryptoError::Authentication)?;
        if combined.len() < NONCE_LEN {
            return Err(CryptoError::Authentication);
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Authentication)
    }

    pub async fn is_ready(&self) -> bool {
        self.shared_key.read().await.is_some()
    }

    async fn get_key(&self) -> Result<[u8; 32], CryptoError> {
        self.shared_key.read().await.ok_or(CryptoError::NotReady)
    }
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two engines agreeing on each other's public keys derive the same
    /// symmetric key.
    async fn paired_engines() -> (CryptoEngine, CryptoEngine) {
        let alice = CryptoEngine::new();
        let bob = CryptoEngine::new();
        let alice_pub = alice.generate_key_pair().await;
        let bob_pub = bob.generate_key_pair().await;
        alice.derive_shared_key_b64(&bob_pub).await.unwrap();
        bob.derive_shared_key_b64(&alice_pub).await.unwrap();
        (alice, bob)
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_round_trip() {
        let (alice, bob) = paired_engines().await;
        for plaintext in ["hello phone", "", "日本語テキスト", "a\nb\tc"] {
            let sealed = alice.encrypt(plaintext).await.unwrap();
            assert_ne!(sealed, plaintext);
            let opened = bob.decrypt(&sealed).await.unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[tokio::test]
    async fn test_fresh_nonce_per_call() {
        let (alice, _) = paired_engines().await;
        let a = alice.encrypt("same input").await.unwrap();
        let b = alice.encrypt("same input").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_tampered_blob_fails_authentication() {
        let (alice, bob) = paired_engines().await;
        let sealed = alice.encrypt("sensitive").await.unwrap();

        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);

        assert_eq!(
            bob.decrypt(&tampered).await,
            Err(CryptoError::Authentication)
        );
    }

    #[tokio::test]
    async fn test_garbage_blob_fails_authentication() {
        let (_, bob) = paired_engines().await;
        assert_eq!(
            bob.decrypt("not base64 at all!!!").await,
            Err(CryptoError::Authentication)
        );
        assert_eq!(bob.decrypt("AAAA").await, Err(CryptoError::Authentication));
    }

    #[tokio::test]
    async fn test_encrypt_before_agreement_is_not_ready() {
        let engine = CryptoEngine::new();
        engine.generate_key_pair().await;
        assert_eq!(
            engine.encrypt("too early").await,
            Err(CryptoError::NotReady)
        );
    }

    #[tokio::test]
    async fn test_agreement_without_key_pair_fails() {
        let lonely = CryptoEngine::new();
        let other = CryptoEngine::new();
        let other_pub = other.generate_key_pair().await;
        let result = lonely.derive_shared_key_b64(&other_pub).await;
        assert!(matches!(result, Err(CryptoError::KeyAgreement(_))));
    }

    #[tokio::test]
    async fn test_agreement_with_malformed_key_fails() {
        let engine = CryptoEngine::new();
        engine.generate_key_pair().await;
        let result = engine.derive_shared_key(&[0u8; 10]).await;
        assert!(matches!(result, Err(CryptoError::KeyAgreement(_))));
        assert!(matches!(
            engine.derive_shared_key_b64("!!!").await,
            Err(CryptoError::KeyAgreement(_))
        ));
    }

    #[tokio::test]
    async fn test_regenerating_key_pair_clears_shared_key() {
        let (alice, _) = paired_engines().await;
        assert!(alice.is_ready().await);
        alice.generate_key_pair().await;
        assert!(!alice.is_ready().await);
    }
}
