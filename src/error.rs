//! Unified error type for the phonelink engine.
//!
//! Components return `error::Result<T>`; each variant names the domain that
//! failed so callers can distinguish startup-fatal conditions (a port that
//! would not bind) from recoverable ones without string matching.

use std::fmt;

use crate::infrastructure::security::CryptoError;

#[derive(Debug)]
pub enum AppError {
    /// Discovery beacon errors (multicast bind/join, datagram I/O)
    Discovery(String),

    /// Pairing errors (no active code, key material unavailable)
    Pairing(String),

    /// Session/connection errors (bind failure, dead handles)
    Connection(String),

    /// Bulk file transfer errors (upload rejected, peer unreachable)
    Transfer(String),

    /// Cryptographic failures, carried through from the crypto engine
    Crypto(CryptoError),

    /// Configuration errors (unreadable config dir, invalid values)
    Config(String),

    /// I/O errors (file read/write)
    Io(String),

    /// Anything that does not fit the categories above
    Internal(String),
}

impl AppError {
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    pub fn pairing(msg: impl Into<String>) -> Self {
        Self::Pairing(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Discovery(msg) => write!(f, "Discovery error: {}", msg),
            AppError::Pairing(msg) => write!(f, "Pairing error: {}", msg),
            AppError::Connection(msg) => write!(f, "Connection error: {}", msg),
            AppError::Transfer(msg) => write!(f, "Transfer error: {}", msg),
            AppError::Crypto(err) => write!(f, "Crypto error: {}", err),
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        AppError::Crypto(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transfer(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_domain() {
        let err = AppError::pairing("no active code");
        let display = format!("{}", err);
        assert!(display.contains("Pairing error"));
        assert!(display.contains("no active code"));
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_from_crypto() {
        let app_err: AppError = CryptoError::NotReady.into();
        assert!(matches!(app_err, AppError::Crypto(CryptoError::NotReady)));
    }
}
