pub mod crypto_engine;

pub use crypto_engine::{CryptoEngine, CryptoError};
