//! phonelink — desktop companion endpoint for a paired phone on the same
//! local network.
//!
//! The engine discovers candidate devices over UDP multicast, establishes a
//! cryptographically authenticated session through a time-boxed pairing
//! code, keeps a duplex message channel per device, and routes typed
//! protocol messages to feature subscribers. Large payloads travel over a
//! separate bulk endpoint instead of the session socket.
//!
//! Window rendering, tray icons, theming and QR rendering are external
//! collaborators: they consume the events, status snapshots and payloads
//! this crate produces.

pub mod application;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod message;
pub mod utils;

pub use crate::core::{PhoneLink, PhoneLinkBuilder};
pub use config::Settings;
pub use error::{AppError, Result};
pub use message::{types, Envelope};
