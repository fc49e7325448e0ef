pub mod session_registry;

pub use session_registry::{SessionCommand, SessionHandle, SessionRegistry};

pub type DeviceId = String;
