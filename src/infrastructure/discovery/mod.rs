pub mod beacon;

pub use beacon::{DiscoveryBeacon, DISCOVERY_PORT, MULTICAST_ADDRESS};
