pub mod device;
pub mod discovery;
pub mod paired_device;
pub mod pairing;

pub use device::Identity;
pub use discovery::{DiscoveredPeer, DiscoveryAnnouncement};
pub use paired_device::PairedDevice;
pub use pairing::{PairingAdvertisement, PairingSession};
