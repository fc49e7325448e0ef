pub mod device_service;
pub mod file_service;
pub mod pairing_service;

pub use device_service::DeviceManager;
pub use file_service::FileTransferService;
pub use pairing_service::PairingCoordinator;
