pub mod setting;
pub mod utils;

pub use setting::Settings;
pub use utils::{get_config_dir, get_config_path, get_paired_devices_path};
