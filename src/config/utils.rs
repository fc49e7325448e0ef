use std::fs;
use std::path::PathBuf;

use crate::error::{AppError, Result};

const CONFIG_DIR_NAME: &str = "phonelink";
const CONFIG_FILE_NAME: &str = "config.json";
const PAIRED_DEVICES_FILE_NAME: &str = "paired_devices.json";

/// Platform config directory for phonelink, created on first use.
pub fn get_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| AppError::config("No platform config directory available"))?;
    let dir = base.join(CONFIG_DIR_NAME);
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn get_paired_devices_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(PAIRED_DEVICES_FILE_NAME))
}
