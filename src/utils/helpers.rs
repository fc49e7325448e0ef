use chrono::Utc;
use local_ip_address::local_ip;
use log::warn;

/// Generate the process-wide device id.
///
/// Combines the OS user with the startup timestamp so that ids stay distinct
/// across restarts of the same installation. Not globally unique.
pub fn generate_device_id() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string());
    format!("pc-{}-{}", user, Utc::now().timestamp_millis())
}

/// Human-readable name for this machine, shown on the paired phone.
pub fn local_host_name() -> String {
    gethostname::gethostname()
        .to_string_lossy()
        .trim()
        .to_string()
}

/// Best-effort local IPv4 address, falling back to loopback.
pub fn get_local_ip() -> String {
    match local_ip() {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            warn!("Failed to resolve local IP address: {}", e);
            "127.0.0.1".to_string()
        }
    }
}

/// OS name used as the advertised device model.
pub fn device_model() -> String {
    std::env::consts::OS.to_string()
}
