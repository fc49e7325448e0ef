//! Outbound bulk file transfer.
//!
//! A send first announces the file over the session channel with a
//! FILE_OFFER, then streams the bytes in a single upload to the peer's bulk
//! endpoint. Progress is reported as a fraction of bytes written and always
//! ends at exactly 1.0 on success. A failed upload is not retried.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::TryStreamExt;
use log::info;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::io::ReaderStream;

use crate::application::device_service::DeviceManager;
use crate::core::event_bus::{AppEvent, EventBus};
use crate::error::{AppError, Result};
use crate::infrastructure::connection::SessionRegistry;
use crate::message::{types, Envelope};

pub struct FileTransferService {
    registry: Arc<SessionRegistry>,
    devices: Arc<DeviceManager>,
    events: EventBus,
    transfer_port: u16,
    client: reqwest::Client,
}

impl FileTransferService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        devices: Arc<DeviceManager>,
        events: EventBus,
        transfer_port: u16,
    ) -> Self {
        Self {
            registry,
            devices,
            events,
            transfer_port,
            client: reqwest::Client::new(),
        }
    }

    /// Send one file to `device_id`, or to the connected device when `None`.
    pub async fn send_file(&self, device_id: Option<&str>, path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(AppError::transfer(format!(
                "not a file: {}",
                path.display()
            )));
        }
        let total = metadata.len();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| AppError::transfer("file has no printable name"))?
            .to_string();

        // Announce on the session channel before the bulk upload starts
        let offer = Envelope::new(types::FILE_OFFER)
            .set("fileName", file_name.clone())
            .set("fileSize", total)
            .set("filePath", path.to_string_lossy().to_string());
        self.registry.send(device_id, &offer)?;

        let host = self.resolve_peer_ip(device_id).await?;
        self.upload(&host, &file_name, path, total).await
    }

    /// Prefer the live session's remote address; fall back to the paired
    /// device's last known IP.
    async fn resolve_peer_ip(&self, device_id: Option<&str>) -> Result<String> {
        let session_ip = match device_id {
            Some(id) => self.registry.session_addr(id),
            None => self.registry.any_addr(),
        }
        .map(|addr| addr.ip().to_string());

        if let Some(ip) = session_ip {
            return Ok(ip);
        }
        if let Some(id) = device_id {
            if let Some(ip) = self.devices.last_ip(id).await {
                return Ok(ip);
            }
        }
        Err(AppError::transfer("device IP not available"))
    }

    async fn upload(&self, host: &str, file_name: &str, path: &Path, total: u64) -> Result<()> {
        let url = format!("http://{}:{}/upload", host, self.transfer_port);
        info!("Uploading {} ({} bytes) to {}", file_name, total, url);

        let file = tokio::fs::File::open(path).await?;
        let sent = Arc::new(AtomicU64::new(0));
        let progress_sent = sent.clone();
        let progress_events = self.events.clone();
        let progress_name = file_name.to_string();

        let body_stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            let sent_now = progress_sent.fetch_add(chunk.len() as u64, Ordering::Relaxed)
                + chunk.len() as u64;
            progress_events.publish(AppEvent::TransferProgress {
                file_name: progress_name.clone(),
                sent: sent_now,
                total,
                fraction: fraction(sent_now, total),
            });
        });

        let response = self
            .client
            .post(&url)
            .query(&[("filename", file_name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body_stream))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::transfer(format!(
                "server returned: {}",
                response.status().as_u16()
            )));
        }

        // Completion is reported as exactly 100%
        self.events.publish(AppEvent::TransferProgress {
            file_name: file_name.to_string(),
            sent: total,
            total,
            fraction: 1.0,
        });
        info!("Upload of {} finished", file_name);
        Ok(())
    }
}

fn fraction(sent: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        sent as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_handles_empty_file() {
        assert_eq!(fraction(0, 0), 1.0);
    }

    #[test]
    fn test_fraction_is_monotonic() {
        assert!(fraction(1, 10) < fraction(5, 10));
        assert_eq!(fraction(10, 10), 1.0);
    }

    #[tokio::test]
    async fn test_send_missing_file_fails() {
        let service = FileTransferService::new(
            SessionRegistry::new(),
            Arc::new(DeviceManager::in_memory()),
            EventBus::new(),
            8766,
        );
        let result = service
            .send_file(None, Path::new("/no/such/file.bin"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_send_without_peer_address_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "content").unwrap();

        let service = FileTransferService::new(
            SessionRegistry::new(),
            Arc::new(DeviceManager::in_memory()),
            EventBus::new(),
            8766,
        );
        let result = service.send_file(None, &path).await;
        assert!(matches!(result, Err(AppError::Transfer(_))));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_paired_device_ip() {
        let devices = Arc::new(DeviceManager::in_memory());
        devices
            .record_connected("dev-1", "Pixel 9", None, Some("10.0.0.7"))
            .await;
        let service = FileTransferService::new(
            SessionRegistry::new(),
            devices,
            EventBus::new(),
            8766,
        );
        assert_eq!(
            service.resolve_peer_ip(Some("dev-1")).await.unwrap(),
            "10.0.0.7"
        );
    }
}
