//! HTTP server hosting the session upgrade endpoint and the bulk upload
//! route on one port.
//!
//! A plain `POST /upload` is handled before any upgrade; `GET /phonelink`
//! upgrades to the persistent duplex session channel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{oneshot, Mutex};
use warp::Filter;

use super::handlers::websocket::WebSocketHandler;
use super::routes::upload;
use crate::error::{AppError, Result};

pub const SESSION_PATH: &str = "phonelink";

struct RunningServer {
    shutdown_tx: oneshot::Sender<()>,
    bound_addr: SocketAddr,
}

pub struct WebServer {
    port: u16,
    download_dir: PathBuf,
    ws_handler: Arc<WebSocketHandler>,
    running: Mutex<Option<RunningServer>>,
}

impl WebServer {
    pub fn new(port: u16, download_dir: PathBuf, ws_handler: Arc<WebSocketHandler>) -> Self {
        Self {
            port,
            download_dir,
            ws_handler,
            running: Mutex::new(None),
        }
    }

    /// Bind and start serving.
    ///
    /// A failed bind is startup-fatal and leaves nothing running. Calling
    /// `start` while already bound is a warning no-op.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Server already running");
            return Ok(());
        }

        let ws_handler = self.ws_handler.clone();
        let session_route = warp::path(SESSION_PATH)
            .and(warp::ws())
            .and(warp::addr::remote())
            .map(move |ws: warp::ws::Ws, addr: Option<SocketAddr>| {
                let handler = ws_handler.clone();
                ws.on_upgrade(move |socket| async move {
                    handler.client_connected(socket, addr).await;
                })
            });
        let routes = upload::route(self.download_dir.clone()).or(session_route);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (bound_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], self.port), async {
                shutdown_rx.await.ok();
            })
            .map_err(|e| {
                AppError::connection(format!("failed to bind port {}: {}", self.port, e))
            })?;

        tokio::spawn(server);
        *running = Some(RunningServer {
            shutdown_tx,
            bound_addr,
        });
        info!("Session server started on {}", bound_addr);
        Ok(())
    }

    /// Close the listening socket. Idempotent; open connections are closed
    /// by the registry, not here.
    pub async fn shutdown(&self) {
        if let Some(running) = self.running.lock().await.take() {
            let _ = running.shutdown_tx.send(());
            info!("Session server stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Actual bound address; differs from the configured port when it is 0.
    pub async fn bound_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.bound_addr)
    }
}
