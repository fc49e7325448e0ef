//! Per-connection lifecycle for upgraded sessions.
//!
//! Each accepted connection gets an independent read loop that decodes text
//! frames into envelopes and feeds them to the router in arrival order. A
//! paired write task drains the session handle's command channel onto the
//! socket, so replies and registry sends share one ordered writer.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use super::message_router::{ConnectionContext, MessageRouter};
use crate::core::event_bus::{AppEvent, EventBus};
use crate::core::status::StatusTracker;
use crate::infrastructure::connection::{SessionCommand, SessionHandle, SessionRegistry};
use crate::message::Envelope;

pub struct WebSocketHandler {
    router: Arc<MessageRouter>,
    registry: Arc<SessionRegistry>,
    status: Arc<StatusTracker>,
    events: EventBus,
}

impl WebSocketHandler {
    pub fn new(
        router: Arc<MessageRouter>,
        registry: Arc<SessionRegistry>,
        status: Arc<StatusTracker>,
        events: EventBus,
    ) -> Self {
        Self {
            router,
            registry,
            status,
            events,
        }
    }

    /// Drive one upgraded connection until the peer closes or the transport
    /// fails. Runs as the connection's own task.
    pub async fn client_connected(&self, ws: WebSocket, addr: Option<SocketAddr>) {
        let Some(addr) = addr else {
            error!("Client connected but addr is None");
            return;
        };
        info!("Client [{}] connected", addr);

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionCommand>();
        let handle = SessionHandle::new(tx);
        let ctx = ConnectionContext::new(addr, handle.clone());

        // Write task: the only writer on this socket
        let write_task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    SessionCommand::Frame(frame) => {
                        if ws_tx.send(Message::text(frame)).await.is_err() {
                            break;
                        }
                    }
                    SessionCommand::Close => {
                        let _ = ws_tx.send(Message::close()).await;
                        break;
                    }
                }
            }
        });

        // Read loop: frames are processed and replied to in arrival order
        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(msg) if msg.is_text() => {
                    let text = msg.to_str().unwrap_or_default();
                    debug!("Received: {}", text);
                    match Envelope::from_json(text) {
                        Ok(envelope) => self.router.route(&ctx, envelope).await,
                        Err(e) => warn!("Dropping malformed frame from {}: {}", addr, e),
                    }
                }
                Ok(msg) if msg.is_close() => break,
                Ok(_) => {} // ping/pong/binary
                Err(e) => {
                    error!("WebSocket error on {}: {}", addr, e);
                    break;
                }
            }
        }

        self.client_disconnected(&ctx).await;
        handle.close();
        let _ = write_task.await;
    }

    async fn client_disconnected(&self, ctx: &ConnectionContext) {
        info!("Client [{}] disconnected", ctx.remote_addr);

        let Some(device_id) = ctx.bound_device() else {
            return;
        };
        // Only evict the registry entry if it still belongs to this
        // connection; a reconnect may have replaced it already.
        if self.registry.remove(&device_id, ctx.handle.id()) {
            self.status
                .device_disconnected(self.registry.is_connected());
            self.events
                .publish(AppEvent::DeviceDisconnected { device_id });
        }
    }
}
