pub mod message_router;
pub mod websocket;
