pub mod handlers;
pub mod routes;
pub mod webserver;

pub use handlers::message_router::{ConnectionContext, MessageCategory, MessageRouter};
pub use handlers::websocket::WebSocketHandler;
pub use webserver::WebServer;
