use crate::common::errors::TransportError;

pub mod http_server;
pub mod middleware;
pub mod routes;
pub mod socket;
pub mod websocket_server;

pub use socket::WebSocketTransport;

/// A live client connection the session writes serialized payloads to.
/// A session swaps its transport wholesale on resume.
pub trait Transport: Send + Sync {
    /// Queues `payload` for transmission without waiting for the write.
    fn send(&self, payload: String) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    fn close(&self, code: u16, reason: Option<String>);
}
