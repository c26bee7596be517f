//! Connection establishment for the attention channel.
//!
//! A `Connector` performs the authenticated handshake and hands back a
//! `Link`: a pair of queues carrying decoded frames. The channel owns
//! reconnection; a connector only ever makes one attempt per call.

use async_trait::async_trait;
use domain::Message;
use thiserror::Error;
use tokio::sync::mpsc;

/// In-process relay used by tests and local tooling
pub mod memory;

/// WebSocket transport
pub mod websocket;

pub use memory::MemoryRelay;
pub use websocket::WebSocketConnector;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// One established connection.
///
/// Dropping `sender` closes the connection; `receiver` yields `None` once
/// the remote side is gone.
#[derive(Debug)]
pub struct Link {
    pub sender: mpsc::UnboundedSender<Message>,
    pub receiver: mpsc::UnboundedReceiver<Message>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, token: &str) -> Result<Link, TransportError>;
}
