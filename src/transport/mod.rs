//! Duplex message channels between the controller and displays.
//!
//! Two bindings implement [`Channel`]: WebSocket text frames over TCP
//! ([`websocket`]) and an in-process hub ([`local`]). Both carry the same
//! JSON frames, so everything above this layer is binding-agnostic.

use crate::sync::protocol::{Message, ProtocolError};
use async_trait::async_trait;
use std::fmt;
use std::io;
use thiserror::Error;
use url::Url;

pub mod local;
pub mod websocket;

pub use local::{LocalAcceptor, LocalChannel, LocalConnector, LocalHub};
pub use websocket::{WsChannel, WsConnector};

/// Default controller port.
pub const DEFAULT_PORT: u16 = 8765;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Malformed frame: {0}")]
    Decode(#[from] ProtocolError),
    #[error("Channel closed")]
    Closed,
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// Decode faults affect a single frame; the channel stays usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Decode(_))
    }
}

/// Where a controller can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn ws_url(&self) -> Result<Url, TransportError> {
        Url::parse(&format!("ws://{}:{}/", self.host, self.port))
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}:{} ({})", self.host, self.port, e)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One open connection.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Next message. `Ok(None)` means the peer closed cleanly; an error other
    /// than a decode fault means the connection dropped.
    async fn recv(&mut self) -> Result<Option<Message>, TransportError>;

    fn is_open(&self) -> bool;

    async fn close(&mut self);

    /// Peer description for logs.
    fn peer(&self) -> String;
}

/// Opens channels to a controller.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, TransportError>;
}
