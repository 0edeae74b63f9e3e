//! In-process channel binding.
//!
//! A [`LocalHub`] hands one end of each new pair to the controller through a
//! [`LocalAcceptor`]; displays in the same process open pairs through a
//! [`LocalConnector`].

use super::{Channel, Connector, Endpoint, TransportError};
use crate::sync::protocol::{decode, encode, Message};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

const LOCAL_LOG_TARGET: &str = "nowplaying_sync::transport::local";

#[derive(Debug)]
enum Frame {
    Text(String),
    Close,
}

/// One end of an in-process channel carrying JSON text frames.
#[derive(Debug)]
pub struct LocalChannel {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
    open: bool,
    label: String,
}

impl LocalChannel {
    /// Creates two connected ends.
    pub fn pair(label: &str) -> (LocalChannel, LocalChannel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            LocalChannel {
                tx: a_tx,
                rx: b_rx,
                open: true,
                label: format!("{}/client", label),
            },
            LocalChannel {
                tx: b_tx,
                rx: a_rx,
                open: true,
                label: format!("{}/server", label),
            },
        )
    }

    /// Sends an arbitrary text frame, bypassing the encoder.
    pub fn send_raw(&mut self, text: &str) -> Result<(), TransportError> {
        self.push(Frame::Text(text.to_string()))
    }

    fn push(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| {
            self.open = false;
            TransportError::Closed
        })
    }
}

#[async_trait]
impl Channel for LocalChannel {
    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let text = encode(message)?;
        trace!(target: LOCAL_LOG_TARGET, peer = %self.label, "Sending {}", message.name());
        self.push(Frame::Text(text))
    }

    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        match self.rx.recv().await {
            Some(Frame::Text(text)) => Ok(Some(decode(&text)?)),
            Some(Frame::Close) => {
                self.open = false;
                Ok(None)
            }
            None => {
                self.open = false;
                Err(TransportError::Closed)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open && !self.tx.is_closed()
    }

    async fn close(&mut self) {
        if self.open {
            let _ = self.tx.send(Frame::Close);
            self.open = false;
        }
    }

    fn peer(&self) -> String {
        self.label.clone()
    }
}

/// Controller side of the hub: yields the server end of each new pair.
pub struct LocalAcceptor {
    rx: mpsc::UnboundedReceiver<LocalChannel>,
}

impl LocalAcceptor {
    /// Waits for the next connection; `None` once every connector is gone.
    pub async fn accept(&mut self) -> Option<LocalChannel> {
        self.rx.recv().await
    }
}

/// Display side of the hub.
#[derive(Clone)]
pub struct LocalConnector {
    tx: mpsc::UnboundedSender<LocalChannel>,
    counter: Arc<AtomicU64>,
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Channel>, TransportError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let (client, server) = LocalChannel::pair(&format!("local#{}", id));
        self.tx
            .send(server)
            .map_err(|_| TransportError::Connect("local hub is not accepting connections".to_string()))?;
        Ok(Box::new(client))
    }
}

/// Factory for a connector/acceptor pair.
pub struct LocalHub;

impl LocalHub {
    pub fn open() -> (LocalConnector, LocalAcceptor) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LocalConnector {
                tx,
                counter: Arc::new(AtomicU64::new(0)),
            },
            LocalAcceptor { rx },
        )
    }
}
