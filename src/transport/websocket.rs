//! WebSocket channel binding: one JSON message per text frame.

use super::{Channel, Connector, Endpoint, TransportError};
use crate::sync::protocol::{decode, encode, Message};
use async_trait::async_trait;
use futures::StreamExt;
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};
use tracing::{debug, trace, warn};

const WS_LOG_TARGET: &str = "nowplaying_sync::transport::websocket";

/// A WebSocket connection speaking the sync protocol.
pub struct WsChannel<S> {
    websocket: WebSocketStream<S>,
    open: bool,
    peer: String,
}

impl<S> WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(websocket: WebSocketStream<S>, peer: String) -> Self {
        Self {
            websocket,
            open: true,
            peer,
        }
    }
}

impl WsChannel<TcpStream> {
    /// Completes the server-side handshake on an accepted TCP stream.
    pub async fn accept(stream: TcpStream) -> Result<Self, TransportError> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let websocket = accept_async(stream).await?;
        debug!(target: WS_LOG_TARGET, %peer, "WebSocket handshake complete.");
        Ok(Self::new(websocket, peer))
    }
}

#[async_trait]
impl<S> Channel for WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let payload = encode(message)?;
        trace!(target: WS_LOG_TARGET, peer = %self.peer, "[WS Send] {}", message.name());
        if let Err(e) = self.websocket.send(WsMessage::Text(payload)).await {
            self.open = false;
            return Err(e.into());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        loop {
            if !self.open {
                return Err(TransportError::Closed);
            }
            match self.websocket.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    trace!(target: WS_LOG_TARGET, peer = %self.peer, "Received text frame: {}", text);
                    return Ok(Some(decode(&text)?));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    // Some producers send JSON as binary frames.
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    return Ok(Some(decode(&text)?));
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = self.websocket.send(WsMessage::Pong(data)).await {
                        warn!(target: WS_LOG_TARGET, peer = %self.peer, "Failed to answer ping: {}", e);
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(target: WS_LOG_TARGET, peer = %self.peer, ?frame, "Peer closed the connection.");
                    self.open = false;
                    return Ok(None);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.open = false;
                    return Err(e.into());
                }
                None => {
                    self.open = false;
                    return Err(TransportError::Closed);
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.websocket.close(None).await {
                debug!(target: WS_LOG_TARGET, peer = %self.peer, "Error during WebSocket close: {}", e);
            }
        }
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

/// Opens WebSocket connections to `ws://host:port/`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, TransportError> {
        let url = endpoint.ws_url()?;
        debug!(target: WS_LOG_TARGET, %url, "Connecting.");
        let (websocket, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", endpoint, e)))?;
        Ok(Box::new(WsChannel::new(websocket, endpoint.to_string())))
    }
}
