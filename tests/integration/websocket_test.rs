//! Integration tests for the WebSocket binding
//!
//! A real listener on an ephemeral port, with either the display client or a
//! raw WebSocket peer on the other end.

use crate::test_utils::{ControllerHarness, DisplayHarness, PROPAGATION_TIMEOUT};
use futures::{SinkExt, Stream, StreamExt};
use nowplaying_sync::display::{ConnectionState, DisplayCommand};
use nowplaying_sync::storage::MemoryStore;
use nowplaying_sync::sync::bridge::{bind_listener, run_websocket_server};
use nowplaying_sync::sync::protocol::{decode, Message, NO_SONG_TITLE};
use nowplaying_sync::transport::{Endpoint, WsConnector};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as Frame};

#[cfg(test)]
mod websocket_integration_tests {
    use super::*;

    struct Server {
        controller: ControllerHarness,
        port: u16,
        shutdown: broadcast::Sender<()>,
    }

    async fn start_server() -> Server {
        let controller = ControllerHarness::start(Arc::new(MemoryStore::new()));
        let (listener, port) = bind_listener("127.0.0.1", 0, false).await.expect("bind listener");
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(run_websocket_server(listener, controller.link.clone(), shutdown_rx));
        Server {
            controller,
            port,
            shutdown,
        }
    }

    impl Server {
        async fn stop(self) {
            let _ = self.shutdown.send(());
            self.controller.shutdown().await;
        }
    }

    /// Next text frame, decoded.
    async fn next_message<S>(socket: &mut S) -> Message
    where
        S: Stream<Item = Result<Frame, WsError>> + Unpin,
    {
        loop {
            let frame = timeout(PROPAGATION_TIMEOUT, socket.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .expect("websocket error");
            if let Frame::Text(text) = frame {
                return decode(&text).expect("controller sent a valid frame");
            }
        }
    }

    #[tokio::test]
    async fn test_display_client_over_websocket() {
        let server = start_server().await;
        let mut display = DisplayHarness::start(Arc::new(WsConnector), Endpoint::new("127.0.0.1", server.port));

        display.wait_for_state(ConnectionState::Connected).await;
        let initial = display.wait_for(|r| r.title == NO_SONG_TITLE && r.volume == Some(100)).await;
        assert!(initial.playlist.is_empty());

        display.send(DisplayCommand::Send(Message::Volume { value: 150 })).await;
        display.wait_for(|r| r.volume == Some(100)).await;
        display.send(DisplayCommand::Send(Message::Volume { value: 30 })).await;
        // The local echo shows 30 at once; the controller applies it later.
        display.wait_for(|r| r.volume == Some(30)).await;
        let applied = server.controller.wait_for_snapshot(|s| s.volume == Some(30)).await;
        assert_eq!(applied.volume, Some(30));

        display
            .send(DisplayCommand::Send(Message::AddVideo {
                url: "https://youtube.com/shorts/dQw4w9WgXcQ".to_string(),
            }))
            .await;
        let replica = display.wait_for(|r| r.title == "Video dQw4w9WgXcQ").await;
        assert_eq!(replica.current_index, Some(0));

        display.shutdown().await;
        server.stop().await;
    }

    /// A malformed frame is skipped and the connection keeps working.
    #[tokio::test]
    async fn test_raw_peer_survives_garbage_frames() {
        let server = start_server().await;
        let url = format!("ws://127.0.0.1:{}/", server.port);
        let (mut socket, _) = connect_async(url).await.expect("connect");

        // State is pushed on open without being asked.
        match next_message(&mut socket).await {
            Message::NowPlaying { params } => assert_eq!(params.title, NO_SONG_TITLE),
            other => panic!("expected nowPlaying, got {:?}", other),
        }
        assert_eq!(next_message(&mut socket).await, Message::VolumeUpdate { value: 100 });

        for garbage in ["not json at all", r#"{"command":"selfDestruct"}"#, "[1,2,3]"] {
            socket.send(Frame::Text(garbage.to_string())).await.expect("send garbage");
        }
        socket
            .send(Frame::Text(r#"{"command":"ping"}"#.to_string()))
            .await
            .expect("send ping");

        let reply = timeout(PROPAGATION_TIMEOUT, async {
            while let Some(frame) = socket.next().await {
                if let Ok(Frame::Text(text)) = frame {
                    return decode(&text).ok();
                }
            }
            None
        })
        .await
        .expect("timed out waiting for pong");
        assert_eq!(reply, Some(Message::Pong));

        let _ = socket.close(None).await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_taken_port_moves_with_auto_port() {
        let (first, port) = bind_listener("127.0.0.1", 0, false).await.expect("bind listener");

        assert!(bind_listener("127.0.0.1", port, false).await.is_err());

        // The next free port above may also be taken on a busy host, so only
        // assert that a different port came back.
        if let Ok((_second, moved)) = bind_listener("127.0.0.1", port, true).await {
            assert_ne!(moved, port);
        }
        drop(first);
    }
}
