//! Integration tests for a controller and displays over the in-process hub
//!
//! These tests run the real player task, bridge and display client together.

use crate::test_utils::{ControllerHarness, DisplayHarness};
use nowplaying_sync::display::{ConnectionState, DisplayCommand};
use nowplaying_sync::player::PlayerCommand;
use nowplaying_sync::playlist::PLACEHOLDER_TEXT;
use nowplaying_sync::storage::MemoryStore;
use nowplaying_sync::sync::bridge::run_local_server;
use nowplaying_sync::sync::protocol::{Message, NO_SONG_TITLE};
use nowplaying_sync::transport::{Endpoint, LocalHub};
use std::sync::Arc;

#[cfg(test)]
mod controller_display_integration_tests {
    use super::*;

    fn local_endpoint() -> Endpoint {
        Endpoint::new("local", 0)
    }

    /// A display that joins an idle controller sees the placeholder, then
    /// drives the playlist with commands.
    #[tokio::test]
    async fn test_display_mirrors_and_controls_playback() {
        let controller = ControllerHarness::start(Arc::new(MemoryStore::new()));
        let (connector, acceptor) = LocalHub::open();
        tokio::spawn(run_local_server(acceptor, controller.link.clone()));

        let mut display = DisplayHarness::start(Arc::new(connector), local_endpoint());
        display.wait_for_state(ConnectionState::Connected).await;
        let initial = display.wait_for(|r| r.title == NO_SONG_TITLE).await;
        assert!(initial.playlist.is_empty());
        assert_eq!(initial.current_index, None);

        display
            .send(DisplayCommand::Send(Message::AddVideo {
                url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            }))
            .await;
        let playing = display.wait_for(|r| r.title == "Video dQw4w9WgXcQ").await;
        assert_eq!(playing.author, "Unknown Artist");
        assert_eq!(playing.current_index, Some(0));
        assert_eq!(playing.playlist[0].id, "dQw4w9WgXcQ");

        display
            .send(DisplayCommand::Send(Message::AddVideo {
                url: "https://youtu.be/9bZkp7q19f0".to_string(),
            }))
            .await;
        display.wait_for(|r| r.playlist.len() == 2).await;

        display.send(DisplayCommand::Send(Message::Next)).await;
        let advanced = display.wait_for(|r| r.current_index == Some(1)).await;
        assert_eq!(advanced.playlist[1].id, "9bZkp7q19f0");

        display.shutdown().await;
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_unresolvable_url_changes_nothing() {
        let controller = ControllerHarness::start(Arc::new(MemoryStore::new()));
        let (connector, acceptor) = LocalHub::open();
        tokio::spawn(run_local_server(acceptor, controller.link.clone()));

        let mut display = DisplayHarness::start(Arc::new(connector), local_endpoint());
        display.wait_for(|r| r.title == NO_SONG_TITLE).await;

        display
            .send(DisplayCommand::Send(Message::AddVideo {
                url: "https://example.com/not/a/video".to_string(),
            }))
            .await;
        display
            .send(DisplayCommand::Send(Message::AddVideo {
                url: "dQw4w9WgXcQ".to_string(),
            }))
            .await;

        // Commands are handled in order, so the valid add is the first change.
        let replica = display.wait_for(|r| !r.playlist.is_empty()).await;
        assert_eq!(replica.playlist.len(), 1);
        assert_eq!(controller.snapshot().await.playlist.map(|p| p.len()), Some(1));

        display.shutdown().await;
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_end_of_track_advances_every_display() {
        let controller = ControllerHarness::start(Arc::new(MemoryStore::new()));
        let (connector, acceptor) = LocalHub::open();
        tokio::spawn(run_local_server(acceptor, controller.link.clone()));
        let connector = Arc::new(connector);

        for id in ["aaaaaaaaaa1", "bbbbbbbbbb2"] {
            controller
                .send(PlayerCommand::AddVideo {
                    url: id.to_string(),
                    reply: None,
                })
                .await;
        }

        let mut first = DisplayHarness::start(connector.clone(), local_endpoint());
        let mut second = DisplayHarness::start(connector, local_endpoint());
        first.wait_for(|r| r.title == "Video aaaaaaaaaa1").await;
        second.wait_for(|r| r.title == "Video aaaaaaaaaa1").await;

        controller.capability.finish().expect("a video is loaded");
        for display in [&mut first, &mut second] {
            let replica = display.wait_for(|r| r.title == "Video bbbbbbbbbb2").await;
            assert_eq!(replica.current_index, Some(1));
        }

        // Wraps around to the first entry.
        controller.capability.finish().expect("a video is loaded");
        first.wait_for(|r| r.current_index == Some(0)).await;

        first.shutdown().await;
        second.shutdown().await;
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_volume_is_clamped_and_broadcast() {
        let controller = ControllerHarness::start(Arc::new(MemoryStore::new()));
        let (connector, acceptor) = LocalHub::open();
        tokio::spawn(run_local_server(acceptor, controller.link.clone()));
        let connector = Arc::new(connector);

        let mut sender = DisplayHarness::start(connector.clone(), local_endpoint());
        let mut watcher = DisplayHarness::start(connector, local_endpoint());
        sender.wait_for(|r| r.volume == Some(100)).await;
        watcher.wait_for(|r| r.volume == Some(100)).await;

        sender.send(DisplayCommand::Send(Message::Volume { value: -20 })).await;
        watcher.wait_for(|r| r.volume == Some(0)).await;
        controller.wait_for_snapshot(|s| s.volume == Some(0)).await;

        sender.send(DisplayCommand::Send(Message::Volume { value: 35 })).await;
        watcher.wait_for(|r| r.volume == Some(35)).await;

        sender.shutdown().await;
        watcher.shutdown().await;
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_current_entry_stops_and_updates_cursor() {
        let controller = ControllerHarness::start(Arc::new(MemoryStore::new()));
        let (connector, acceptor) = LocalHub::open();
        tokio::spawn(run_local_server(acceptor, controller.link.clone()));

        for id in ["aaaaaaaaaa1", "bbbbbbbbbb2", "cccccccccc3"] {
            controller
                .send(PlayerCommand::AddVideo {
                    url: id.to_string(),
                    reply: None,
                })
                .await;
        }
        controller.send(PlayerCommand::Load { index: 2 }).await;

        let mut display = DisplayHarness::start(Arc::new(connector), local_endpoint());
        display.wait_for(|r| r.current_index == Some(2)).await;

        display.send(DisplayCommand::Send(Message::RemoveVideo { index: 2 })).await;
        let replica = display.wait_for(|r| r.playlist.len() == 2).await;
        assert_eq!(replica.current_index, Some(1));
        // The entry that slid under the cursor was never loaded.
        assert_eq!(replica.title, PLACEHOLDER_TEXT);

        display.shutdown().await;
        controller.shutdown().await;
    }
}
