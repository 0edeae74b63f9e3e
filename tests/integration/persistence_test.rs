//! Integration tests for state that survives restarts
//!
//! Each test restarts a controller or display against the same JSON file.

use crate::test_utils::ControllerHarness;
use nowplaying_sync::display::DisplayReplica;
use nowplaying_sync::player::PlayerCommand;
use nowplaying_sync::playlist::Track;
use nowplaying_sync::storage::{JsonFileStore, KeyValueStore, PLAYLIST_KEY};
use nowplaying_sync::sync::protocol::{SyncSnapshot, NO_SONG_TITLE};
use std::error::Error;
use std::sync::Arc;
use tempfile::tempdir;

#[cfg(test)]
mod persistence_integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_controller_restores_playlist_and_volume() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("controller.json");

        let controller = ControllerHarness::start(Arc::new(JsonFileStore::new(&path)));
        for id in ["aaaaaaaaaa1", "bbbbbbbbbb2"] {
            controller
                .send(PlayerCommand::AddVideo {
                    url: id.to_string(),
                    reply: None,
                })
                .await;
        }
        controller.send(PlayerCommand::Load { index: 1 }).await;
        controller.send(PlayerCommand::SetVolume { value: 42 }).await;
        controller.wait_for_snapshot(|s| s.title == "Video bbbbbbbbbb2").await;
        controller.shutdown().await;

        let restarted = ControllerHarness::start(Arc::new(JsonFileStore::new(&path)));
        let snapshot = restarted.snapshot().await;
        assert_eq!(snapshot.current_index, Some(1));
        assert_eq!(snapshot.volume, Some(42));
        // Enriched metadata was saved, and nothing plays until asked.
        assert_eq!(snapshot.title, "Video bbbbbbbbbb2");
        assert_eq!(
            snapshot.playlist.as_deref().map(|tracks| tracks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>()),
            Some(vec!["aaaaaaaaaa1", "bbbbbbbbbb2"])
        );
        assert!(restarted.capability.finish().is_err());
        restarted.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_controller_state_starts_empty() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("controller.json");
        let store = JsonFileStore::new(&path);
        store.set(PLAYLIST_KEY, "{ this is not a playlist")?;

        let controller = ControllerHarness::start(Arc::new(store));
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.title, NO_SONG_TITLE);
        assert_eq!(snapshot.playlist, Some(Vec::new()));
        assert_eq!(snapshot.current_index, None);

        // The broken record is replaced on the next write.
        controller
            .send(PlayerCommand::AddVideo {
                url: "cccccccccc3".to_string(),
                reply: None,
            })
            .await;
        controller.wait_for_snapshot(|s| s.title == "Video cccccccccc3").await;
        controller.shutdown().await;

        let restarted = ControllerHarness::start(Arc::new(JsonFileStore::new(&path)));
        assert_eq!(restarted.snapshot().await.playlist.map(|p| p.len()), Some(1));
        restarted.shutdown().await;
        Ok(())
    }

    #[test]
    fn test_display_replica_survives_restart() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("display.json");

        let mut replica = DisplayReplica::new();
        replica.apply_snapshot(&SyncSnapshot {
            title: "Video aaaaaaaaaa1".to_string(),
            author: "Unknown Artist".to_string(),
            video_id: Some("aaaaaaaaaa1".to_string()),
            playlist: Some(vec![Track::new("aaaaaaaaaa1", "Video aaaaaaaaaa1", "Unknown Artist")]),
            current_index: Some(0),
            volume: Some(70),
        });
        replica.persist(&JsonFileStore::new(&path));

        let restored = DisplayReplica::restore(&JsonFileStore::new(&path));
        assert_eq!(restored, replica);
        assert_eq!(restored.current_track().map(|t| t.id.as_str()), Some("aaaaaaaaaa1"));
        Ok(())
    }
}
