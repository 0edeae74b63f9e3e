use crate::playlist::{deserialize_cursor, Track};
use crate::storage::{KeyValueStore, DISPLAY_SNAPSHOT_KEY};
use crate::sync::protocol::SyncSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const REPLICA_LOG_TARGET: &str = "nowplaying_sync::display::replica";

/// What a surface should redraw after a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRefresh {
    Unchanged,
    /// Playlist, cursor or volume changed.
    Updated,
    /// Title or author changed; surfaces restart their now-playing effect.
    TrackChanged,
}

/// A display's copy of the last snapshot it received.
///
/// Snapshots overwrite; nothing accumulates, so applying the same snapshot
/// twice is a no-op the second time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayReplica {
    pub title: String,
    pub author: String,
    pub playlist: Vec<Track>,
    #[serde(deserialize_with = "deserialize_cursor")]
    pub current_index: Option<usize>,
    pub volume: Option<u8>,
}

impl DisplayReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.playlist.get(i))
    }

    /// Overwrites title and author, and the playlist with its cursor when the
    /// snapshot carries one.
    pub fn apply_snapshot(&mut self, snapshot: &SyncSnapshot) -> ViewRefresh {
        let before = self.clone();

        self.title = snapshot.title.clone();
        self.author = snapshot.author.clone();
        if let Some(playlist) = &snapshot.playlist {
            self.playlist = playlist.clone();
            self.current_index = snapshot.current_index.filter(|&i| i < playlist.len());
        }
        if let Some(volume) = snapshot.volume {
            self.volume = Some(volume.min(100));
        }

        if *self == before {
            ViewRefresh::Unchanged
        } else if self.title != before.title || self.author != before.author {
            ViewRefresh::TrackChanged
        } else {
            ViewRefresh::Updated
        }
    }

    /// Returns true if the stored volume changed.
    pub fn apply_volume(&mut self, value: i64) -> bool {
        let volume = Some(value.clamp(0, 100) as u8);
        if self.volume == volume {
            return false;
        }
        self.volume = volume;
        true
    }

    /// Loads the persisted replica; anything unreadable yields an empty one.
    pub fn restore(store: &dyn KeyValueStore) -> Self {
        match store.get(DISPLAY_SNAPSHOT_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(target: REPLICA_LOG_TARGET, "Persisted display state is malformed, starting empty: {}", e);
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(target: REPLICA_LOG_TARGET, "Could not read display state: {}", e);
                Self::default()
            }
        }
    }

    pub fn persist(&self, store: &dyn KeyValueStore) {
        let result = serde_json::to_string(self)
            .map_err(crate::storage::StorageError::from)
            .and_then(|raw| store.set(DISPLAY_SNAPSHOT_KEY, &raw));
        match result {
            Ok(()) => debug!(target: REPLICA_LOG_TARGET, "Display state saved."),
            Err(e) => warn!(target: REPLICA_LOG_TARGET, "Failed to save display state: {}", e),
        }
    }
}
