use super::{deserialize_cursor, Playlist, Track};
use crate::storage::{KeyValueStore, PLAYLIST_KEY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STORE_LOG_TARGET: &str = "nowplaying_sync::playlist";

/// On-disk shape of the playlist record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPlaylist {
    pub playlist: Vec<Track>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub current_index: Option<usize>,
}

/// Controller-owned playlist with write-through persistence.
///
/// Every mutating method persists the full record before returning, so an
/// abrupt exit loses at most the change in flight.
pub struct PlaylistStore {
    playlist: Playlist,
    store: Arc<dyn KeyValueStore>,
}

impl PlaylistStore {
    /// Creates an empty store without reading persisted state.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            playlist: Playlist::new(),
            store,
        }
    }

    /// Creates a store populated from persisted state.
    pub fn restored(store: Arc<dyn KeyValueStore>) -> Self {
        let mut playlist_store = Self::new(store);
        playlist_store.restore();
        playlist_store
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Reloads from the store. Missing, unreadable or malformed records
    /// yield an empty playlist with cursor 0; this never fails.
    pub fn restore(&mut self) {
        self.playlist = match self.store.get(PLAYLIST_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedPlaylist>(&raw) {
                Ok(record) => {
                    let playlist = Playlist::from_parts(record.playlist, record.current_index.unwrap_or(0));
                    info!(target: STORE_LOG_TARGET, tracks = playlist.len(), cursor = playlist.cursor(), "Restored playlist.");
                    playlist
                }
                Err(e) => {
                    warn!(target: STORE_LOG_TARGET, "Persisted playlist is malformed, starting empty: {}", e);
                    Playlist::new()
                }
            },
            Ok(None) => {
                debug!(target: STORE_LOG_TARGET, "No persisted playlist, starting empty.");
                Playlist::new()
            }
            Err(e) => {
                warn!(target: STORE_LOG_TARGET, "Could not read persisted playlist, starting empty: {}", e);
                Playlist::new()
            }
        };
    }

    /// Writes tracks and cursor as one record. Storage faults are logged.
    pub fn persist(&self) {
        let record = PersistedPlaylist {
            playlist: self.playlist.tracks().to_vec(),
            current_index: Some(self.playlist.cursor()),
        };
        let result = serde_json::to_string(&record)
            .map_err(crate::storage::StorageError::from)
            .and_then(|raw| self.store.set(PLAYLIST_KEY, &raw));
        if let Err(e) = result {
            warn!(target: STORE_LOG_TARGET, "Failed to persist playlist: {}", e);
        }
    }

    pub fn add(&mut self, id: &str, title: &str, author: &str) -> usize {
        let index = self.playlist.add(id, title, author);
        self.persist();
        index
    }

    pub fn enrich(&mut self, index: usize, title: &str, author: &str) -> bool {
        let changed = self.playlist.enrich(index, title, author);
        if changed {
            self.persist();
        }
        changed
    }

    pub fn remove(&mut self, index: usize) -> Option<Track> {
        let removed = self.playlist.remove(index);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    pub fn move_cursor(&mut self, delta: i64) -> Option<usize> {
        let moved = self.playlist.move_cursor(delta);
        if moved.is_some() {
            self.persist();
        }
        moved
    }

    pub fn set_cursor(&mut self, index: usize) -> bool {
        let set = self.playlist.set_cursor(index);
        if set {
            self.persist();
        }
        set
    }
}
