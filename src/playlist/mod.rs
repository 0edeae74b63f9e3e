//! Ordered track list with a playback cursor.

use serde::{Deserialize, Deserializer, Serialize};

mod store;

pub use store::{PersistedPlaylist, PlaylistStore};

/// Title and author shown until the playback capability reports real metadata.
pub const PLACEHOLDER_TEXT: &str = "Loading...";

/// One playlist entry. Identity is `id`; the same id may appear many times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default = "placeholder")]
    pub title: String,
    #[serde(default = "placeholder")]
    pub author: String,
}

fn placeholder() -> String {
    PLACEHOLDER_TEXT.to_string()
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
        }
    }

    /// A track whose metadata has not been fetched yet.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, PLACEHOLDER_TEXT, PLACEHOLDER_TEXT)
    }

    pub fn has_placeholder_metadata(&self) -> bool {
        self.title == PLACEHOLDER_TEXT || self.author == PLACEHOLDER_TEXT
    }
}

/// Tracks in playback order plus the cursor.
///
/// The cursor is only meaningful while the list is non-empty; it is kept at
/// 0 otherwise and [`Playlist::current_index`] reports `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    tracks: Vec<Track>,
    cursor: usize,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a playlist, clamping an out-of-range cursor to 0.
    pub fn from_parts(tracks: Vec<Track>, cursor: usize) -> Self {
        let cursor = if cursor < tracks.len() { cursor } else { 0 };
        Self { tracks, cursor }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// The raw cursor value, 0 for an empty list.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_index(&self) -> Option<usize> {
        if self.tracks.is_empty() {
            None
        } else {
            Some(self.cursor)
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current_index().and_then(|i| self.tracks.get(i))
    }

    /// Appends a track and returns its index. No de-duplication.
    pub fn add(&mut self, id: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> usize {
        self.tracks.push(Track::new(id, title, author));
        self.tracks.len() - 1
    }

    /// Updates metadata in place. Returns false when `index` is out of range
    /// or nothing changed.
    pub fn enrich(&mut self, index: usize, title: &str, author: &str) -> bool {
        match self.tracks.get_mut(index) {
            Some(track) if track.title != title || track.author != author => {
                track.title = title.to_string();
                track.author = author.to_string();
                true
            }
            _ => false,
        }
    }

    /// Removes the entry at `index`, keeping the cursor on the same track
    /// where possible. Removing the current track leaves the cursor on the
    /// entry that slid into its place (or the new last entry).
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(index);
        if self.tracks.is_empty() {
            self.cursor = 0;
        } else if index < self.cursor {
            self.cursor -= 1;
        } else if index == self.cursor {
            self.cursor = index.min(self.tracks.len() - 1);
        }
        Some(removed)
    }

    /// Index reached by moving `delta` steps from the cursor, wrapping at
    /// both ends. `None` for an empty list.
    pub fn offset_index(&self, delta: i64) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let len = self.tracks.len() as i64;
        Some((self.cursor as i64 + delta).rem_euclid(len) as usize)
    }

    pub fn next_index(&self) -> Option<usize> {
        self.offset_index(1)
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.offset_index(-1)
    }

    /// Moves the cursor by `delta` with wraparound. No-op on an empty list.
    pub fn move_cursor(&mut self, delta: i64) -> Option<usize> {
        let index = self.offset_index(delta)?;
        self.cursor = index;
        Some(index)
    }

    /// Points the cursor at `index`. Returns false if out of range.
    pub fn set_cursor(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.cursor = index;
            true
        } else {
            false
        }
    }
}

/// Deserializes a cursor that older producers encode as `-1` for "none".
pub fn deserialize_cursor<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|i| usize::try_from(i).ok()))
}
