use crate::resolve::ResolveError;
use crate::sync::protocol::SyncSnapshot;
use std::fmt;
use tokio::sync::oneshot;

/// Commands that can be sent to the Player task.
#[derive(Debug)]
pub enum PlayerCommand {
    Play,
    Pause,
    /// Halt playback and go idle, keeping the cursor.
    Stop,
    Next,
    Previous,
    Load { index: usize },
    AddVideo {
        url: String,
        /// Receives the new index, or why the URL was rejected.
        reply: Option<oneshot::Sender<Result<usize, ResolveError>>>,
    },
    Remove { index: usize },
    SetVolume { value: i64 },
    GetSnapshot(oneshot::Sender<SyncSnapshot>),
    /// Sent by the metadata poller; stale generations are ignored.
    MetadataTick { generation: u64 },
    Shutdown,
}

/// Where the controller is relative to the playback capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Loading => "loading",
            LifecycleState::Playing => "playing",
            LifecycleState::Paused => "paused",
            LifecycleState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Updates broadcast by the Player task about its state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStateUpdate {
    Snapshot(SyncSnapshot),
    Volume(u8),
    Lifecycle(LifecycleState),
}

/// Controller-only playback state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    pub current_track_id: Option<String>,
    pub lifecycle: LifecycleState,
    volume: u8,
    muted: bool,
}

/// Result of a volume change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeChange {
    pub volume: u8,
    pub muted: bool,
    pub mute_toggled: bool,
}

pub const DEFAULT_VOLUME: u8 = 100;

impl PlaybackSession {
    pub fn new(volume: u8) -> Self {
        let volume = volume.min(100);
        Self {
            current_track_id: None,
            lifecycle: LifecycleState::Idle,
            volume,
            muted: volume == 0,
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Clamps to [0, 100]. Zero mutes; any non-zero value unmutes.
    pub fn set_volume(&mut self, requested: i64) -> VolumeChange {
        let volume = requested.clamp(0, 100) as u8;
        let was_muted = self.muted;
        self.volume = volume;
        self.muted = volume == 0;
        VolumeChange {
            volume,
            muted: self.muted,
            mute_toggled: was_muted != self.muted,
        }
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}
