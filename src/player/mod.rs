use crate::playlist::PlaylistStore;
use crate::storage::{KeyValueStore, VOLUME_KEY};
use crate::sync::protocol::SyncSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, trace, warn};

pub mod capability;
mod command_handler;
mod metadata_poller;
mod run_loop;
mod state;

pub use capability::{CapabilityError, CapabilityEvent, HeadlessCapability, PlaybackCapability, VideoMetadata};
pub use state::{LifecycleState, PlaybackSession, PlayerCommand, PlayerStateUpdate, VolumeChange, DEFAULT_VOLUME};

use metadata_poller::MetadataPoller;

const PLAYER_LOG_TARGET: &str = "nowplaying_sync::player";

/// Tunables for [`Player::new`].
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub metadata_poll_interval: Duration,
    pub state_update_capacity: usize,
    pub command_buffer_size: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            metadata_poll_interval: Duration::from_secs(3),
            state_update_capacity: 64,
            command_buffer_size: 64,
        }
    }
}

/// Owns the authoritative playlist and playback session and drives the
/// playback capability.
pub struct Player {
    // --- Configuration ---
    capability: Arc<dyn PlaybackCapability>,
    store: Arc<dyn KeyValueStore>,
    metadata_poll_interval: Duration,

    // --- State ---
    playlist: PlaylistStore,
    session: PlaybackSession,

    // --- Communication ---
    command_rx: mpsc::Receiver<PlayerCommand>,
    capability_rx: mpsc::UnboundedReceiver<CapabilityEvent>,
    internal_command_tx: mpsc::Sender<PlayerCommand>,
    state_update_tx: broadcast::Sender<PlayerStateUpdate>,

    // --- Metadata polling ---
    metadata_poller: Option<MetadataPoller>,
    poll_generation: u64,
}

impl Player {
    /// Creates a Player with state restored from `store`, plus the command
    /// sender. Run it with [`Player::run`] in its own task.
    pub fn new(
        capability: Arc<dyn PlaybackCapability>,
        capability_rx: mpsc::UnboundedReceiver<CapabilityEvent>,
        store: Arc<dyn KeyValueStore>,
        options: PlayerOptions,
    ) -> (Self, mpsc::Sender<PlayerCommand>) {
        let (command_tx, command_rx) = mpsc::channel(options.command_buffer_size);
        let (state_update_tx, _) = broadcast::channel(options.state_update_capacity);

        let playlist = PlaylistStore::restored(store.clone());
        let session = PlaybackSession::new(restore_volume(store.as_ref()));

        let player = Player {
            capability,
            store,
            metadata_poll_interval: options.metadata_poll_interval,
            playlist,
            session,
            command_rx,
            capability_rx,
            internal_command_tx: command_tx.clone(),
            state_update_tx,
            metadata_poller: None,
            poll_generation: 0,
        };

        (player, command_tx)
    }

    /// Subscribes to player state updates.
    pub fn subscribe_state_updates(&self) -> broadcast::Receiver<PlayerStateUpdate> {
        self.state_update_tx.subscribe()
    }

    /// Sender side of the update channel, for components that subscribe later.
    pub fn state_update_sender(&self) -> broadcast::Sender<PlayerStateUpdate> {
        self.state_update_tx.clone()
    }

    pub fn playlist(&self) -> &crate::playlist::Playlist {
        self.playlist.playlist()
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.session.lifecycle
    }

    pub fn is_polling_metadata(&self) -> bool {
        self.metadata_poller.is_some()
    }

    /// Builds the state projection sent to displays.
    pub fn snapshot(&self) -> SyncSnapshot {
        let playlist = self.playlist.playlist();
        let mut snapshot = SyncSnapshot::empty();
        if let Some(track) = playlist.current() {
            snapshot.title = track.title.clone();
            snapshot.author = track.author.clone();
            snapshot.video_id = Some(track.id.clone());
        }
        snapshot.playlist = Some(playlist.tracks().to_vec());
        snapshot.current_index = playlist.current_index();
        snapshot.volume = Some(self.session.volume());
        snapshot
    }

    // --- Private Helper Methods ---

    /// Sends a state update via the broadcast channel.
    fn broadcast_update(&self, update: PlayerStateUpdate) {
        trace!(target: PLAYER_LOG_TARGET, "Broadcasting state update: {:?}", update);
        if self.state_update_tx.send(update).is_err() {
            // Normal while no display is connected.
            debug!(target: PLAYER_LOG_TARGET, "No active listeners for state update.");
        }
    }

    fn broadcast_snapshot(&self) {
        self.broadcast_update(PlayerStateUpdate::Snapshot(self.snapshot()));
    }

    fn set_lifecycle(&mut self, lifecycle: LifecycleState) {
        if self.session.lifecycle != lifecycle {
            debug!(target: PLAYER_LOG_TARGET, from = %self.session.lifecycle, to = %lifecycle, "Lifecycle transition.");
            self.session.lifecycle = lifecycle;
            if lifecycle != LifecycleState::Playing {
                self.stop_metadata_polling();
            }
            self.broadcast_update(PlayerStateUpdate::Lifecycle(lifecycle));
        }
    }

    fn start_metadata_polling(&mut self) {
        self.stop_metadata_polling();
        self.poll_generation += 1;
        self.metadata_poller = Some(metadata_poller::spawn_metadata_poller(
            self.metadata_poll_interval,
            self.poll_generation,
            self.internal_command_tx.clone(),
        ));
    }

    fn stop_metadata_polling(&mut self) {
        if let Some(poller) = self.metadata_poller.take() {
            poller.stop();
        }
    }

    fn persist_volume(&self) {
        if let Err(e) = self.store.set(VOLUME_KEY, &self.session.volume().to_string()) {
            warn!(target: PLAYER_LOG_TARGET, "Failed to persist volume: {}", e);
        }
    }

    /// Pushes the restored volume and mute state to the capability.
    #[instrument(skip(self))]
    async fn sync_capability_volume(&self) {
        let wanted = self.session.volume();
        match self.capability.volume().await {
            Ok(current) if current == wanted => {}
            Ok(_) | Err(_) => {
                if let Err(e) = self.capability.set_volume(wanted).await {
                    warn!(target: PLAYER_LOG_TARGET, "Failed to apply restored volume: {}", e);
                }
            }
        }
        let result = if self.session.muted() {
            self.capability.mute().await
        } else {
            self.capability.unmute().await
        };
        if let Err(e) = result {
            warn!(target: PLAYER_LOG_TARGET, "Failed to apply restored mute state: {}", e);
        }
        info!(target: PLAYER_LOG_TARGET, volume = wanted, muted = self.session.muted(), "Player ready.");
    }

    // --- Main Run Loop ---

    /// Runs the player's command processing loop. This should be spawned as a Tokio task.
    #[instrument(skip(self))]
    pub async fn run(&mut self) {
        run_loop::run_player_loop(self).await;
    }
}

fn restore_volume(store: &dyn KeyValueStore) -> u8 {
    match store.get(VOLUME_KEY) {
        Ok(Some(raw)) => match raw.trim().parse::<i64>() {
            Ok(value) => value.clamp(0, 100) as u8,
            Err(_) => {
                warn!(target: PLAYER_LOG_TARGET, "Persisted volume {:?} is malformed, using default.", raw);
                DEFAULT_VOLUME
            }
        },
        Ok(None) => DEFAULT_VOLUME,
        Err(e) => {
            warn!(target: PLAYER_LOG_TARGET, "Could not read persisted volume: {}", e);
            DEFAULT_VOLUME
        }
    }
}
