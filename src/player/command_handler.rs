use super::{CapabilityEvent, LifecycleState, Player, PlayerStateUpdate, PLAYER_LOG_TARGET};
use crate::playlist::PLACEHOLDER_TEXT;
use crate::resolve::{resolve_video_id, ResolveError};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};

/// Loads the entry at `index` and moves the cursor there.
#[instrument(skip(player))]
pub async fn handle_load(player: &mut Player, index: usize) {
    let Some(track) = player.playlist.playlist().get(index).cloned() else {
        warn!(target: PLAYER_LOG_TARGET, "Load: index {} out of range ({} entries).", index, player.playlist.playlist().len());
        return;
    };
    info!(target: PLAYER_LOG_TARGET, index, video_id = %track.id, "Loading track.");

    player.playlist.set_cursor(index);
    player.stop_metadata_polling();
    player.session.current_track_id = Some(track.id.clone());
    player.set_lifecycle(LifecycleState::Loading);

    if let Err(e) = player.capability.load(&track.id).await {
        warn!(target: PLAYER_LOG_TARGET, video_id = %track.id, "Capability failed to load video: {}", e);
    }
    player.broadcast_snapshot();
}

#[instrument(skip(player))]
pub async fn handle_play(player: &mut Player) {
    match player.session.lifecycle {
        LifecycleState::Idle | LifecycleState::Ended => match player.playlist.playlist().current_index() {
            Some(index) => handle_load(player, index).await,
            None => debug!(target: PLAYER_LOG_TARGET, "Play: playlist is empty."),
        },
        LifecycleState::Loading | LifecycleState::Paused => {
            if let Err(e) = player.capability.play().await {
                warn!(target: PLAYER_LOG_TARGET, "Capability failed to play: {}", e);
            }
        }
        LifecycleState::Playing => trace!(target: PLAYER_LOG_TARGET, "Play: already playing."),
    }
}

#[instrument(skip(player))]
pub async fn handle_pause(player: &mut Player) {
    match player.session.lifecycle {
        LifecycleState::Playing | LifecycleState::Loading => {
            if let Err(e) = player.capability.pause().await {
                warn!(target: PLAYER_LOG_TARGET, "Capability failed to pause: {}", e);
            }
        }
        state => debug!(target: PLAYER_LOG_TARGET, %state, "Pause: nothing to pause."),
    }
}

#[instrument(skip(player))]
pub async fn handle_next(player: &mut Player) {
    match player.playlist.playlist().next_index() {
        Some(index) => handle_load(player, index).await,
        None => debug!(target: PLAYER_LOG_TARGET, "Next: playlist is empty."),
    }
}

#[instrument(skip(player))]
pub async fn handle_previous(player: &mut Player) {
    match player.playlist.playlist().previous_index() {
        Some(index) => handle_load(player, index).await,
        None => debug!(target: PLAYER_LOG_TARGET, "Previous: playlist is empty."),
    }
}

/// Resolves `url` and appends the video with placeholder metadata. The first
/// entry added while nothing is loaded starts playing.
#[instrument(skip(player, reply))]
pub async fn handle_add_video(
    player: &mut Player,
    url: String,
    reply: Option<oneshot::Sender<Result<usize, ResolveError>>>,
) {
    let video_id = match resolve_video_id(&url) {
        Ok(id) => id,
        Err(e) => {
            warn!(target: PLAYER_LOG_TARGET, "AddVideo: {}", e);
            if let Some(reply) = reply {
                let _ = reply.send(Err(e));
            }
            return;
        }
    };

    let was_empty = player.playlist.playlist().is_empty();
    let index = player.playlist.add(&video_id, PLACEHOLDER_TEXT, PLACEHOLDER_TEXT);
    info!(target: PLAYER_LOG_TARGET, index, %video_id, "Added video to playlist.");
    player.broadcast_snapshot();
    if let Some(reply) = reply {
        let _ = reply.send(Ok(index));
    }

    if was_empty && matches!(player.session.lifecycle, LifecycleState::Idle | LifecycleState::Ended) {
        info!(target: PLAYER_LOG_TARGET, "AddVideo: playlist was empty, starting playback automatically.");
        handle_load(player, index).await;
    }
}

/// Removes an entry. Removing the current entry stops playback.
#[instrument(skip(player))]
pub async fn handle_remove(player: &mut Player, index: usize) {
    let was_current = player.playlist.playlist().current_index() == Some(index);
    let Some(removed) = player.playlist.remove(index) else {
        warn!(target: PLAYER_LOG_TARGET, "Remove: index {} out of range.", index);
        return;
    };
    info!(target: PLAYER_LOG_TARGET, index, video_id = %removed.id, "Removed video from playlist.");

    if was_current {
        halt_playback(player).await;
    }
    player.broadcast_snapshot();
}

/// Halts the engine and returns to `Idle`. The cursor stays where it is, so a
/// later play reloads the same entry.
#[instrument(skip(player))]
pub async fn handle_stop(player: &mut Player) {
    if player.session.lifecycle == LifecycleState::Idle {
        debug!(target: PLAYER_LOG_TARGET, "Stop: already idle.");
        return;
    }
    info!(target: PLAYER_LOG_TARGET, "Stopping playback.");
    halt_playback(player).await;
    player.broadcast_snapshot();
}

async fn halt_playback(player: &mut Player) {
    if player.session.lifecycle != LifecycleState::Idle {
        if let Err(e) = player.capability.pause().await {
            debug!(target: PLAYER_LOG_TARGET, "Capability failed to stop: {}", e);
        }
    }
    player.stop_metadata_polling();
    player.session.current_track_id = None;
    player.set_lifecycle(LifecycleState::Idle);
}

/// Clamps, persists and applies a volume, toggling mute when crossing zero.
#[instrument(skip(player))]
pub async fn handle_set_volume(player: &mut Player, value: i64) {
    let change = player.session.set_volume(value);
    debug!(target: PLAYER_LOG_TARGET, requested = value, volume = change.volume, muted = change.muted, "Setting volume.");
    player.persist_volume();

    if let Err(e) = player.capability.set_volume(change.volume).await {
        warn!(target: PLAYER_LOG_TARGET, "Capability failed to set volume: {}", e);
    }
    match player.capability.is_muted().await {
        Ok(engine_muted) if engine_muted != change.muted => {
            let result = if change.muted {
                player.capability.mute().await
            } else {
                player.capability.unmute().await
            };
            if let Err(e) = result {
                warn!(target: PLAYER_LOG_TARGET, "Capability failed to toggle mute: {}", e);
            }
        }
        Ok(_) => {}
        Err(e) => warn!(target: PLAYER_LOG_TARGET, "Could not read mute state: {}", e),
    }

    player.broadcast_update(PlayerStateUpdate::Volume(change.volume));
}

#[instrument(skip(player))]
pub async fn handle_capability_event(player: &mut Player, event: CapabilityEvent) {
    let state = player.session.lifecycle;
    match event {
        CapabilityEvent::Started => match state {
            LifecycleState::Loading | LifecycleState::Paused => {
                player.set_lifecycle(LifecycleState::Playing);
                refresh_metadata(player).await;
                player.start_metadata_polling();
                player.broadcast_snapshot();
            }
            LifecycleState::Playing => trace!(target: PLAYER_LOG_TARGET, "Duplicate started event."),
            LifecycleState::Idle | LifecycleState::Ended => {
                warn!(target: PLAYER_LOG_TARGET, %state, "Ignoring started event with no load in progress.");
            }
        },
        CapabilityEvent::Paused => match state {
            LifecycleState::Playing | LifecycleState::Loading => player.set_lifecycle(LifecycleState::Paused),
            _ => trace!(target: PLAYER_LOG_TARGET, %state, "Ignoring paused event."),
        },
        CapabilityEvent::Ended => {
            if state == LifecycleState::Idle {
                trace!(target: PLAYER_LOG_TARGET, "Ignoring ended event while idle.");
                return;
            }
            player.set_lifecycle(LifecycleState::Ended);
            match player.playlist.playlist().next_index() {
                Some(index) => {
                    debug!(target: PLAYER_LOG_TARGET, index, "Track ended, advancing.");
                    handle_load(player, index).await;
                }
                None => {
                    info!(target: PLAYER_LOG_TARGET, "Track ended and playlist is empty.");
                    player.session.current_track_id = None;
                    player.set_lifecycle(LifecycleState::Idle);
                    player.broadcast_snapshot();
                }
            }
        }
    }
}

/// Re-reads metadata and re-broadcasts the snapshot. Ticks from a poller
/// that has since been replaced are dropped.
#[instrument(skip(player))]
pub async fn handle_metadata_tick(player: &mut Player, generation: u64) {
    let active = player.metadata_poller.as_ref().map(|p| p.generation());
    if player.session.lifecycle != LifecycleState::Playing || active != Some(generation) {
        trace!(target: PLAYER_LOG_TARGET, generation, ?active, "Dropping stale metadata tick.");
        return;
    }
    refresh_metadata(player).await;
    player.broadcast_snapshot();
}

/// Best-effort enrichment of the current entry. Returns true if it changed.
async fn refresh_metadata(player: &mut Player) -> bool {
    let Some(index) = player.playlist.playlist().current_index() else {
        return false;
    };
    let metadata = match player.capability.metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(target: PLAYER_LOG_TARGET, "Metadata unavailable: {}", e);
            return false;
        }
    };

    let expected = player.session.current_track_id.as_deref();
    let entry_id = player.playlist.playlist().get(index).map(|t| t.id.as_str());
    if entry_id != expected {
        debug!(target: PLAYER_LOG_TARGET, "Current entry changed since load, skipping enrichment.");
        return false;
    }
    if let Some(reported) = metadata.video_id.as_deref() {
        if Some(reported) != expected {
            debug!(target: PLAYER_LOG_TARGET, reported, "Metadata belongs to another video, skipping enrichment.");
            return false;
        }
    }
    if metadata.title.is_empty() {
        return false;
    }

    let changed = player.playlist.enrich(index, &metadata.title, &metadata.author);
    if changed {
        info!(target: PLAYER_LOG_TARGET, index, title = %metadata.title, "Enriched track metadata.");
    }
    changed
}
