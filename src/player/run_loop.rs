// src/player/run_loop.rs
use super::{command_handler, Player, PlayerCommand, PLAYER_LOG_TARGET};
use tracing::{info, trace, warn};

/// Runs the player's command processing loop.
pub async fn run_player_loop(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Player run loop started.");
    player.sync_capability_volume().await;

    loop {
        tokio::select! {
            biased; // Check commands first

            // --- Command Processing ---
            Some(command) = player.command_rx.recv() => {
                trace!(target: PLAYER_LOG_TARGET, "Received command: {:?}", command);
                match command {
                    PlayerCommand::Play => command_handler::handle_play(player).await,
                    PlayerCommand::Pause => command_handler::handle_pause(player).await,
                    PlayerCommand::Stop => command_handler::handle_stop(player).await,
                    PlayerCommand::Next => command_handler::handle_next(player).await,
                    PlayerCommand::Previous => command_handler::handle_previous(player).await,
                    PlayerCommand::Load { index } => command_handler::handle_load(player, index).await,
                    PlayerCommand::AddVideo { url, reply } => command_handler::handle_add_video(player, url, reply).await,
                    PlayerCommand::Remove { index } => command_handler::handle_remove(player, index).await,
                    PlayerCommand::SetVolume { value } => command_handler::handle_set_volume(player, value).await,
                    PlayerCommand::GetSnapshot(responder) => {
                        let _ = responder.send(player.snapshot()); // Ignore error if receiver dropped
                    }
                    PlayerCommand::MetadataTick { generation } => command_handler::handle_metadata_tick(player, generation).await,
                    PlayerCommand::Shutdown => {
                        info!(target: PLAYER_LOG_TARGET, "Shutdown command received. Exiting run loop.");
                        break;
                    }
                }
            }

            // --- Capability Lifecycle Events ---
            Some(event) = player.capability_rx.recv() => {
                trace!(target: PLAYER_LOG_TARGET, ?event, "Received capability event.");
                command_handler::handle_capability_event(player, event).await;
            }

            else => {
                warn!(target: PLAYER_LOG_TARGET, "All player channels closed. Exiting run loop.");
                break;
            }
        }
    }

    // --- Cleanup ---
    player.stop_metadata_polling();
    player.playlist.persist();
    info!(target: PLAYER_LOG_TARGET, "Player run loop finished.");
}
