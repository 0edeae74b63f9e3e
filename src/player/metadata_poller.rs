// src/player/metadata_poller.rs

use crate::player::{PlayerCommand, PLAYER_LOG_TARGET};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, instrument, trace};

/// Periodic metadata refresh tied to one stay in the `Playing` state.
///
/// The task only sends [`PlayerCommand::MetadataTick`] back to the player;
/// the player does the actual work. Stopping (or dropping) the poller ends
/// the task, and the generation number lets the player discard ticks that
/// were already queued.
#[derive(Debug)]
pub struct MetadataPoller {
    task_handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
    generation: u64,
}

impl MetadataPoller {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stops the task. Ticks already in the player's queue remain, tagged
    /// with this poller's generation.
    #[instrument(skip(self), fields(generation = self.generation))]
    pub fn stop(self) {
        debug!(target: PLAYER_LOG_TARGET, "Stopping metadata poller.");
        // Drop does the rest.
    }
}

impl Drop for MetadataPoller {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            trace!(target: PLAYER_LOG_TARGET, generation = self.generation, "Poller already finished: {}", e);
        }
        self.task_handle.abort();
    }
}

/// Spawns a poller that ticks every `period`, first tick one period from now.
pub fn spawn_metadata_poller(
    period: Duration,
    generation: u64,
    internal_cmd_tx: mpsc::Sender<PlayerCommand>,
) -> MetadataPoller {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    debug!(target: PLAYER_LOG_TARGET, generation, ?period, "Spawning metadata poller.");
    let task_handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    trace!(target: PLAYER_LOG_TARGET, generation, "Metadata poll tick.");
                    if internal_cmd_tx.send(PlayerCommand::MetadataTick { generation }).await.is_err() {
                        break;
                    }
                }
            }
        }
        trace!(target: PLAYER_LOG_TARGET, generation, "Metadata poller finished.");
    });

    MetadataPoller {
        task_handle,
        shutdown_tx,
        generation,
    }
}
