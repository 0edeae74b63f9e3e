//! Common utilities for controller/display integration tests
//!
//! This module provides shared functionality across all test types.

#![allow(dead_code)]

use nowplaying_sync::display::{
    ConnectionState, DisplayClient, DisplayCommand, DisplayOptions, DisplayReplica, DisplayView, NoDiscovery, ViewRefresh,
};
use nowplaying_sync::player::{HeadlessCapability, Player, PlayerCommand, PlayerOptions};
use nowplaying_sync::storage::{KeyValueStore, MemoryStore};
use nowplaying_sync::sync::{ControllerLink, SyncSnapshot};
use nowplaying_sync::transport::{Connector, Endpoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long integration tests wait for state to propagate.
pub const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(5);

/// A running player with the pieces tests poke at.
pub struct ControllerHarness {
    pub command_tx: mpsc::Sender<PlayerCommand>,
    pub link: ControllerLink,
    pub capability: Arc<HeadlessCapability>,
    handle: JoinHandle<()>,
}

impl ControllerHarness {
    pub fn start(store: Arc<dyn KeyValueStore>) -> Self {
        let (capability, capability_rx) = HeadlessCapability::new();
        let capability = Arc::new(capability);
        let options = PlayerOptions {
            metadata_poll_interval: Duration::from_millis(200),
            ..PlayerOptions::default()
        };
        let (mut player, command_tx) = Player::new(capability.clone(), capability_rx, store, options);
        let link = ControllerLink::new(command_tx.clone(), player.state_update_sender());
        let handle = tokio::spawn(async move {
            player.run().await;
        });
        Self {
            command_tx,
            link,
            capability,
            handle,
        }
    }

    pub async fn snapshot(&self) -> SyncSnapshot {
        self.link.snapshot().await.expect("player task is gone")
    }

    pub async fn send(&self, command: PlayerCommand) {
        self.command_tx.send(command).await.expect("player task is gone");
    }

    /// Polls the player until its snapshot satisfies `predicate`. Displays
    /// echo some changes locally, so their replica alone does not prove the
    /// controller applied a command.
    pub async fn wait_for_snapshot(&self, predicate: impl Fn(&SyncSnapshot) -> bool) -> SyncSnapshot {
        timeout(PROPAGATION_TIMEOUT, async {
            loop {
                let snapshot = self.snapshot().await;
                if predicate(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("timed out waiting for the controller snapshot")
    }

    pub async fn shutdown(self) {
        let _ = self.command_tx.send(PlayerCommand::Shutdown).await;
        let _ = self.handle.await;
    }
}

/// Publishes every replica the display renders.
pub struct WatchView {
    latest: DisplayReplica,
    replica_tx: watch::Sender<DisplayReplica>,
    state_tx: watch::Sender<ConnectionState>,
}

impl DisplayView for WatchView {
    fn render(&mut self, replica: &DisplayReplica, _refresh: ViewRefresh) {
        self.latest = replica.clone();
        self.replica_tx.send_replace(self.latest.clone());
    }

    fn volume_changed(&mut self, volume: u8) {
        self.latest.volume = Some(volume);
        self.replica_tx.send_replace(self.latest.clone());
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

pub struct DisplayHarness {
    pub commands: mpsc::Sender<DisplayCommand>,
    pub replica: watch::Receiver<DisplayReplica>,
    pub state: watch::Receiver<ConnectionState>,
    handle: JoinHandle<()>,
}

impl DisplayHarness {
    pub fn start(connector: Arc<dyn Connector>, endpoint: Endpoint) -> Self {
        let (replica_tx, replica) = watch::channel(DisplayReplica::default());
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let view = WatchView {
            latest: DisplayReplica::default(),
            replica_tx,
            state_tx,
        };
        let (mut client, commands) = DisplayClient::new(
            connector,
            Box::new(NoDiscovery),
            Arc::new(MemoryStore::new()),
            Box::new(view),
            DisplayOptions::new(endpoint),
        );
        let handle = tokio::spawn(async move {
            client.run().await;
        });
        Self {
            commands,
            replica,
            state,
            handle,
        }
    }

    pub async fn send(&self, command: DisplayCommand) {
        self.commands.send(command).await.expect("display task is gone");
    }

    /// Waits until the rendered replica satisfies `predicate`.
    pub async fn wait_for(&mut self, predicate: impl Fn(&DisplayReplica) -> bool) -> DisplayReplica {
        let replica = &mut self.replica;
        timeout(PROPAGATION_TIMEOUT, async {
            loop {
                {
                    let current = replica.borrow_and_update();
                    if predicate(&current) {
                        return current.clone();
                    }
                }
                replica.changed().await.expect("display task is gone");
            }
        })
        .await
        .expect("timed out waiting for the display replica")
    }

    pub async fn wait_for_state(&mut self, wanted: ConnectionState) {
        let state = &mut self.state;
        timeout(PROPAGATION_TIMEOUT, async {
            while *state.borrow_and_update() != wanted {
                state.changed().await.expect("display task is gone");
            }
        })
        .await
        .expect("timed out waiting for the connection state")
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(DisplayCommand::Shutdown).await;
        let _ = self.handle.await;
    }
}
