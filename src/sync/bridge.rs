//! Controller-side connection handling.
//!
//! Each display connection gets its own task that pushes the current state on
//! open, forwards player state updates as they are broadcast, answers
//! `ping` and `requestCurrentSongInfo` directly, and turns control commands
//! into [`PlayerCommand`]s.

use crate::player::{PlayerCommand, PlayerStateUpdate};
use crate::sync::protocol::{Message, SyncSnapshot};
use crate::transport::{Channel, LocalAcceptor, TransportError, WsChannel};
use std::io::ErrorKind;
use std::path::Path;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace, warn};

const BRIDGE_LOG_TARGET: &str = "nowplaying_sync::sync::bridge";

/// How many successive ports `--auto-port` tries.
pub const AUTO_PORT_ATTEMPTS: u16 = 10;

/// What a connection task needs from the controller.
#[derive(Clone)]
pub struct ControllerLink {
    command_tx: mpsc::Sender<PlayerCommand>,
    updates: broadcast::Sender<PlayerStateUpdate>,
}

impl ControllerLink {
    pub fn new(command_tx: mpsc::Sender<PlayerCommand>, updates: broadcast::Sender<PlayerStateUpdate>) -> Self {
        Self { command_tx, updates }
    }

    /// Asks the player for its current snapshot. `None` if the player is gone.
    pub async fn snapshot(&self) -> Option<SyncSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(PlayerCommand::GetSnapshot(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn forward(&self, command: PlayerCommand) -> bool {
        match self.command_tx.send(command).await {
            Ok(()) => true,
            Err(e) => {
                error!(target: BRIDGE_LOG_TARGET, "Failed to send command to player task: {}", e);
                false
            }
        }
    }
}

/// Maps a display-originated message to a player command.
///
/// Returns `None` for messages the controller answers itself, for
/// controller-to-display messages, and for negative indices.
pub fn into_player_command(message: Message) -> Option<PlayerCommand> {
    match message {
        Message::Play => Some(PlayerCommand::Play),
        Message::Pause => Some(PlayerCommand::Pause),
        Message::Next => Some(PlayerCommand::Next),
        Message::Previous => Some(PlayerCommand::Previous),
        Message::AddVideo { url } => Some(PlayerCommand::AddVideo { url, reply: None }),
        Message::LoadVideo { index } => usize::try_from(index)
            .ok()
            .map(|index| PlayerCommand::Load { index }),
        Message::RemoveVideo { index } => usize::try_from(index)
            .ok()
            .map(|index| PlayerCommand::Remove { index }),
        Message::Volume { value } => Some(PlayerCommand::SetVolume { value }),
        Message::RequestCurrentSongInfo
        | Message::Ping
        | Message::Pong
        | Message::NowPlaying { .. }
        | Message::VolumeUpdate { .. } => None,
    }
}

/// Converts a player update into the message displays receive.
fn outbound_message(update: PlayerStateUpdate) -> Option<Message> {
    match update {
        PlayerStateUpdate::Snapshot(params) => Some(Message::NowPlaying { params }),
        PlayerStateUpdate::Volume(value) => Some(Message::VolumeUpdate { value: value as i64 }),
        PlayerStateUpdate::Lifecycle(_) => None,
    }
}

/// Sends the full snapshot followed by the volume.
async fn push_state(channel: &mut dyn Channel, link: &ControllerLink) -> Result<(), TransportError> {
    let Some(snapshot) = link.snapshot().await else {
        return Err(TransportError::Closed);
    };
    let volume = snapshot.volume;
    channel.send(&Message::NowPlaying { params: snapshot }).await?;
    if let Some(value) = volume {
        channel.send(&Message::VolumeUpdate { value: value as i64 }).await?;
    }
    Ok(())
}

/// Serves one display connection until it closes or the controller stops.
#[instrument(skip(channel, link), fields(peer = %channel.peer()))]
pub async fn serve_channel(mut channel: Box<dyn Channel>, link: ControllerLink) {
    let mut updates = link.updates.subscribe();
    info!(target: BRIDGE_LOG_TARGET, "Display connected.");

    if let Err(e) = push_state(channel.as_mut(), &link).await {
        warn!(target: BRIDGE_LOG_TARGET, "Failed to push initial state: {}", e);
        channel.close().await;
        return;
    }

    loop {
        tokio::select! {
            inbound = channel.recv() => match inbound {
                Ok(Some(message)) => {
                    trace!(target: BRIDGE_LOG_TARGET, "Received command: {}", message.name());
                    if let Err(e) = handle_inbound(message, channel.as_mut(), &link).await {
                        warn!(target: BRIDGE_LOG_TARGET, "Failed to reply: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    info!(target: BRIDGE_LOG_TARGET, "Display closed the connection.");
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(target: BRIDGE_LOG_TARGET, "Ignoring malformed frame: {}", e);
                }
                Err(e) => {
                    info!(target: BRIDGE_LOG_TARGET, "Display connection dropped: {}", e);
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(update) => {
                    if let Some(message) = outbound_message(update) {
                        if let Err(e) = channel.send(&message).await {
                            info!(target: BRIDGE_LOG_TARGET, "Failed to forward {}: {}", message.name(), e);
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Snapshots are level-triggered; resend the latest instead of replaying.
                    warn!(target: BRIDGE_LOG_TARGET, missed, "Connection lagged behind, resending full state.");
                    if let Err(e) = push_state(channel.as_mut(), &link).await {
                        info!(target: BRIDGE_LOG_TARGET, "Failed to resend state: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(target: BRIDGE_LOG_TARGET, "Player stopped, closing connection.");
                    channel.close().await;
                    break;
                }
            },
        }
    }
}

async fn handle_inbound(
    message: Message,
    channel: &mut dyn Channel,
    link: &ControllerLink,
) -> Result<(), TransportError> {
    match message {
        Message::Ping => channel.send(&Message::Pong).await,
        Message::RequestCurrentSongInfo => match link.snapshot().await {
            Some(params) => channel.send(&Message::NowPlaying { params }).await,
            None => Err(TransportError::Closed),
        },
        other if !other.is_controller_bound() => {
            debug!(target: BRIDGE_LOG_TARGET, "Ignoring display-bound message {} from a display.", other.name());
            Ok(())
        }
        other => {
            let name = other.name();
            match into_player_command(other) {
                Some(command) => {
                    link.forward(command).await;
                }
                None => warn!(target: BRIDGE_LOG_TARGET, "Dropping {} with an invalid index.", name),
            }
            Ok(())
        }
    }
}

/// Binds the controller's listener.
///
/// With `auto_port`, a taken port moves the search up by one, at most
/// [`AUTO_PORT_ATTEMPTS`] times.
pub async fn bind_listener(host: &str, port: u16, auto_port: bool) -> Result<(TcpListener, u16), TransportError> {
    let attempts = if auto_port { AUTO_PORT_ATTEMPTS } else { 1 };
    let mut last_error = None;
    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                if offset > 0 {
                    warn!(target: BRIDGE_LOG_TARGET, "Port {} is in use, using port {} instead.", port, bound);
                }
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(target: BRIDGE_LOG_TARGET, "Port {} is in use.", candidate);
                last_error = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_error
        .map(TransportError::from)
        .unwrap_or_else(|| TransportError::InvalidEndpoint(format!("{}:{}", host, port))))
}

/// Accepts WebSocket connections until `shutdown` fires.
pub async fn run_websocket_server(listener: TcpListener, link: ControllerLink, mut shutdown: broadcast::Receiver<()>) {
    if let Ok(addr) = listener.local_addr() {
        info!(target: BRIDGE_LOG_TARGET, "WebSocket server listening on ws://{}", addr);
    }
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let link = link.clone();
                    tokio::spawn(async move {
                        match WsChannel::accept(stream).await {
                            Ok(channel) => serve_channel(Box::new(channel), link).await,
                            Err(e) => warn!(target: BRIDGE_LOG_TARGET, %addr, "WebSocket handshake failed: {}", e),
                        }
                    });
                }
                Err(e) => warn!(target: BRIDGE_LOG_TARGET, "Failed to accept connection: {}", e),
            },
            _ = shutdown.recv() => {
                info!(target: BRIDGE_LOG_TARGET, "WebSocket server shutting down.");
                break;
            }
        }
    }
}

/// Serves in-process connections until every connector is dropped.
pub async fn run_local_server(mut acceptor: LocalAcceptor, link: ControllerLink) {
    while let Some(channel) = acceptor.accept().await {
        tokio::spawn(serve_channel(Box::new(channel), link.clone()));
    }
    debug!(target: BRIDGE_LOG_TARGET, "Local hub closed.");
}

/// Records the bound port so displays can find a controller that moved.
pub fn write_port_file(path: &Path, port: u16) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, port.to_string())
}

pub fn remove_port_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(target: BRIDGE_LOG_TARGET, "Removed port file {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(target: BRIDGE_LOG_TARGET, "Failed to remove port file {}: {}", path.display(), e),
    }
}
