//! The display's connection loop.
//!
//! One cycle is: connect, ask for the current state, then mirror every
//! snapshot until the channel closes. Unclean closes and failed connects are
//! retried with [`Backoff`]; a clean close waits for an explicit
//! [`DisplayCommand::Reconnect`]. Every timer belongs to the cycle that armed
//! it and is dropped with it.

use super::discovery::EndpointDiscovery;
use super::reconnect::{Backoff, BackoffPolicy, ConnectionState};
use super::replica::{DisplayReplica, ViewRefresh};
use crate::storage::KeyValueStore;
use crate::sync::protocol::Message;
use crate::transport::{Channel, Connector, Endpoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

const CLIENT_LOG_TARGET: &str = "nowplaying_sync::display::client";

/// Rendering surface for a display. The core only says what changed.
pub trait DisplayView: Send {
    fn render(&mut self, replica: &DisplayReplica, refresh: ViewRefresh);
    fn volume_changed(&mut self, volume: u8);
    fn connection_changed(&mut self, state: ConnectionState);
}

/// Requests from the display's own control surface.
#[derive(Debug)]
pub enum DisplayCommand {
    /// Send a control message to the controller.
    Send(Message),
    Reconnect,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub endpoint: Endpoint,
    pub heartbeat: Duration,
    pub snapshot_retry: Duration,
    pub backoff: BackoffPolicy,
    pub command_buffer_size: usize,
}

impl DisplayOptions {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            heartbeat: Duration::from_secs(30),
            snapshot_retry: Duration::from_secs(2),
            backoff: BackoffPolicy::default(),
            command_buffer_size: 32,
        }
    }
}

/// Why a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    CleanClose,
    Dropped,
    /// The heartbeat found the channel already closed.
    HeartbeatMissed,
    ReconnectRequested,
}

/// Outcome of waiting between connection attempts.
enum Wait {
    Connect,
    Shutdown,
}

pub struct DisplayClient {
    connector: Arc<dyn Connector>,
    discovery: Box<dyn EndpointDiscovery>,
    store: Arc<dyn KeyValueStore>,
    view: Box<dyn DisplayView>,
    endpoint: Endpoint,
    heartbeat: Duration,
    snapshot_retry: Duration,
    replica: DisplayReplica,
    backoff: Backoff,
    state: ConnectionState,
    command_rx: mpsc::Receiver<DisplayCommand>,
}

impl DisplayClient {
    /// Creates a client whose replica is restored from `store`.
    pub fn new(
        connector: Arc<dyn Connector>,
        discovery: Box<dyn EndpointDiscovery>,
        store: Arc<dyn KeyValueStore>,
        view: Box<dyn DisplayView>,
        options: DisplayOptions,
    ) -> (Self, mpsc::Sender<DisplayCommand>) {
        let (command_tx, command_rx) = mpsc::channel(options.command_buffer_size);
        let replica = DisplayReplica::restore(store.as_ref());
        let client = Self {
            connector,
            discovery,
            store,
            view,
            endpoint: options.endpoint,
            heartbeat: options.heartbeat,
            snapshot_retry: options.snapshot_retry,
            replica,
            backoff: Backoff::new(options.backoff),
            state: ConnectionState::Disconnected,
            command_rx,
        };
        (client, command_tx)
    }

    pub fn replica(&self) -> &DisplayReplica {
        &self.replica
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Runs until shut down. Spawn it as its own task.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn run(&mut self) {
        info!(target: CLIENT_LOG_TARGET, "Display client started.");
        self.view.render(&self.replica, ViewRefresh::Updated);

        // `None` parks the client until the operator asks to reconnect.
        let mut next_delay = Some(Duration::ZERO);
        loop {
            let wait = match next_delay {
                Some(delay) => self.wait_for_retry(delay).await,
                None => self.wait_for_reconnect_request().await,
            };
            if let Wait::Shutdown = wait {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            debug!(target: CLIENT_LOG_TARGET, "Connecting to {}", self.endpoint);
            next_delay = match self.connector.connect(&self.endpoint).await {
                Ok(channel) => match self.run_session(channel).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::CleanClose => {
                        info!(target: CLIENT_LOG_TARGET, "Controller closed the connection.");
                        None
                    }
                    SessionEnd::Dropped => Some(self.plan_reconnect().await),
                    SessionEnd::HeartbeatMissed | SessionEnd::ReconnectRequested => Some(Duration::ZERO),
                },
                Err(e) => {
                    warn!(target: CLIENT_LOG_TARGET, "Could not connect to {}: {}", self.endpoint, e);
                    self.set_state(ConnectionState::Disconnected);
                    Some(self.plan_reconnect().await)
                }
            };
        }

        self.set_state(ConnectionState::Disconnected);
        info!(target: CLIENT_LOG_TARGET, "Display client stopped.");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(target: CLIENT_LOG_TARGET, from = %self.state, to = %state, "Connection state changed.");
            self.state = state;
            self.view.connection_changed(state);
        }
    }

    /// Advances the backoff and runs discovery when it is due.
    async fn plan_reconnect(&mut self) -> Duration {
        let plan = self.backoff.on_failure();
        if plan.discover {
            info!(target: CLIENT_LOG_TARGET, attempt = plan.attempt, "Repeated failures, looking for the controller elsewhere.");
            if let Some(found) = self.discovery.discover(&self.endpoint).await {
                if found != self.endpoint {
                    info!(target: CLIENT_LOG_TARGET, "Switching endpoint from {} to {}", self.endpoint, found);
                    self.endpoint = found;
                }
            }
        }
        info!(target: CLIENT_LOG_TARGET, attempt = plan.attempt, delay_ms = plan.delay.as_millis() as u64, "Reconnecting after delay.");
        plan.delay
    }

    async fn wait_for_retry(&mut self, delay: Duration) -> Wait {
        let retry = sleep(delay);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                biased;
                command = self.command_rx.recv() => match command {
                    None | Some(DisplayCommand::Shutdown) => return Wait::Shutdown,
                    Some(DisplayCommand::Reconnect) => return Wait::Connect,
                    Some(DisplayCommand::Send(message)) => self.drop_offline(message),
                },
                _ = &mut retry => return Wait::Connect,
            }
        }
    }

    async fn wait_for_reconnect_request(&mut self) -> Wait {
        loop {
            match self.command_rx.recv().await {
                None | Some(DisplayCommand::Shutdown) => return Wait::Shutdown,
                Some(DisplayCommand::Reconnect) => return Wait::Connect,
                Some(DisplayCommand::Send(message)) => self.drop_offline(message),
            }
        }
    }

    fn drop_offline(&mut self, message: Message) {
        self.echo_local(&message);
        warn!(target: CLIENT_LOG_TARGET, "Not connected, dropping {}.", message.name());
    }

    /// Optimistic local echo of a volume change.
    fn echo_local(&mut self, message: &Message) {
        if let Message::Volume { value } = message {
            if self.replica.apply_volume(*value) {
                if let Some(volume) = self.replica.volume {
                    self.view.volume_changed(volume);
                }
                self.replica.persist(self.store.as_ref());
            }
        }
    }

    async fn run_session(&mut self, mut channel: Box<dyn Channel>) -> SessionEnd {
        self.backoff.reset();
        self.set_state(ConnectionState::Connected);
        info!(target: CLIENT_LOG_TARGET, peer = %channel.peer(), "Connected to controller.");

        let end = self.session_loop(channel.as_mut()).await;
        match end {
            SessionEnd::Shutdown | SessionEnd::ReconnectRequested => channel.close().await,
            SessionEnd::CleanClose | SessionEnd::Dropped | SessionEnd::HeartbeatMissed => {}
        }
        self.set_state(ConnectionState::Disconnected);
        end
    }

    async fn session_loop(&mut self, channel: &mut dyn Channel) -> SessionEnd {
        if let Err(e) = channel.send(&Message::RequestCurrentSongInfo).await {
            warn!(target: CLIENT_LOG_TARGET, "Failed to request current state: {}", e);
            return SessionEnd::Dropped;
        }

        let mut snapshot_seen = false;
        let mut retry_armed = true;
        let retry = sleep(self.snapshot_retry);
        tokio::pin!(retry);

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    None | Some(DisplayCommand::Shutdown) => return SessionEnd::Shutdown,
                    Some(DisplayCommand::Reconnect) => return SessionEnd::ReconnectRequested,
                    Some(DisplayCommand::Send(message)) => {
                        self.echo_local(&message);
                        if let Err(e) = channel.send(&message).await {
                            warn!(target: CLIENT_LOG_TARGET, "Failed to send {}: {}", message.name(), e);
                            return SessionEnd::Dropped;
                        }
                    }
                },

                inbound = channel.recv() => match inbound {
                    Ok(Some(message)) => {
                        if self.handle_message(message) {
                            snapshot_seen = true;
                            retry_armed = false;
                        }
                    }
                    Ok(None) => return SessionEnd::CleanClose,
                    Err(e) if e.is_recoverable() => {
                        warn!(target: CLIENT_LOG_TARGET, "Ignoring malformed frame: {}", e);
                    }
                    Err(e) => {
                        warn!(target: CLIENT_LOG_TARGET, "Connection dropped: {}", e);
                        return SessionEnd::Dropped;
                    }
                },

                _ = &mut retry, if retry_armed => {
                    retry_armed = false;
                    if !snapshot_seen {
                        info!(target: CLIENT_LOG_TARGET, "No state received yet, asking again.");
                        if let Err(e) = channel.send(&Message::RequestCurrentSongInfo).await {
                            warn!(target: CLIENT_LOG_TARGET, "Failed to repeat state request: {}", e);
                            return SessionEnd::Dropped;
                        }
                    }
                }

                _ = heartbeat.tick() => {
                    if !channel.is_open() {
                        warn!(target: CLIENT_LOG_TARGET, "Heartbeat found the channel closed, reconnecting.");
                        return SessionEnd::HeartbeatMissed;
                    }
                    trace!(target: CLIENT_LOG_TARGET, "Sending heartbeat.");
                    if let Err(e) = channel.send(&Message::Ping).await {
                        warn!(target: CLIENT_LOG_TARGET, "Heartbeat failed: {}", e);
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }

    /// Applies one inbound message. Returns true if it was a snapshot.
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::NowPlaying { params } => {
                let refresh = self.replica.apply_snapshot(&params);
                if refresh != ViewRefresh::Unchanged {
                    self.replica.persist(self.store.as_ref());
                    self.view.render(&self.replica, refresh);
                }
                true
            }
            Message::VolumeUpdate { value } => {
                if self.replica.apply_volume(value) {
                    self.replica.persist(self.store.as_ref());
                    if let Some(volume) = self.replica.volume {
                        self.view.volume_changed(volume);
                    }
                }
                false
            }
            Message::Pong => {
                trace!(target: CLIENT_LOG_TARGET, "Heartbeat acknowledged.");
                false
            }
            other => {
                debug!(target: CLIENT_LOG_TARGET, "Ignoring {} sent to a display.", other.name());
                false
            }
        }
    }
}
