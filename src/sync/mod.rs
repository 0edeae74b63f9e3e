//! Sync protocol: message schema plus the controller's connection bridge.

pub mod bridge;
pub mod protocol;

pub use bridge::{into_player_command, serve_channel, ControllerLink};
pub use protocol::{decode, encode, Message, ProtocolError, SyncSnapshot};
