//! Wire messages exchanged between the controller and displays.
//!
//! Every frame is a UTF-8 JSON object tagged by `command`. Snapshots may also
//! arrive untagged as a bare `{title, author, playlist, currentIndex}` object
//! from older producers; [`decode`] folds that shape into
//! [`Message::NowPlaying`].

use crate::playlist::{deserialize_cursor, Track};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Title shown when the controller has nothing queued.
pub const NO_SONG_TITLE: &str = "No song playing";

/// Names accepted in the `command` field.
pub const COMMAND_NAMES: &[&str] = &[
    "requestCurrentSongInfo",
    "ping",
    "pong",
    "nowPlaying",
    "volumeUpdate",
    "play",
    "pause",
    "next",
    "previous",
    "addVideo",
    "loadVideo",
    "volume",
    "removeVideo",
];

/// State projection broadcast from the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<Vec<Track>>,
    #[serde(
        default,
        deserialize_with = "deserialize_cursor",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
}

impl SyncSnapshot {
    /// Snapshot for a controller with an empty playlist.
    pub fn empty() -> Self {
        Self {
            title: NO_SONG_TITLE.to_string(),
            author: String::new(),
            video_id: None,
            playlist: Some(Vec::new()),
            current_index: None,
            volume: None,
        }
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Message {
    RequestCurrentSongInfo,
    Ping,
    Pong,
    NowPlaying {
        params: SyncSnapshot,
    },
    VolumeUpdate {
        #[serde(deserialize_with = "deserialize_lenient_int")]
        value: i64,
    },
    Play,
    Pause,
    Next,
    Previous,
    AddVideo {
        url: String,
    },
    LoadVideo {
        #[serde(deserialize_with = "deserialize_lenient_int")]
        index: i64,
    },
    Volume {
        #[serde(deserialize_with = "deserialize_lenient_int")]
        value: i64,
    },
    RemoveVideo {
        #[serde(deserialize_with = "deserialize_lenient_int")]
        index: i64,
    },
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::RequestCurrentSongInfo => "requestCurrentSongInfo",
            Message::Ping => "ping",
            Message::Pong => "pong",
            Message::NowPlaying { .. } => "nowPlaying",
            Message::VolumeUpdate { .. } => "volumeUpdate",
            Message::Play => "play",
            Message::Pause => "pause",
            Message::Next => "next",
            Message::Previous => "previous",
            Message::AddVideo { .. } => "addVideo",
            Message::LoadVideo { .. } => "loadVideo",
            Message::Volume { .. } => "volume",
            Message::RemoveVideo { .. } => "removeVideo",
        }
    }

    /// Whether the message is sent by the controller to displays.
    pub fn is_controller_bound(&self) -> bool {
        !matches!(
            self,
            Message::Pong | Message::NowPlaying { .. } | Message::VolumeUpdate { .. }
        )
    }
}

/// Reasons a frame could not be turned into a [`Message`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Frame is not a JSON object")]
    NotAnObject,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Invalid payload for command {command}: {source}")]
    InvalidPayload {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid bare snapshot: {0}")]
    InvalidSnapshot(#[source] serde_json::Error),
    #[error("Frame has neither a command nor snapshot fields")]
    Unrecognized,
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decodes one text frame.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    if let Some(command) = object.get("command") {
        let name = command.as_str().unwrap_or_default().to_string();
        if !COMMAND_NAMES.contains(&name.as_str()) {
            return Err(ProtocolError::UnknownCommand(command.to_string()));
        }
        return serde_json::from_value::<Message>(value)
            .map_err(|source| ProtocolError::InvalidPayload { command: name, source });
    }

    if object.contains_key("title") {
        let params = serde_json::from_value::<SyncSnapshot>(value).map_err(ProtocolError::InvalidSnapshot)?;
        return Ok(Message::NowPlaying { params });
    }

    Err(ProtocolError::Unrecognized)
}

/// Encodes a message as one text frame.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// Accepts integers, floats (rounded) and numeric strings, as produced by
/// browser range inputs.
fn deserialize_lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| D::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.round() as i64)
            .map_err(|_| D::Error::custom(format!("not a number: {}", s))),
        other => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}
