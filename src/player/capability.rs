//! Interface to the media engine that actually plays videos.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

const CAPABILITY_LOG_TARGET: &str = "nowplaying_sync::player::capability";

/// Lifecycle notifications emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityEvent {
    Started,
    Paused,
    Ended,
}

/// Metadata reported for the loaded video.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoMetadata {
    /// Id the metadata belongs to, when the engine reports it.
    pub video_id: Option<String>,
    pub title: String,
    pub author: String,
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("No video loaded")]
    NotLoaded,
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),
    #[error("Playback engine error: {0}")]
    Engine(String),
}

/// Operations the controller needs from a media engine. Lifecycle events are
/// delivered separately through the channel handed out when the engine is
/// created.
#[async_trait]
pub trait PlaybackCapability: Send + Sync {
    async fn load(&self, video_id: &str) -> Result<(), CapabilityError>;
    async fn play(&self) -> Result<(), CapabilityError>;
    async fn pause(&self) -> Result<(), CapabilityError>;
    async fn volume(&self) -> Result<u8, CapabilityError>;
    async fn set_volume(&self, volume: u8) -> Result<(), CapabilityError>;
    async fn mute(&self) -> Result<(), CapabilityError>;
    async fn unmute(&self) -> Result<(), CapabilityError>;
    async fn is_muted(&self) -> Result<bool, CapabilityError>;
    async fn metadata(&self) -> Result<VideoMetadata, CapabilityError>;
}

#[derive(Debug)]
struct HeadlessState {
    loaded: Option<String>,
    volume: u8,
    muted: bool,
}

/// Engine without any media output. Loads start immediately and metadata is
/// synthesized from the video id.
pub struct HeadlessCapability {
    state: Mutex<HeadlessState>,
    events: mpsc::UnboundedSender<CapabilityEvent>,
}

impl HeadlessCapability {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CapabilityEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let capability = Self {
            state: Mutex::new(HeadlessState {
                loaded: None,
                volume: 100,
                muted: false,
            }),
            events,
        };
        (capability, rx)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HeadlessState) -> T) -> Result<T, CapabilityError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CapabilityError::Engine("state lock poisoned".to_string()))?;
        Ok(f(&mut state))
    }

    fn emit(&self, event: CapabilityEvent) {
        trace!(target: CAPABILITY_LOG_TARGET, ?event, "Emitting capability event.");
        if self.events.send(event).is_err() {
            debug!(target: CAPABILITY_LOG_TARGET, "No listener for capability event {:?}", event);
        }
    }

    /// Reports the current video as finished.
    pub fn finish(&self) -> Result<(), CapabilityError> {
        if self.with_state(|s| s.loaded.is_none())? {
            return Err(CapabilityError::NotLoaded);
        }
        self.emit(CapabilityEvent::Ended);
        Ok(())
    }
}

#[async_trait]
impl PlaybackCapability for HeadlessCapability {
    async fn load(&self, video_id: &str) -> Result<(), CapabilityError> {
        self.with_state(|s| s.loaded = Some(video_id.to_string()))?;
        debug!(target: CAPABILITY_LOG_TARGET, video_id, "Loaded video.");
        self.emit(CapabilityEvent::Started);
        Ok(())
    }

    async fn play(&self) -> Result<(), CapabilityError> {
        if self.with_state(|s| s.loaded.is_none())? {
            return Err(CapabilityError::NotLoaded);
        }
        self.emit(CapabilityEvent::Started);
        Ok(())
    }

    async fn pause(&self) -> Result<(), CapabilityError> {
        if self.with_state(|s| s.loaded.is_none())? {
            return Err(CapabilityError::NotLoaded);
        }
        self.emit(CapabilityEvent::Paused);
        Ok(())
    }

    async fn volume(&self) -> Result<u8, CapabilityError> {
        self.with_state(|s| s.volume)
    }

    async fn set_volume(&self, volume: u8) -> Result<(), CapabilityError> {
        self.with_state(|s| s.volume = volume.min(100))
    }

    async fn mute(&self) -> Result<(), CapabilityError> {
        self.with_state(|s| s.muted = true)
    }

    async fn unmute(&self) -> Result<(), CapabilityError> {
        self.with_state(|s| s.muted = false)
    }

    async fn is_muted(&self) -> Result<bool, CapabilityError> {
        self.with_state(|s| s.muted)
    }

    async fn metadata(&self) -> Result<VideoMetadata, CapabilityError> {
        let loaded = self.with_state(|s| s.loaded.clone())?;
        let video_id = loaded.ok_or(CapabilityError::NotLoaded)?;
        Ok(VideoMetadata {
            title: format!("Video {}", video_id),
            author: "Unknown Artist".to_string(),
            video_id: Some(video_id),
        })
    }
}
