use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Visibility of the operator controls. Clones share one flag, so the input
/// task can toggle what the rendering task shows.
#[derive(Debug, Clone)]
pub struct ControlPanel {
    visible: Arc<AtomicBool>,
}

impl ControlPanel {
    /// Starts hidden when autostarting.
    pub fn new(autostart: bool) -> Self {
        Self {
            visible: Arc::new(AtomicBool::new(!autostart)),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Flips visibility and returns the new state.
    pub fn toggle(&self) -> bool {
        !self.visible.fetch_xor(true, Ordering::Relaxed)
    }
}
