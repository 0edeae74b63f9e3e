//! Configuration management

mod settings;

pub use settings::{ConfigError, Settings, APP_DIR_NAME, MAX_INTERVAL_SECS};
