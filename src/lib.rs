//! nowplaying-sync library core functionality

pub mod config;
pub mod display;
pub mod player;
pub mod playlist;
pub mod resolve;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod ui;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the application directories
pub fn init_app_dirs(settings: &config::Settings) -> std::io::Result<()> {
    let default_path = config::Settings::default_path();
    let dirs = [
        default_path.parent(),
        settings.state_path.parent(),
        settings.display_state_path.parent(),
        settings.port_file.parent(),
    ];
    for dir in dirs.into_iter().flatten() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str, json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
