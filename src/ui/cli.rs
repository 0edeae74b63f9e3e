//! Command-line interface implementation

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;

/// Command-line arguments for nowplaying
#[derive(Parser, Debug)]
#[command(author, version, about = "Keeps now-playing displays in sync with a playback controller", long_about = None)]
pub struct Args {
    /// Config file path
    #[arg(short, long, env = "NOWPLAYING_CONFIG", global = true)]
    pub config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub role: Role,
}

#[derive(Subcommand, Debug)]
pub enum Role {
    /// Own the playlist, drive playback and serve displays
    Controller(ControllerArgs),
    /// Mirror a controller's now-playing state
    Display(DisplayArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ControllerArgs {
    /// Host to bind
    #[arg(long, env = "NOWPLAYING_HOST")]
    pub host: Option<String>,

    /// Preferred port
    #[arg(short, long, env = "NOWPLAYING_PORT")]
    pub port: Option<u16>,

    /// Try the next ports when the preferred one is taken
    #[arg(long)]
    pub auto_port: bool,

    /// Hide the control panel and start playing immediately
    #[arg(long)]
    pub autostart: bool,

    /// Seed the playlist with this video (URL or identifier) and load it
    #[arg(long = "video", value_name = "URL_OR_ID")]
    pub video: Option<String>,

    /// Attach an in-process display to this controller
    #[arg(long)]
    pub local_display: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct DisplayArgs {
    /// Controller host
    #[arg(long, env = "NOWPLAYING_HOST")]
    pub host: Option<String>,

    /// Controller port
    #[arg(short, long, env = "NOWPLAYING_PORT")]
    pub port: Option<u16>,

    /// Start with the control panel hidden
    #[arg(long)]
    pub autostart: bool,
}

impl Args {
    /// Config file named on the command line, or the default location.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_path)
    }

    /// Applies flag overrides on top of file settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        if self.log_json {
            settings.log_json = true;
        }
        let (host, port) = match &self.role {
            Role::Controller(args) => {
                if args.auto_port {
                    settings.auto_port = true;
                }
                (&args.host, args.port)
            }
            Role::Display(args) => (&args.host, args.port),
        };
        if let Some(host) = host {
            settings.host = host.clone();
        }
        if let Some(port) = port {
            settings.port = port;
        }
    }
}

/// CLI user interface for interacting with the application
pub struct Cli {
    pub args: Args,
}

impl Cli {
    /// Create a new CLI instance
    pub fn new() -> Self {
        Cli { args: Args::parse() }
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}
