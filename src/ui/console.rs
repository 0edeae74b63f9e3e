//! Line-based operator console shared by both roles.

use super::panel::ControlPanel;
use crate::display::{ConnectionState, DisplayReplica, DisplayView, ViewRefresh};
use crate::sync::protocol::Message;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub const HELP_TEXT: &str = "Commands: play, pause, stop, next, prev, add <url>, load <n>, rm <n>, vol <0-100>, h (toggle panel), r (reconnect), q (quit)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Play,
    Pause,
    /// Controller only; there is no wire message for it.
    Stop,
    Next,
    Previous,
    Add(String),
    /// Zero-based playlist index.
    Load(i64),
    /// Zero-based playlist index.
    Remove(i64),
    Volume(i64),
    TogglePanel,
    Reconnect,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

fn parse_number(raw: &str) -> Result<i64, ConsoleError> {
    raw.parse::<i64>()
        .map_err(|_| ConsoleError::InvalidNumber(raw.to_string()))
}

/// Converts the 1-based positions shown to operators.
fn parse_position(raw: &str) -> Result<i64, ConsoleError> {
    match parse_number(raw)? {
        n if n >= 1 => Ok(n - 1),
        _ => Err(ConsoleError::InvalidNumber(raw.to_string())),
    }
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let argument = |name: &'static str| {
        if rest.is_empty() {
            Err(ConsoleError::MissingArgument(name))
        } else {
            Ok(rest)
        }
    };

    let command = match verb.to_lowercase().as_str() {
        "play" => ConsoleCommand::Play,
        "pause" => ConsoleCommand::Pause,
        "stop" | "s" => ConsoleCommand::Stop,
        "next" | "n" => ConsoleCommand::Next,
        "prev" | "previous" | "p" => ConsoleCommand::Previous,
        "add" | "a" => ConsoleCommand::Add(argument("add")?.to_string()),
        "load" | "l" => ConsoleCommand::Load(parse_position(argument("load")?)?),
        "rm" | "remove" => ConsoleCommand::Remove(parse_position(argument("rm")?)?),
        "vol" | "volume" | "v" => ConsoleCommand::Volume(parse_number(argument("vol")?)?),
        "h" | "hide" | "toggle" => ConsoleCommand::TogglePanel,
        "r" | "reconnect" => ConsoleCommand::Reconnect,
        "help" | "?" => ConsoleCommand::Help,
        "q" | "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

impl ConsoleCommand {
    /// Wire message for commands that go to the controller.
    pub fn to_message(&self) -> Option<Message> {
        match self {
            ConsoleCommand::Play => Some(Message::Play),
            ConsoleCommand::Pause => Some(Message::Pause),
            ConsoleCommand::Next => Some(Message::Next),
            ConsoleCommand::Previous => Some(Message::Previous),
            ConsoleCommand::Add(url) => Some(Message::AddVideo { url: url.clone() }),
            ConsoleCommand::Load(index) => Some(Message::LoadVideo { index: *index }),
            ConsoleCommand::Remove(index) => Some(Message::RemoveVideo { index: *index }),
            ConsoleCommand::Volume(value) => Some(Message::Volume { value: *value }),
            ConsoleCommand::Stop
            | ConsoleCommand::TogglePanel
            | ConsoleCommand::Reconnect | ConsoleCommand::Help | ConsoleCommand::Quit => None,
        }
    }
}

/// Reads console commands from stdin.
pub struct ConsoleInput {
    lines: Lines<BufReader<Stdin>>,
}

impl ConsoleInput {
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Next non-blank command. `None` at end of input.
    pub async fn next_command(&mut self) -> Option<Result<ConsoleCommand, ConsoleError>> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => return None,
            };
            match parse_console_line(&line) {
                Ok(Some(command)) => return Some(Ok(command)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Formats the now-playing line and, with the panel visible, the playlist.
pub fn format_replica(replica: &DisplayReplica, panel_visible: bool) -> String {
    let mut out = if replica.title.is_empty() {
        "Waiting for the controller...".to_string()
    } else if replica.author.is_empty() {
        format!("Now playing: {}", replica.title)
    } else {
        format!("Now playing: {} - {}", replica.title, replica.author)
    };
    if !panel_visible {
        return out;
    }

    if let Some(volume) = replica.volume {
        out.push_str(&format!("\nVolume: {}", volume));
    }
    for (index, track) in replica.playlist.iter().enumerate() {
        let marker = if replica.current_index == Some(index) { '>' } else { ' ' };
        let title = if track.title.len() > 40 {
            format!("{:.37}...", track.title)
        } else {
            track.title.clone()
        };
        out.push_str(&format!("\n{} {:<4} {:<40} {}", marker, index + 1, title, track.author));
    }
    out
}

/// Prints display updates to stdout.
pub struct ConsoleView {
    panel: ControlPanel,
}

impl ConsoleView {
    pub fn new(panel: ControlPanel) -> Self {
        Self { panel }
    }
}

impl DisplayView for ConsoleView {
    fn render(&mut self, replica: &DisplayReplica, refresh: ViewRefresh) {
        if refresh == ViewRefresh::TrackChanged {
            println!();
        }
        println!("{}", format_replica(replica, self.panel.is_visible()));
    }

    fn volume_changed(&mut self, volume: u8) {
        if self.panel.is_visible() {
            println!("Volume: {}", volume);
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => println!("[connected]"),
            ConnectionState::Connecting => {}
            ConnectionState::Disconnected => println!("[waiting for connection]"),
        }
    }
}
