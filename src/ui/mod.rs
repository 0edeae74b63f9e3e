//! Operator-facing surfaces: command line, console and control panel.

pub mod cli;
pub mod console;
pub mod panel;

pub use cli::{Args, Cli, ControllerArgs, DisplayArgs, Role};
pub use console::{format_replica, parse_console_line, ConsoleCommand, ConsoleError, ConsoleInput, ConsoleView, HELP_TEXT};
pub use panel::ControlPanel;
