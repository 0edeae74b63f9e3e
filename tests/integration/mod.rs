//! Integration tests module
//!
//! This module organizes all integration tests for the nowplaying-sync application.

// Import individual test modules
pub mod config_test;
pub mod controller_display_test;
pub mod persistence_test;
pub mod websocket_test;
