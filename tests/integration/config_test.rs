//! Integration tests for configuration management
//!
//! These tests verify that file settings, flag overrides and validation work
//! together the way `main` uses them.

use clap::Parser;
use nowplaying_sync::config::Settings;
use nowplaying_sync::display::Backoff;
use nowplaying_sync::ui::Args;
use std::error::Error;
use std::time::Duration;
use tempfile::tempdir;

#[cfg(test)]
mod config_integration_tests {
    use super::*;

    /// Test complete configuration workflow
    #[test]
    fn test_config_lifecycle() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("nested").join("config.json");

        // A missing file is not an error.
        let mut settings = Settings::load(&config_path)?;
        assert_eq!(settings, Settings::default());

        settings.host = "0.0.0.0".to_string();
        settings.port = 9100;
        settings.state_path = dir.path().join("controller.json");
        settings.heartbeat_secs = 10;
        settings.validate()?;
        settings.save(&config_path)?;

        let loaded = Settings::load(&config_path)?;
        assert_eq!(loaded, settings);
        assert_eq!(loaded.heartbeat_interval(), Duration::from_secs(10));

        let mut updated = loaded;
        updated.auto_port = true;
        updated.save(&config_path)?;
        assert!(Settings::load(&config_path)?.auto_port);

        Ok(())
    }

    /// Flags win over the file, and only the flags that were given.
    #[test]
    fn test_flags_override_file_settings() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "host": "192.168.1.20", "port": 9000, "log_level": "debug" }"#)?;

        let path_arg = config_path.to_string_lossy().to_string();
        let args = Args::try_parse_from(["nowplaying", "--config", &path_arg, "controller", "--port", "9001", "--auto-port"])?;
        assert_eq!(args.config_path(), config_path);

        let mut settings = Settings::load(&args.config_path())?;
        args.apply_to(&mut settings);
        settings.validate()?;

        assert_eq!(settings.host, "192.168.1.20");
        assert_eq!(settings.port, 9001);
        assert!(settings.auto_port);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.metadata_poll_secs, 3);

        Ok(())
    }

    /// Test invalid configuration handling
    #[test]
    fn test_invalid_config_validation() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "host": "", "port": 8765 }"#)?;
        let err = Settings::load(&config_path)?.validate().expect_err("empty host");
        assert!(err.to_string().contains("Host cannot be empty"));

        std::fs::write(&config_path, r#"{ "reconnect_base_ms": 5000, "reconnect_max_ms": 1000 }"#)?;
        let err = Settings::load(&config_path)?.validate().expect_err("max below base");
        assert!(err.to_string().contains("reconnect_max_ms"));

        std::fs::write(&config_path, r#"{ "metadata_poll_secs": 18446744073709551615 }"#)?;
        let err = Settings::load(&config_path)?.validate().expect_err("interval too long");
        assert!(err.to_string().contains("metadata_poll_secs"));

        std::fs::write(&config_path, "{ not json")?;
        assert!(Settings::load(&config_path).is_err());

        Ok(())
    }

    /// Reconnect settings flow through to the display's backoff.
    #[test]
    fn test_backoff_from_settings() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{ "reconnect_base_ms": 200, "reconnect_max_ms": 400, "discovery_after_failures": 0 }"#,
        )?;
        let settings = Settings::load(&config_path)?;
        settings.validate()?;

        let mut backoff = Backoff::new(settings.backoff_policy());
        let delays: Vec<u64> = (0..4)
            .map(|_| {
                let plan = backoff.on_failure();
                assert!(!plan.discover);
                plan.delay.as_millis() as u64
            })
            .collect();
        assert_eq!(delays, vec![200, 300, 400, 400]);

        Ok(())
    }
}
