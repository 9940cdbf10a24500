// Configuration management for the lefacade CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/lefacade/config.json
// - Linux: ~/.config/lefacade/config.json
// - Windows: %APPDATA%\lefacade\config.json

use anyhow::{Context, Result};
use lefacade_core::{ClockAccuracy, ConnectionParameters, FacadeConfig, SimOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port for the HTTP + WebSocket server
    pub listen_port: u16,

    /// Log filter directive, overridden by RUST_LOG
    pub log_filter: String,

    /// Directory for daily log files; stderr only when unset
    pub log_dir: Option<String>,

    /// Simulated controller behavior
    pub sim: SimOptions,

    /// Values placed in connection complete events
    pub reported: ReportedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportedConfig {
    pub interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
    /// Raw clock accuracy code, 0 (500 ppm) to 7 (20 ppm)
    pub clock_accuracy: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 8999,
            log_filter: "info".to_string(),
            log_dir: None,
            sim: SimOptions {
                auto_connect: true,
                echo: true,
            },
            reported: ReportedConfig::default(),
        }
    }
}

impl Default for ReportedConfig {
    fn default() -> Self {
        let params = ConnectionParameters::default();
        Self {
            interval: params.interval,
            latency: params.latency,
            supervision_timeout: params.supervision_timeout,
            clock_accuracy: ClockAccuracy::Ppm20.value(),
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("lefacade");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load config from `path`, creating it with defaults if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value in memory
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "listen_port" => {
                self.listen_port = value.parse().context("Invalid port number")?;
            }
            "log_filter" => {
                self.log_filter = value.to_string();
            }
            "log_dir" => {
                self.log_dir = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "sim.auto_connect" => {
                self.sim.auto_connect = value.parse().context("Invalid boolean value")?;
            }
            "sim.echo" => {
                self.sim.echo = value.parse().context("Invalid boolean value")?;
            }
            "reported.interval" => {
                self.reported.interval = value.parse().context("Invalid number")?;
            }
            "reported.latency" => {
                self.reported.latency = value.parse().context("Invalid number")?;
            }
            "reported.supervision_timeout" => {
                self.reported.supervision_timeout = value.parse().context("Invalid number")?;
            }
            "reported.clock_accuracy" => {
                let code: u8 = value.parse().context("Invalid number")?;
                if ClockAccuracy::from_value(code).is_none() {
                    anyhow::bail!("Clock accuracy code must be 0-7, got {}", code);
                }
                self.reported.clock_accuracy = code;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "listen_port" => Some(self.listen_port.to_string()),
            "log_filter" => Some(self.log_filter.clone()),
            "log_dir" => self.log_dir.clone(),
            "sim.auto_connect" => Some(self.sim.auto_connect.to_string()),
            "sim.echo" => Some(self.sim.echo.to_string()),
            "reported.interval" => Some(self.reported.interval.to_string()),
            "reported.latency" => Some(self.reported.latency.to_string()),
            "reported.supervision_timeout" => Some(self.reported.supervision_timeout.to_string()),
            "reported.clock_accuracy" => Some(self.reported.clock_accuracy.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("listen_port".to_string(), self.listen_port.to_string()),
            ("log_filter".to_string(), self.log_filter.clone()),
            (
                "log_dir".to_string(),
                self.log_dir.clone().unwrap_or_else(|| "(stderr)".to_string()),
            ),
            ("sim.auto_connect".to_string(), self.sim.auto_connect.to_string()),
            ("sim.echo".to_string(), self.sim.echo.to_string()),
            ("reported.interval".to_string(), self.reported.interval.to_string()),
            ("reported.latency".to_string(), self.reported.latency.to_string()),
            (
                "reported.supervision_timeout".to_string(),
                self.reported.supervision_timeout.to_string(),
            ),
            (
                "reported.clock_accuracy".to_string(),
                self.reported.clock_accuracy.to_string(),
            ),
        ]
    }

    /// Facade settings derived from this config
    pub fn facade_config(&self) -> FacadeConfig {
        let accuracy =
            ClockAccuracy::from_value(self.reported.clock_accuracy).unwrap_or(ClockAccuracy::Ppm20);
        FacadeConfig::default()
            .with_reported_parameters(ConnectionParameters {
                interval: self.reported.interval,
                latency: self.reported.latency,
                supervision_timeout: self.reported.supervision_timeout,
            })
            .with_clock_accuracy(accuracy)
    }
}
