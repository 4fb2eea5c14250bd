//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use smartscreen_hw::lcd::DEFAULT_BAUD_RATE;
use smartscreen_hw::{Revision, SessionConfig};
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial port path (e.g., "/dev/ttyACM0")
    #[serde(default = "default_port")]
    pub port: String,

    /// Hardware revision (a, b, c or d)
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Retry and timeout tuning
    #[serde(default)]
    pub session: SessionConfig,
}

// Default value functions
fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_revision() -> String {
    "a".to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Parses the configured revision.
    pub fn revision(&self) -> Result<Revision> {
        self.revision
            .parse::<Revision>()
            .with_context(|| format!("Invalid revision in configuration: {}", self.revision))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            revision: default_revision(),
            baud_rate: default_baud_rate(),
            session: SessionConfig::default(),
        }
    }
}
