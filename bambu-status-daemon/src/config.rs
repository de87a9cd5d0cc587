//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bambu_status_broadcaster::BroadcastOptions;

/// Printer connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// Broker address: `host`, `host:port` or `ssl://host:port`
    pub address: String,

    /// LAN access code shown on the printer screen (MQTT password)
    pub access_code: String,

    /// Printer serial number, used to derive the report topic
    #[serde(default)]
    pub serial: Option<String>,

    /// MQTT username (Bambu LAN mode always uses "bblp")
    #[serde(default = "default_username")]
    pub username: String,

    /// MQTT client identifier
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic filter override (default: `device/<serial>/report`)
    #[serde(default)]
    pub mqtt_topic: Option<String>,
}

fn default_username() -> String {
    "bblp".to_string()
}

fn default_client_id() -> String {
    "waybar-bambu-status".to_string()
}

impl PrinterConfig {
    /// Topic to subscribe to
    pub fn topic(&self) -> Option<String> {
        match (&self.mqtt_topic, &self.serial) {
            (Some(topic), _) if !topic.trim().is_empty() => Some(topic.trim().to_string()),
            (_, Some(serial)) if !serial.trim().is_empty() => {
                Some(format!("device/{}/report", serial.trim()))
            }
            _ => None,
        }
    }
}

/// Relay fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Drop a relay that cannot take a line within this many milliseconds
    pub write_timeout_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 2000,
        }
    }
}

impl BroadcastConfig {
    pub fn options(&self) -> BroadcastOptions {
        BroadcastOptions {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    pub printer: PrinterConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Name of the JSON config used by earlier releases
const LEGACY_CONFIG_FILE_NAME: &str = "config.json";

const EXAMPLE: &str = r#"[printer]
address = "192.168.1.20"
access_code = "12345678"
serial = "01S00C000000000""#;

impl DaemonConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = bambu_status_paths::get_config_path()
            .context("Failed to determine config path")?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`. A missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let legacy = path.with_file_name(LEGACY_CONFIG_FILE_NAME);
            let hint = if legacy.exists() {
                format!(
                    "\n{} is no longer read; move its settings into the TOML file.",
                    legacy.display()
                )
            } else {
                String::new()
            };
            anyhow::bail!(
                "Config file {} not found. Create it with at least:\n\n{}\n{}",
                path.display(),
                EXAMPLE,
                hint
            );
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Parse and validate TOML contents
    pub fn parse(contents: &str) -> Result<Self> {
        let config: DaemonConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.printer.address.trim().is_empty() {
            anyhow::bail!("printer.address must not be empty");
        }
        if self.printer.access_code.is_empty() {
            anyhow::bail!("printer.access_code must not be empty");
        }
        if self.printer.topic().is_none() {
            anyhow::bail!("set printer.serial or printer.mqtt_topic");
        }
        if self.broadcast.write_timeout_ms == 0 {
            anyhow::bail!("broadcast.write_timeout_ms must be positive");
        }
        Ok(())
    }
}
