use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use groundlink_core::commands::CommandEncoder;
use groundlink_core::constants::command_constants::{
    DEFAULT_COMMAND_PREFIX, DEFAULT_COMMAND_TERMINATOR,
};
use serde::{Deserialize, Serialize};

/// Settings for a ground-station session, usually loaded from a TOML file.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub serial: SerialConfig,
    pub command: CommandConfig,
    pub backend: Option<BackendConfig>,
    pub replay: ReplayConfig,
    /// Directory decoded images are written to. Images are not saved when unset.
    pub image_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Port name; the first detected port is used when unset.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Outbound command framing. Differs between payload firmware versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandConfig {
    pub prefix: String,
    pub terminator: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            terminator: DEFAULT_COMMAND_TERMINATOR.to_string(),
        }
    }
}

impl CommandConfig {
    pub fn encoder(&self) -> CommandEncoder {
        CommandEncoder::new(self.prefix.clone(), self.terminator.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL, e.g. "http://localhost:8080".
    pub url: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides the posting path (`/api/telemetry` live, `/api/replay` for replays).
    #[serde(default)]
    pub path: Option<String>,
}

fn default_backend_timeout_ms() -> u64 {
    2000
}

impl BackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: default_backend_timeout_ms(),
            path: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    /// Delay between chunks; clamped to 200-999 ms.
    pub interval_ms: u64,
    pub chunk_size: usize,
    /// Replay as fast as possible when `false`.
    pub paced: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            chunk_size: 64,
            paced: true,
        }
    }
}

impl ReplayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ClientConfig {
    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.command.prefix, "CMD|");
        assert_eq!(config.command.terminator, "\r\n");
        assert!(config.backend.is_none());
    }

    #[test]
    fn test_full_file() {
        let config = ClientConfig::from_toml_str(
            r#"
            image_dir = "images"

            [serial]
            port = "/dev/ttyUSB0"
            baud_rate = 115200

            [command]
            prefix = "S"
            terminator = "\n"

            [backend]
            url = "http://localhost:8080"

            [replay]
            interval_ms = 250
            paced = false
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.read_timeout(), Duration::from_millis(100));
        assert_eq!(
            config.command.encoder().encode("STOP").unwrap().frame,
            "SSTOP\n"
        );
        let backend = config.backend.unwrap();
        assert_eq!(backend.url, "http://localhost:8080");
        assert_eq!(backend.timeout(), Duration::from_secs(2));
        assert_eq!(backend.path, None);
        assert_eq!(config.replay.interval(), Duration::from_millis(250));
        assert_eq!(config.replay.chunk_size, 64);
        assert!(!config.replay.paced);
        assert_eq!(config.image_dir, Some(PathBuf::from("images")));
    }

    #[test]
    fn test_backend_path_override() {
        let config = ClientConfig::from_toml_str(
            "[backend]\nurl = \"http://ground:5000\"\npath = \"/ingest\"\n",
        )
        .unwrap();
        assert_eq!(config.backend.unwrap().path.as_deref(), Some("/ingest"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ClientConfig::from_toml_str("[serial]\nbaud = 9600\n").is_err());
    }
}
