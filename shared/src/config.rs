//! Configuration management

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::server::{ServerOptions, VideoOrientation};
use crate::DEFAULT_PORT;

/// Application configuration
///
/// Loaded from a JSON file; every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the adb executable
    pub adb_path: PathBuf,

    /// Local path of the mirroring server pushed to the device
    pub server_jar: PathBuf,

    /// First local port handed out to sessions
    pub base_port: u16,

    /// Video bitrate in bits per second
    pub bitrate: u64,

    /// Frame rate cap, if any
    pub max_fps: Option<u32>,

    /// Video orientation lock
    pub lock_video_orientation: VideoOrientation,

    /// Ask the server to accept control commands
    pub control: bool,

    pub show_touches: bool,

    pub stay_awake: bool,

    /// Longest video dimension requested from the server
    pub max_size: u16,

    /// Budget for the device to dial back
    pub connect_timeout_ms: u64,

    /// Socket read timeout; bounds how long a stop waits on a blocked read
    pub read_timeout_ms: u64,

    /// Serial-to-name mapping file
    pub device_names_file: PathBuf,

    /// Log level
    pub log_level: String,

    /// Log directory
    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerOptions::default();
        Self {
            adb_path: PathBuf::from("adb"),
            server_jar: PathBuf::from("scrcpy-server.jar"),
            base_port: DEFAULT_PORT,
            bitrate: server.bitrate,
            max_fps: server.max_fps,
            lock_video_orientation: server.lock_video_orientation,
            control: server.control,
            show_touches: server.show_touches,
            stay_awake: server.stay_awake,
            max_size: server.max_size,
            connect_timeout_ms: 5000,
            read_timeout_ms: 2000,
            device_names_file: PathBuf::from("devices.txt"),
            log_level: "info".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Server launch options derived from this config
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            bitrate: self.bitrate,
            max_fps: self.max_fps,
            lock_video_orientation: self.lock_video_orientation,
            control: self.control,
            show_touches: self.show_touches,
            stay_awake: self.stay_awake,
            max_size: self.max_size,
            ..ServerOptions::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.base_port, 27183);
        assert_eq!(config.max_size, 1920);
        assert_eq!(config.read_timeout(), Duration::from_secs(2));
        assert_eq!(config.lock_video_orientation, VideoOrientation::Unlocked);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(
            r#"{ "bitrate": 2000000, "max_fps": 30, "lock_video_orientation": "quarter" }"#,
        )
        .unwrap();

        assert_eq!(config.bitrate, 2_000_000);
        assert_eq!(config.connect_timeout_ms, 5000);

        let options = config.server_options();
        assert_eq!(options.max_fps, Some(30));
        assert_eq!(options.lock_video_orientation.argument(), Some(1));
        assert_eq!(options.log_level, "debug");
    }

    #[test]
    fn test_load_errors_are_config_errors() {
        assert!(matches!(
            Config::load("/nonexistent/droid-mirror.json"),
            Err(Error::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(Config::load(file.path()), Err(Error::Config(_))));
    }
}
