//! Mirroring server launch parameters
//!
//! The server runs on the device as a plain Java process started through
//! the bridge's shell; these are the fixed locations and the argument list
//! it is started with.

use serde::{Deserialize, Serialize};

use crate::protocol::PROTOCOL_VERSION;

/// Where the server is pushed on the device
pub const SERVER_REMOTE_PATH: &str = "/data/local/tmp/scrcpy-server.jar";

/// Server entry point class
pub const SERVER_ENTRY_POINT: &str = "com.genymobile.scrcpy.Server";

/// Device-side socket the server dials through the reverse forward
pub const SERVER_SOCKET_NAME: &str = "localabstract:scrcpy";

/// File mode of the pushed server
pub const SERVER_FILE_MODE: u32 = 0o444;

/// Video orientation lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    /// Follow the device rotation
    #[default]
    Unlocked,

    /// Lock to whatever orientation the device has at start
    Initial,

    Natural,
    Quarter,
    Half,
    ThreeQuarters,
}

impl VideoOrientation {
    /// Value of `lock_video_orientation`, `None` when the argument is omitted
    pub fn argument(&self) -> Option<i32> {
        match self {
            VideoOrientation::Unlocked => None,
            VideoOrientation::Initial => Some(-2),
            VideoOrientation::Natural => Some(0),
            VideoOrientation::Quarter => Some(1),
            VideoOrientation::Half => Some(2),
            VideoOrientation::ThreeQuarters => Some(3),
        }
    }
}

/// Options that shape the server command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Video bitrate in bits per second
    pub bitrate: u64,
    pub max_fps: Option<u32>,
    pub lock_video_orientation: VideoOrientation,
    pub control: bool,
    pub show_touches: bool,
    pub stay_awake: bool,
    pub max_size: u16,
    pub log_level: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bitrate: 8_000_000,
            max_fps: None,
            lock_video_orientation: VideoOrientation::Unlocked,
            control: true,
            show_touches: false,
            stay_awake: false,
            max_size: 1920,
            log_level: "debug".to_string(),
        }
    }
}

impl ServerOptions {
    /// Shell command that starts the server on the device
    pub fn command_line(&self) -> String {
        let mut args = vec![
            format!("CLASSPATH={}", SERVER_REMOTE_PATH),
            "app_process".to_string(),
            "/".to_string(),
            SERVER_ENTRY_POINT.to_string(),
            PROTOCOL_VERSION.to_string(),
            format!("log_level={}", self.log_level),
            format!("bit_rate={}", self.bitrate),
        ];

        if let Some(fps) = self.max_fps.filter(|&fps| fps != 0) {
            args.push(format!("max_fps={}", fps));
        }
        if let Some(orientation) = self.lock_video_orientation.argument() {
            args.push(format!("lock_video_orientation={}", orientation));
        }

        args.extend([
            "tunnel_forward=false".to_string(),
            format!("control={}", self.control),
            "display_id=0".to_string(),
            format!("show_touches={}", self.show_touches),
            format!("stay_awake={}", self.stay_awake),
            "power_off_on_close=false".to_string(),
            "downsize_on_error=true".to_string(),
            format!("max_size={}", self.max_size),
            "audio=false".to_string(),
            "cleanup=true".to_string(),
        ]);

        args.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_line() {
        let cmd = ServerOptions::default().command_line();
        assert_eq!(
            cmd,
            "CLASSPATH=/data/local/tmp/scrcpy-server.jar app_process / \
             com.genymobile.scrcpy.Server 2.4 log_level=debug bit_rate=8000000 \
             tunnel_forward=false control=true display_id=0 show_touches=false \
             stay_awake=false power_off_on_close=false downsize_on_error=true \
             max_size=1920 audio=false cleanup=true"
        );
    }

    #[test]
    fn test_optional_arguments() {
        let options = ServerOptions {
            bitrate: 1_000_000,
            max_fps: Some(30),
            lock_video_orientation: VideoOrientation::Quarter,
            stay_awake: true,
            ..Default::default()
        };
        let cmd = options.command_line();

        assert!(cmd.contains(" bit_rate=1000000 max_fps=30 lock_video_orientation=1 tunnel_forward=false"));
        assert!(cmd.contains(" stay_awake=true "));
    }

    #[test]
    fn test_zero_fps_is_omitted() {
        let options = ServerOptions {
            max_fps: Some(0),
            ..Default::default()
        };
        assert!(!options.command_line().contains("max_fps"));
    }
}
