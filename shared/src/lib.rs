//! Droid Mirror Shared Library
//!
//! Client side of the screen-mirroring protocol:
//! - Device bridge and server bootstrap
//! - Video stream demuxing and control message encoding
//! - Session lifecycle (one video worker, one control worker)
//! - Statistics, configuration and logging utilities

pub mod bridge;
pub mod config;
pub mod control;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;
pub mod video;

pub use bridge::{AdbBridge, DeviceBridge, DeviceHandle};
pub use config::Config;
pub use control::{ControlMessage, Keycode};
pub use error::{Error, Result};
pub use session::{Session, SessionEvent, SessionOptions};
pub use video::{FrameSize, VideoSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// First local port handed to sessions; later sessions count upward
pub const DEFAULT_PORT: u16 = 27183;
