//! Error types for DroidMirror

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// DroidMirror error types
#[derive(Error, Debug)]
pub enum Error {
    /// Device bridge or device-level setup failed
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// No inbound connection arrived within the connect budget
    #[error("Timed out after {0} ms waiting for the device to connect")]
    HandshakeTimeout(u64),

    /// Malformed handshake, missing control connection, short header
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Video payload could not be read
    #[error("Stream error: {0}")]
    Stream(String),

    /// Control command parameter out of range
    #[error("Range error: {0}")]
    Range(String),

    /// Operation requires a connected session
    #[error("Session is not connected")]
    NotConnected,

    /// Session was started twice without a stop in between
    #[error("Session is already connected")]
    AlreadyConnected,

    /// Control socket write failed
    #[error("Control channel error: {0}")]
    Control(String),

    /// Reported by a video sink
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a bootstrap error
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a range error
    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
