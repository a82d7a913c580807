//! Video stream protocol definitions
//!
//! The video socket carries a one-off handshake (device name, then codec
//! metadata) followed by an unbounded sequence of access units, each
//! prefixed by a fixed 12-byte header.

use std::io::Read;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

/// Protocol version passed to the mirroring server
pub const PROTOCOL_VERSION: &str = "2.4";

/// Maximum access unit payload we accept (16MB)
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Presentation timestamp sentinel meaning "no timestamp"
pub const NO_PTS: i64 = -1;

/// Device metadata sent first on the video socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMeta {
    /// Device name as reported by the device, NUL padding removed
    pub device_name: String,
}

impl DeviceMeta {
    /// Size of the device name field in bytes
    pub const SIZE: usize = 64;

    /// Decode device metadata from exactly `SIZE` bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(Error::protocol(format!(
                "Device meta must be {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }

        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let device_name = String::from_utf8_lossy(&buf[..end])
            .trim_end()
            .to_string();

        Ok(Self { device_name })
    }
}

/// Codec metadata that follows the device name
///
/// The block is opaque to the rest of the client; it is decoded only so
/// that it can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecMeta {
    pub codec_id: u32,
    pub width: u32,
    pub height: u32,
}

impl CodecMeta {
    /// Header size in bytes
    pub const SIZE: usize = 12;

    /// Decode codec metadata
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::protocol("Codec meta too short"));
        }

        Ok(Self {
            codec_id: buf.get_u32(),
            width: buf.get_u32(),
            height: buf.get_u32(),
        })
    }

    /// Codec id as its four-character tag (e.g. "h264")
    pub fn codec_tag(&self) -> String {
        self.codec_id
            .to_be_bytes()
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
            .collect()
    }
}

/// Everything the device sends before the first access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub device: DeviceMeta,
    pub codec: CodecMeta,
}

impl Handshake {
    /// Total handshake size in bytes
    pub const SIZE: usize = DeviceMeta::SIZE + CodecMeta::SIZE;

    /// Read the handshake off the video socket
    ///
    /// Any short read, including one cut short by the socket's read
    /// timeout, is a protocol error.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut device = [0u8; DeviceMeta::SIZE];
        reader
            .read_exact(&mut device)
            .map_err(|e| Error::protocol(format!("Failed to read device meta: {}", e)))?;

        let mut codec = [0u8; CodecMeta::SIZE];
        reader
            .read_exact(&mut codec)
            .map_err(|e| Error::protocol(format!("Failed to read codec meta: {}", e)))?;

        Ok(Self {
            device: DeviceMeta::decode(&device)?,
            codec: CodecMeta::decode(&codec)?,
        })
    }

    /// Encode as the device would send it
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut name = [0u8; DeviceMeta::SIZE];
        let raw = self.device.device_name.as_bytes();
        let len = raw.len().min(DeviceMeta::SIZE - 1);
        name[..len].copy_from_slice(&raw[..len]);

        buf.put_slice(&name);
        buf.put_u32(self.codec.codec_id);
        buf.put_u32(self.codec.width);
        buf.put_u32(self.codec.height);
    }
}

/// Access unit header (fixed size: 12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Presentation timestamp in microseconds, or `NO_PTS`
    pub pts_us: i64,

    /// Payload size in bytes
    pub len: u32,
}

impl PacketHeader {
    /// Header size in bytes
    /// pts(8) + len(4) = 12
    pub const SIZE: usize = 12;

    pub fn new(pts_us: i64, len: u32) -> Self {
        Self { pts_us, len }
    }

    /// Encode header to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.pts_us);
        buf.put_u32(self.len);
    }

    /// Decode header from bytes
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::protocol("Packet header too short"));
        }

        let pts_us = buf.get_i64();
        let len = buf.get_i32();

        if len < 0 {
            return Err(Error::protocol(format!("Negative packet size: {}", len)));
        }
        if len as usize > MAX_PACKET_SIZE {
            return Err(Error::protocol(format!("Packet too large: {} bytes", len)));
        }

        Ok(Self {
            pts_us,
            len: len as u32,
        })
    }

    /// Presentation timestamp, unless the packet carries the sentinel
    pub fn timestamp(&self) -> Option<i64> {
        (self.pts_us != NO_PTS).then_some(self.pts_us)
    }
}
