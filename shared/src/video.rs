//! Video demuxer
//!
//! Pulls length-prefixed access units off the video socket and hands each
//! one, in arrival order, to a [`VideoSink`].

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::protocol::PacketHeader;
use crate::stats::Stats;

/// Size of a decoded frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Latest known frame size, written by the video worker only
///
/// Width and height are packed into one word so readers never observe a
/// torn pair.
#[derive(Debug, Default)]
pub struct Geometry {
    packed: AtomicU64,
}

impl Geometry {
    pub fn set(&self, size: FrameSize) {
        let packed = (u64::from(size.width) << 32) | u64::from(size.height);
        self.packed.store(packed, Ordering::Release);
    }

    /// `None` until a frame has been decoded
    pub fn get(&self) -> Option<FrameSize> {
        let packed = self.packed.load(Ordering::Acquire);
        (packed != 0).then(|| FrameSize::new((packed >> 32) as u32, packed as u32))
    }

    pub fn clear(&self) {
        self.packed.store(0, Ordering::Release);
    }
}

/// Consumer of raw access units
///
/// `payload` is only borrowed for the duration of the call; a sink that
/// needs the bytes later must copy them. Returning a frame size reports the
/// geometry of the picture the unit produced.
pub trait VideoSink: Send {
    fn decode(&mut self, payload: &[u8], pts_us: i64) -> Result<Option<FrameSize>>;
}

impl<F> VideoSink for F
where
    F: FnMut(&[u8], i64) -> Result<Option<FrameSize>> + Send,
{
    fn decode(&mut self, payload: &[u8], pts_us: i64) -> Result<Option<FrameSize>> {
        self(payload, pts_us)
    }
}

/// Outcome of filling a buffer from the socket
enum Fill {
    Complete,
    Cancelled,
    /// Peer closed after this many bytes
    Eof(usize),
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Read until `buf` is full, retrying across read timeouts
///
/// Once cancellation is requested, a timeout, EOF or read error all end
/// the fill as `Cancelled`.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8], cancel: &CancellationToken) -> io::Result<Fill> {
    let mut pos = 0;

    while pos < buf.len() {
        if cancel.is_cancelled() {
            return Ok(Fill::Cancelled);
        }

        match reader.read(&mut buf[pos..]) {
            Ok(0) if cancel.is_cancelled() => return Ok(Fill::Cancelled),
            Ok(0) => return Ok(Fill::Eof(pos)),
            Ok(n) => pos += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(_) if cancel.is_cancelled() => return Ok(Fill::Cancelled),
            Err(e) if is_timeout(&e) => trace!("Video read timed out, retrying"),
            Err(e) => return Err(e),
        }
    }

    Ok(Fill::Complete)
}

/// Reader loop for the video socket
pub struct VideoDemuxer<R> {
    reader: R,
    cancel: CancellationToken,
    geometry: Arc<Geometry>,
    stats: Arc<Stats>,
    payload: BytesMut,
}

impl<R: Read> VideoDemuxer<R> {
    pub fn new(
        reader: R,
        cancel: CancellationToken,
        geometry: Arc<Geometry>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            reader,
            cancel,
            geometry,
            stats,
            payload: BytesMut::new(),
        }
    }

    /// Forward access units to `sink` until cancelled or the stream fails
    ///
    /// Returns `Ok(())` only on cancellation. A closed or truncated stream
    /// is an error; the caller is expected to stop the session.
    pub fn run(&mut self, sink: &mut dyn VideoSink) -> Result<()> {
        loop {
            let Some(header) = self.read_header()? else {
                return Ok(());
            };

            let started = Instant::now();
            if !self.read_payload(header.len as usize)? {
                return Ok(());
            }

            self.forward(sink, header);
            trace!(
                "Received and decoded a {} byte packet in {:?}",
                header.len,
                started.elapsed()
            );
        }
    }

    fn read_header(&mut self) -> Result<Option<PacketHeader>> {
        let mut raw = [0u8; PacketHeader::SIZE];

        match fill(&mut self.reader, &mut raw, &self.cancel).map_err(read_failed)? {
            Fill::Complete => PacketHeader::decode(&raw).map(Some),
            Fill::Cancelled => Ok(None),
            Fill::Eof(0) => Err(Error::protocol("Video stream closed by device")),
            Fill::Eof(n) => Err(Error::protocol(format!(
                "Expected a {} byte packet header, got {} bytes",
                PacketHeader::SIZE,
                n
            ))),
        }
    }

    /// Returns `false` if cancelled before the payload was complete
    fn read_payload(&mut self, len: usize) -> Result<bool> {
        self.payload.clear();
        self.payload.resize(len, 0);

        match fill(&mut self.reader, &mut self.payload[..], &self.cancel).map_err(read_failed)? {
            Fill::Complete => Ok(true),
            Fill::Cancelled => Ok(false),
            Fill::Eof(n) => Err(Error::stream(format!(
                "Connection closed after {} of {} payload bytes",
                n, len
            ))),
        }
    }

    fn forward(&mut self, sink: &mut dyn VideoSink, header: PacketHeader) {
        self.stats.record_packet(u64::from(header.len));

        match sink.decode(&self.payload, header.pts_us) {
            Ok(Some(size)) => self.geometry.set(size),
            Ok(None) => {}
            Err(e) => {
                warn!("Video sink rejected packet (pts {}): {}", header.pts_us, e);
                self.stats.record_drop();
            }
        }
    }
}

fn read_failed(err: io::Error) -> Error {
    Error::stream(format!("Video read failed: {}", err))
}
