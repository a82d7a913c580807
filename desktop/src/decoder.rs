//! H.264 video sink
//!
//! Access units are copied out of the demuxer's buffer and handed to a
//! decode thread, so a slow decoder never stalls the video socket. The
//! sink reports the size of the most recently decoded frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use droid_shared::{Error, FrameSize, VideoSink};
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use tracing::{debug, info, warn};

/// Access units allowed to wait for the decoder
const DECODE_BACKLOG: usize = 32;

struct AccessUnit {
    payload: Vec<u8>,
    pts_us: i64,
}

pub struct H264Sink {
    tx: Option<SyncSender<AccessUnit>>,
    last_size: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl H264Sink {
    /// Start the decode thread
    pub fn spawn(name: &str) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(DECODE_BACKLOG);
        let (ready_tx, ready_rx) = mpsc::channel();
        let last_size = Arc::new(AtomicU64::new(0));

        let size = last_size.clone();
        let worker = thread::Builder::new()
            .name(format!("decode-{}", name))
            .spawn(move || {
                // The decoder lives on this thread only
                let decoder = match Decoder::new() {
                    Ok(decoder) => {
                        let _ = ready_tx.send(Ok(()));
                        decoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:?}", e)));
                        return;
                    }
                };
                decode_loop(decoder, rx, &size);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => info!("H.264 decoder initialized (OpenH264)"),
            Ok(Err(e)) => anyhow::bail!("Failed to create H.264 decoder: {}", e),
            Err(_) => anyhow::bail!("H.264 decode thread exited during startup"),
        }

        Ok(Self {
            tx: Some(tx),
            last_size,
            worker: Some(worker),
        })
    }
}

impl VideoSink for H264Sink {
    fn decode(&mut self, payload: &[u8], pts_us: i64) -> droid_shared::Result<Option<FrameSize>> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Decode("decoder is shut down".into()))?;

        let unit = AccessUnit {
            payload: payload.to_vec(),
            pts_us,
        };
        match tx.try_send(unit) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(Error::Decode("decoder backlog full".into()));
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(Error::Decode("decode thread exited".into()));
            }
        }

        Ok(unpack(self.last_size.load(Ordering::Acquire)))
    }
}

impl Drop for H264Sink {
    fn drop(&mut self) {
        // Closing the channel ends the decode loop
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn decode_loop(mut decoder: Decoder, rx: Receiver<AccessUnit>, last_size: &AtomicU64) {
    let mut frames = 0u64;

    while let Ok(unit) = rx.recv() {
        match decoder.decode(&unit.payload) {
            Ok(Some(decoded)) => {
                let (width, height) = decoded.dimensions();
                let packed = pack(width as u32, height as u32);
                if last_size.swap(packed, Ordering::AcqRel) != packed {
                    info!("Resolution changed to {}x{}", width, height);
                }
                frames += 1;
            }
            Ok(None) => {
                // Decoder needs more data (buffering)
                debug!("H.264 decoder buffering (pts {})", unit.pts_us);
            }
            Err(e) => {
                warn!("H.264 decode error: {:?}", e);
            }
        }
    }

    debug!("Decode loop exited after {} frames", frames);
}

fn pack(width: u32, height: u32) -> u64 {
    ((width as u64) << 32) | height as u64
}

fn unpack(packed: u64) -> Option<FrameSize> {
    (packed != 0).then(|| FrameSize::new((packed >> 32) as u32, packed as u32))
}
