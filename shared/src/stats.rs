//! Video stream statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Statistics snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Access units per second since the previous snapshot
    pub packets_per_sec: f64,

    /// Bitrate in Mbps since the previous snapshot
    pub bitrate_mbps: f64,

    /// Total access units forwarded to the sink
    pub total_packets: u64,

    /// Total payload bytes forwarded to the sink
    pub total_bytes: u64,

    /// Access units the sink failed to decode
    pub dropped_packets: u64,

    /// Uptime in seconds
    pub uptime_secs: f64,
}

/// Thread-safe statistics collector
///
/// Written by the video worker, read by anyone.
#[derive(Debug)]
pub struct Stats {
    start_time: Mutex<Instant>,
    last_snapshot_time: Mutex<Instant>,

    packets: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,

    last_packets: AtomicU64,
    last_bytes: AtomicU64,
}

impl Stats {
    /// Create new stats collector
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record an access unit handed to the sink
    pub fn record_packet(&self, bytes: u64) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an access unit the sink rejected
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();

        let total_packets = self.packets.load(Ordering::Relaxed);
        let total_bytes = self.bytes.load(Ordering::Relaxed);

        let mut last_time = lock(&self.last_snapshot_time);
        let elapsed = now.duration_since(*last_time);

        let (packets_per_sec, bytes_per_sec) = if elapsed >= Duration::from_millis(100) {
            let last_packets = self.last_packets.swap(total_packets, Ordering::Relaxed);
            let last_bytes = self.last_bytes.swap(total_bytes, Ordering::Relaxed);
            *last_time = now;

            let secs = elapsed.as_secs_f64();
            (
                total_packets.saturating_sub(last_packets) as f64 / secs,
                total_bytes.saturating_sub(last_bytes) as f64 / secs,
            )
        } else {
            (0.0, 0.0)
        };

        StatsSnapshot {
            packets_per_sec,
            bitrate_mbps: bytes_per_sec * 8.0 / 1_000_000.0,
            total_packets,
            total_bytes,
            dropped_packets: self.dropped.load(Ordering::Relaxed),
            uptime_secs: now.duration_since(*lock(&self.start_time)).as_secs_f64(),
        }
    }

    /// Reset all counters and restart the uptime clock
    pub fn reset(&self) {
        let now = Instant::now();
        *lock(&self.start_time) = now;
        *lock(&self.last_snapshot_time) = now;
        self.packets.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.last_packets.store(0, Ordering::Relaxed);
        self.last_bytes.store(0, Ordering::Relaxed);
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            start_time: Mutex::new(Instant::now()),
            last_snapshot_time: Mutex::new(Instant::now()),
            packets: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_packets: AtomicU64::new(0),
            last_bytes: AtomicU64::new(0),
        }
    }
}

fn lock(mutex: &Mutex<Instant>) -> MutexGuard<'_, Instant> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
