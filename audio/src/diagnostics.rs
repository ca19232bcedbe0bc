//! Stream health counters and periodic metrics logging
//!
//! The callback thread only ever touches atomics here. Formatting and
//! logging happen on the production thread via [`MetricsLog`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Lock-free counters shared between the producer, the queue and the driver
#[derive(Debug, Default)]
pub struct AudioStats {
    /// Driver invocations
    callbacks: AtomicU64,
    /// Frames handed to the device (including silence)
    frames_played: AtomicU64,
    /// Invocations that could not fill the whole block
    underruns: AtomicU64,
    /// Silence frames inserted due to underrun
    underrun_frames: AtomicU64,
    /// Invocations that found the queue held by the producer
    contended: AtomicU64,
    /// Pushes that exceeded capacity
    overflows: AtomicU64,
    /// Frames discarded by the overflow policy
    dropped_frames: AtomicU64,
    /// Frames accepted from the engine
    frames_produced: AtomicU64,
}

impl AudioStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_block(&self, requested: usize, filled: usize) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.frames_played.fetch_add(requested as u64, Ordering::Relaxed);
        if filled < requested {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            self.underrun_frames.fetch_add((requested - filled) as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_contention(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_push(&self, pushed: usize, dropped: usize) {
        self.frames_produced.fetch_add(pushed as u64, Ordering::Relaxed);
        if dropped > 0 {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            self.dropped_frames.fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    /// Total driver invocations
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Total underrun events
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Total overflow events
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Total frames discarded by the overflow policy
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Build a point-in-time snapshot
    pub fn snapshot(
        &self,
        buffered_frames: usize,
        sample_rate: u32,
        pacing_ms: f64,
    ) -> Diagnostics {
        let buffered_seconds = if sample_rate == 0 {
            0.0
        } else {
            buffered_frames as f64 / sample_rate as f64
        };
        Diagnostics {
            buffered_frames,
            buffered_seconds,
            pacing_ms,
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_played: self.frames_played.load(Ordering::Relaxed),
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of stream health
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diagnostics {
    /// Frames waiting in the queue
    pub buffered_frames: usize,
    /// Queue occupancy in playback seconds
    pub buffered_seconds: f64,
    /// Current pacing estimate (ms between device callbacks)
    pub pacing_ms: f64,
    /// Driver invocations so far
    pub callbacks: u64,
    /// Frames handed to the device, silence included
    pub frames_played: u64,
    /// Frames accepted from the engine
    pub frames_produced: u64,
    /// Underrun events
    pub underruns: u64,
    /// Silence frames inserted for underruns
    pub underrun_frames: u64,
    /// Callbacks that skipped the queue because the producer held it
    pub contended: u64,
    /// Overflow events
    pub overflows: u64,
    /// Frames dropped by the overflow policy
    pub dropped_frames: u64,
}

/// Periodic metrics line for the production thread
///
/// Tracks fill level extremes between logs and reports per-interval deltas
/// of the shared counters.
#[derive(Debug)]
pub(crate) struct MetricsLog {
    capacity: usize,
    interval: Duration,
    last_log_time: Instant,
    fill: usize,
    fill_min: usize,
    fill_max: usize,
    last_underruns: u64,
    last_overflows: u64,
    last_dropped: u64,
    last_contended: u64,
}

impl MetricsLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            interval: Duration::from_secs(1),
            last_log_time: Instant::now(),
            fill: 0,
            fill_min: capacity,
            fill_max: 0,
            last_underruns: 0,
            last_overflows: 0,
            last_dropped: 0,
            last_contended: 0,
        }
    }

    /// Update buffer fill metrics
    pub fn update_fill(&mut self, fill: usize) {
        self.fill = fill;
        self.fill_min = self.fill_min.min(fill);
        self.fill_max = self.fill_max.max(fill);
    }

    /// Log metrics if the interval has passed
    pub fn maybe_log(&mut self, stats: &AudioStats, pacing_ms: f64) {
        if self.last_log_time.elapsed() < self.interval {
            return;
        }

        let snap = stats.snapshot(self.fill, 0, pacing_ms);
        let underruns = snap.underruns - self.last_underruns;
        let overflows = snap.overflows - self.last_overflows;
        let dropped = snap.dropped_frames - self.last_dropped;
        let contended = snap.contended - self.last_contended;

        let pct = |n: usize| n as f64 / self.capacity as f64 * 100.0;
        debug!(
            "audio: buf={:.1}% (min={:.1}%, max={:.1}%), pacing={:.2}ms, \
             underruns={}, overflows={}, dropped={}, contended={}",
            pct(self.fill),
            pct(self.fill_min),
            pct(self.fill_max),
            pacing_ms,
            underruns,
            overflows,
            dropped,
            contended
        );
        if underruns > 0 {
            warn!("Audio buffer ran dry {} times in the last second", underruns);
        }

        self.last_underruns = snap.underruns;
        self.last_overflows = snap.overflows;
        self.last_dropped = snap.dropped_frames;
        self.last_contended = snap.contended;
        self.fill_min = self.fill;
        self.fill_max = self.fill;
        self.last_log_time = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_accounting() {
        let stats = AudioStats::new();
        stats.record_block(4, 4);
        stats.record_block(4, 1);
        stats.record_block(4, 0);

        let snap = stats.snapshot(0, 44_100, 10.0);
        assert_eq!(snap.callbacks, 3);
        assert_eq!(snap.frames_played, 12);
        assert_eq!(snap.underruns, 2);
        assert_eq!(snap.underrun_frames, 7);
    }

    #[test]
    fn test_push_accounting() {
        let stats = AudioStats::new();
        stats.record_push(60, 0);
        stats.record_push(60, 20);
        assert_eq!(stats.overflows(), 1);
        assert_eq!(stats.dropped_frames(), 20);
        assert_eq!(stats.snapshot(100, 100, 0.0).frames_produced, 120);
    }

    #[test]
    fn test_buffered_seconds() {
        let stats = AudioStats::new();
        let snap = stats.snapshot(22_050, 44_100, 10.0);
        assert!((snap.buffered_seconds - 0.5).abs() < 1e-12);
        assert_eq!(stats.snapshot(10, 0, 0.0).buffered_seconds, 0.0);
    }

    #[test]
    fn test_fill_extremes() {
        let mut log = MetricsLog::new(100);
        log.update_fill(40);
        log.update_fill(10);
        log.update_fill(70);
        assert_eq!(log.fill, 70);
        assert_eq!(log.fill_min, 10);
        assert_eq!(log.fill_max, 70);
    }
}
