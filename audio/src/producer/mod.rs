//! Production side of the stream
//!
//! ```text
//! Production Thread                          Device Callback
//!     │                                            │
//! [read pacing]◄────────(atomic)───────────[record callback]
//! [samples_for(pacing)]                            │
//! [validate + volume]                              │
//! [push]──────────────(queue)────────────────►[pull block]
//! ```

mod thread;

pub use thread::{ProducerExit, ProducerThread};

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use crate::clock::{PacingHandle, target_frames};
use crate::diagnostics::{AudioStats, MetricsLog};
use crate::error::Result;
use crate::frame::{CHANNELS, Frame, frames_from_interleaved};
use crate::queue::QueueProducer;

/// The emulation engine's audio output, as seen by the stream
///
/// Implementations append interleaved samples to `out`. The count only has
/// to be roughly right; the queue absorbs the difference.
pub trait SampleSource: Send + 'static {
    /// Told the device sample rate once, before the first request
    fn configure(&mut self, _sample_rate: u32) {}

    /// Channels per frame in the batches this source produces
    fn channels(&self) -> u16 {
        CHANNELS
    }

    /// Append roughly `duration_ms` of interleaved samples to `out`
    fn samples_for(&mut self, duration_ms: f64, out: &mut Vec<f32>);
}

/// Outcome of one production tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Duration requested from the source
    pub requested_ms: f64,
    /// Frames that duration corresponds to at the device rate
    pub target_frames: usize,
    /// Frames the source actually produced
    pub produced: usize,
    /// Frames discarded by the overflow policy during this push
    pub dropped: usize,
    /// Queue occupancy after the push
    pub buffered: usize,
}

/// Most fractional frames carried between ticks, either way
const MAX_CARRY_FRAMES: f64 = 2.0;

/// Master gain shared between the control thread and the producer
///
/// Stored as `f32` bits so a change applies on the next tick while playing.
#[derive(Debug, Clone)]
pub struct VolumeHandle {
    bits: Arc<AtomicU32>,
}

impl VolumeHandle {
    /// Handle at `volume`, clamped to 0.0 - 1.0
    pub fn new(volume: f32) -> Self {
        let handle = Self {
            bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
        };
        handle.set(volume);
        handle
    }

    /// Set the gain (0.0 - 1.0); NaN is treated as silence
    pub fn set(&self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Current gain
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for VolumeHandle {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// One production tick's worth of state: source, scratch buffers, queue
pub struct Producer<S: SampleSource> {
    source: S,
    queue: QueueProducer,
    pacing: PacingHandle,
    stats: Arc<AudioStats>,
    sample_rate: u32,
    volume: VolumeHandle,
    /// Frames owed to (positive) or borrowed from (negative) the next tick
    carry_frames: f64,
    /// Pre-allocated interleaved batch (reused every tick)
    raw: Vec<f32>,
    /// Pre-allocated frame batch (reused every tick)
    frames: Vec<Frame>,
    metrics: MetricsLog,
}

impl<S: SampleSource> Producer<S> {
    /// Create a producer feeding `queue` from `source`
    pub fn new(
        mut source: S,
        queue: QueueProducer,
        pacing: PacingHandle,
        stats: Arc<AudioStats>,
        sample_rate: u32,
    ) -> Self {
        source.configure(sample_rate);
        let capacity = queue.capacity();
        Self {
            source,
            queue,
            pacing,
            stats,
            sample_rate,
            volume: VolumeHandle::default(),
            carry_frames: 0.0,
            raw: Vec::with_capacity(capacity * 2),
            frames: Vec::with_capacity(capacity),
            metrics: MetricsLog::new(capacity),
        }
    }

    /// Set the master volume (0.0 - 1.0)
    pub fn set_master_volume(&mut self, volume: f32) {
        self.volume.set(volume);
    }

    /// Get the current master volume
    pub fn master_volume(&self) -> f32 {
        self.volume.get()
    }

    /// Shared handle to the master volume, usable while the producer runs
    /// on another thread
    pub fn volume_handle(&self) -> VolumeHandle {
        self.volume.clone()
    }

    /// Current pacing estimate
    pub fn pacing_ms(&self) -> f64 {
        self.pacing.pacing_ms()
    }

    /// Frames currently buffered
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// The wrapped source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The wrapped source, mutably
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Run one production tick sized by the current pacing estimate
    ///
    /// # Errors
    ///
    /// Fails if the source produced a malformed batch. Nothing from that
    /// batch reaches the queue.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.tick_for(self.pacing.pacing_ms())
    }

    /// Run one production tick covering `period_ms` of playback
    ///
    /// The production thread passes the period it actually waited, so output
    /// tracks wall-clock time even when that differs from the estimate.
    /// Fractions of a frame the source could not deliver are owed to the next
    /// tick.
    ///
    /// # Errors
    ///
    /// Fails if the source produced a malformed batch. Nothing from that
    /// batch reaches the queue.
    pub fn tick_for(&mut self, period_ms: f64) -> Result<TickReport> {
        let period_ms = if period_ms.is_finite() {
            period_ms.max(0.0)
        } else {
            0.0
        };
        let exact_frames = if self.sample_rate == 0 {
            0.0
        } else {
            (self.sample_rate as f64 * period_ms / 1000.0 + self.carry_frames).max(0.0)
        };
        let request_ms = if self.sample_rate == 0 {
            period_ms
        } else {
            exact_frames * 1000.0 / self.sample_rate as f64
        };

        let report = self.produce(request_ms)?;
        self.carry_frames =
            (exact_frames - report.produced as f64).clamp(-MAX_CARRY_FRAMES, MAX_CARRY_FRAMES);

        self.metrics.update_fill(report.buffered);
        self.metrics.maybe_log(&self.stats, self.pacing.pacing_ms());
        Ok(report)
    }

    /// Generate `frames` frames worth of audio regardless of pacing
    ///
    /// Used to put some slack in the queue before the device starts pulling.
    pub fn prefill(&mut self, frames: usize) -> Result<TickReport> {
        let duration_ms = if self.sample_rate == 0 {
            0.0
        } else {
            frames as f64 * 1000.0 / self.sample_rate as f64
        };
        self.produce(duration_ms)
    }

    fn produce(&mut self, duration_ms: f64) -> Result<TickReport> {
        self.raw.clear();
        self.source.samples_for(duration_ms, &mut self.raw);

        self.frames.clear();
        frames_from_interleaved(&self.raw, self.source.channels(), &mut self.frames)?;

        // Skip scaling if volume is at 100%
        let gain = self.volume.get();
        if (gain - 1.0).abs() >= f32::EPSILON {
            for frame in &mut self.frames {
                *frame = frame.scaled(gain);
            }
        }

        let push = self.queue.push(&self.frames);
        let report = TickReport {
            requested_ms: duration_ms,
            target_frames: target_frames(self.sample_rate, duration_ms),
            produced: self.frames.len(),
            dropped: push.dropped,
            buffered: self.queue.len(),
        };
        trace!(
            "Produced {} frames for {:.2}ms (target {}), buffered {}",
            report.produced, report.requested_ms, report.target_frames, report.buffered
        );
        Ok(report)
    }
}
