//! Callback pacing estimation
//!
//! Smooths the wall-clock delay between device callbacks into a stable
//! pacing signal. The production side reads the published estimate to decide
//! how much audio to request from the engine on its next tick.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Default number of callback deltas averaged
pub const DEFAULT_PACING_WINDOW: usize = 64;

/// Rolling-mean estimator of the inter-callback delay
///
/// Owned by the output driver (callback thread). Every update is published
/// to a [`PacingHandle`] so the production thread can read it without
/// touching the history.
#[derive(Debug)]
pub struct ClockEstimator {
    /// Most recent deltas in milliseconds, newest at the front
    history: VecDeque<f64>,
    /// Maximum history length
    window: usize,
    /// Timestamp of the previous callback
    last_callback: Option<Instant>,
    /// Returned until the first delta is recorded
    nominal_ms: f64,
    /// Published mean shared with the producer
    published: PacingHandle,
}

impl ClockEstimator {
    /// Create an estimator that reports `nominal_ms` until it has history
    ///
    /// `window` is clamped to at least 1.
    pub fn new(window: usize, nominal_ms: f64) -> Self {
        let window = window.max(1);
        Self {
            history: VecDeque::with_capacity(window),
            window,
            last_callback: None,
            nominal_ms,
            published: PacingHandle::new(nominal_ms),
        }
    }

    /// Estimator defaulting to the nominal period of one device block
    pub fn for_stream(window: usize, block_size: u32, sample_rate: u32) -> Self {
        Self::new(window, nominal_period_ms(block_size, sample_rate))
    }

    /// Record a device callback happening now
    pub fn record_callback(&mut self) {
        self.record_callback_at(Instant::now());
    }

    /// Record a device callback at `now`
    ///
    /// The first call only stores the timestamp; every later call contributes
    /// one delta.
    pub fn record_callback_at(&mut self, now: Instant) {
        if let Some(last) = self.last_callback {
            let delta = now.saturating_duration_since(last);
            self.record_delta_ms(delta.as_secs_f64() * 1000.0);
        }
        self.last_callback = Some(now);
    }

    /// Forget the previous callback time, keeping the history
    ///
    /// Called when the device resumes after a suspend, so the paused gap is
    /// not measured as one inter-callback delay.
    pub fn restart_interval(&mut self) {
        self.last_callback = None;
    }

    /// Push a measured delta directly
    pub fn record_delta_ms(&mut self, delta_ms: f64) {
        // Evict before inserting so the deque never grows past its allocation
        if self.history.len() == self.window {
            self.history.pop_back();
        }
        self.history.push_front(delta_ms);
        self.published.set(self.mean());
    }

    /// Current pacing estimate in milliseconds
    pub fn current_pacing_ms(&self) -> f64 {
        if self.history.is_empty() {
            self.nominal_ms
        } else {
            self.mean()
        }
    }

    /// Number of deltas currently averaged
    pub fn samples(&self) -> usize {
        self.history.len()
    }

    /// Handle for reading the estimate from another thread
    pub fn handle(&self) -> PacingHandle {
        self.published.clone()
    }

    fn mean(&self) -> f64 {
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }
}

/// Shared read side of a [`ClockEstimator`]
///
/// Stores the estimate as raw `f64` bits in an atomic, so reads never wait
/// on the callback thread.
#[derive(Debug, Clone)]
pub struct PacingHandle {
    bits: Arc<AtomicU64>,
}

impl PacingHandle {
    fn new(initial_ms: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(initial_ms.to_bits())),
        }
    }

    fn set(&self, ms: f64) {
        self.bits.store(ms.to_bits(), Ordering::Relaxed);
    }

    /// Latest published pacing estimate in milliseconds
    pub fn pacing_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Frames to produce for the current estimate at `sample_rate`
    pub fn target_frames(&self, sample_rate: u32) -> usize {
        target_frames(sample_rate, self.pacing_ms())
    }
}

/// `floor(sample_rate * pacing_ms / 1000)`
pub fn target_frames(sample_rate: u32, pacing_ms: f64) -> usize {
    (sample_rate as f64 * pacing_ms / 1000.0).floor().max(0.0) as usize
}

/// Duration of one `block_size` block at `sample_rate`, in milliseconds
pub fn nominal_period_ms(block_size: u32, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    block_size as f64 * 1000.0 / sample_rate as f64
}
