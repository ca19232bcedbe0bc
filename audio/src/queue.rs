//! Bounded frame queue between the production tick and the device callback
//!
//! A fixed-capacity ring of [`Frame`]s. Overflow keeps the newest
//! `capacity` frames (bounded latency over completeness); underrun is
//! reported through the `filled` count and left to the caller to pad.
//!
//! Access discipline: exactly one producer and one consumer, enforced by
//! [`SampleQueue::split`] handing out non-cloneable halves. The ring sits
//! behind a mutex that the producer holds only for a skip plus one slice
//! copy. The consumer never waits for it: `try_lock` either succeeds at once
//! or the block is treated as an underrun.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer};
use tracing::{trace, warn};

use crate::diagnostics::AudioStats;
use crate::frame::Frame;

/// Outcome of a single push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushReport {
    /// Frames from the batch now in the queue
    pub pushed: usize,
    /// Frames discarded by the overflow policy (queued or from the batch)
    pub dropped: usize,
}

struct Shared {
    ring: Mutex<HeapRb<Frame>>,
    /// Mirror of the ring occupancy, readable without the lock
    len: AtomicUsize,
    capacity: usize,
    stats: Arc<AudioStats>,
}

impl Shared {
    fn lock_for_write(&self) -> MutexGuard<'_, HeapRb<Frame>> {
        self.ring.lock().unwrap_or_else(|e| {
            warn!("Sample queue mutex poisoned; continuing");
            e.into_inner()
        })
    }

    fn push(&self, frames: &[Frame]) -> PushReport {
        // A batch larger than the whole queue only contributes its tail
        let skipped = frames.len().saturating_sub(self.capacity);
        let incoming = &frames[skipped..];

        let mut ring = self.lock_for_write();
        let overflow = (ring.occupied_len() + incoming.len()).saturating_sub(self.capacity);
        let evicted = ring.skip(overflow);
        let pushed = ring.push_slice(incoming);
        self.len.store(ring.occupied_len(), Ordering::Release);
        drop(ring);

        let report = PushReport {
            pushed,
            dropped: skipped + evicted + (incoming.len() - pushed),
        };
        if report.dropped > 0 {
            trace!("Sample queue overflow: dropped {} oldest frames", report.dropped);
        }
        self.stats.record_push(report.pushed, report.dropped);
        report
    }

    fn pull_into(&self, out: &mut [Frame]) -> usize {
        let mut ring = match self.ring.try_lock() {
            Ok(ring) => ring,
            Err(TryLockError::WouldBlock) => {
                self.stats.record_contention();
                return 0;
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };
        let filled = ring.pop_slice(out);
        self.len.store(ring.occupied_len(), Ordering::Release);
        filled
    }

    fn pull(&self, n: usize) -> (Vec<Frame>, usize) {
        let mut frames = vec![Frame::SILENCE; n];
        let filled = self.pull_into(&mut frames);
        (frames, filled)
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}

/// Bounded FIFO of frames
///
/// Usable directly from one thread, or split into a producer/consumer pair
/// for the two timing domains.
pub struct SampleQueue {
    shared: Arc<Shared>,
}

impl SampleQueue {
    /// Create an empty queue holding at most `capacity_frames` frames
    ///
    /// The capacity is clamped to at least one frame.
    pub fn new(capacity_frames: usize, stats: Arc<AudioStats>) -> Self {
        let capacity = capacity_frames.max(1);
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(HeapRb::new(capacity)),
                len: AtomicUsize::new(0),
                capacity,
                stats,
            }),
        }
    }

    /// Split into the producer and consumer halves
    pub fn split(self) -> (QueueProducer, QueueConsumer) {
        (
            QueueProducer {
                shared: self.shared.clone(),
            },
            QueueConsumer {
                shared: self.shared,
            },
        )
    }

    /// Append frames, keeping only the newest `capacity` overall
    pub fn push(&self, frames: &[Frame]) -> PushReport {
        self.shared.push(frames)
    }

    /// Remove up to `n` frames from the front
    ///
    /// Always returns `n` frames; those past `filled` are silence. `filled < n`
    /// is an underrun.
    pub fn pull(&self, n: usize) -> (Vec<Frame>, usize) {
        self.shared.pull(n)
    }

    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Whether no frames are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum frames retained
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Writing half of a [`SampleQueue`], owned by the production tick
pub struct QueueProducer {
    shared: Arc<Shared>,
}

impl QueueProducer {
    /// Append frames, dropping the oldest on overflow
    pub fn push(&mut self, frames: &[Frame]) -> PushReport {
        self.shared.push(frames)
    }

    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Whether no frames are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum frames retained
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Occupancy view that can outlive this handle
    pub fn monitor(&self) -> QueueMonitor {
        QueueMonitor {
            shared: self.shared.clone(),
        }
    }
}

/// Reading half of a [`SampleQueue`], owned by the output driver
pub struct QueueConsumer {
    shared: Arc<Shared>,
}

impl QueueConsumer {
    /// Fill the front of `out` with queued frames; never blocks
    ///
    /// Returns how many slots were written. Slots past that are untouched.
    pub fn pull_into(&mut self, out: &mut [Frame]) -> usize {
        self.shared.pull_into(out)
    }

    /// Remove up to `n` frames, silence-padded to `n` (allocates; not for the
    /// callback path)
    pub fn pull(&mut self, n: usize) -> (Vec<Frame>, usize) {
        self.shared.pull(n)
    }

    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Whether no frames are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only occupancy view for diagnostics
#[derive(Clone)]
pub struct QueueMonitor {
    shared: Arc<Shared>,
}

impl QueueMonitor {
    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Whether no frames are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum frames retained
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
