//! Production thread
//!
//! Runs [`Producer::tick_for`] on a named thread at the cadence of the
//! pacing estimate, so on average one callback's worth of audio is produced
//! per device callback. Each tick covers exactly the period the thread
//! waited for it, which keeps production at the device rate even when the
//! estimate is clamped. Ticks follow a deadline grid rather than sleeping
//! after each tick, so scheduling overshoot does not accumulate into drift.

use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::{Producer, SampleSource};
use crate::error::{AudioError, Result};

/// Shortest tick period, whatever the estimate says
const MIN_TICK: Duration = Duration::from_millis(1);
/// Longest tick period, whatever the estimate says
const MAX_TICK: Duration = Duration::from_millis(250);
/// How far the thread may fall behind before the grid is reset
const MAX_LAG: Duration = Duration::from_millis(250);

/// What the production thread hands back when it ends
pub struct ProducerExit<S: SampleSource> {
    /// The producer, ready to be restarted
    pub producer: Producer<S>,
    /// `Err` if the thread ended on a fault rather than a stop request
    pub result: Result<()>,
}

/// Handle to a running production thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct ProducerThread<S: SampleSource> {
    /// Stop signal (Option to allow explicit drop before join)
    tx: Option<SyncSender<()>>,
    /// Thread join handle
    handle: Option<JoinHandle<ProducerExit<S>>>,
}

impl<S: SampleSource> ProducerThread<S> {
    /// Spawn the production thread
    ///
    /// `prefill_frames` of audio are generated before the first paced tick.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Spawn`] if the OS refuses the thread.
    pub fn spawn(producer: Producer<S>, prefill_frames: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<()>(1);

        let handle = thread::Builder::new()
            .name("audio-producer".into())
            .spawn(move || {
                let mut producer = producer;
                let result = run(&mut producer, &rx, prefill_frames);
                ProducerExit { producer, result }
            })
            .map_err(AudioError::Spawn)?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Check if the production thread is still running
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the thread and take the producer back
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::ProducerPanicked`] if the thread panicked; the
    /// producer is lost in that case.
    pub fn stop(mut self) -> Result<ProducerExit<S>> {
        // Drop the sender FIRST so recv_timeout() sees Disconnected
        drop(self.tx.take());
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| AudioError::ProducerPanicked),
            None => Err(AudioError::ProducerPanicked),
        }
    }
}

impl<S: SampleSource> Drop for ProducerThread<S> {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn tick_period<S: SampleSource>(producer: &Producer<S>) -> Duration {
    let ms = producer.pacing_ms();
    if !ms.is_finite() || ms <= 0.0 {
        return MIN_TICK;
    }
    Duration::from_secs_f64(ms / 1000.0).clamp(MIN_TICK, MAX_TICK)
}

fn run<S: SampleSource>(
    producer: &mut Producer<S>,
    rx: &mpsc::Receiver<()>,
    prefill_frames: usize,
) -> Result<()> {
    debug!("Audio production thread started");

    if prefill_frames > 0 {
        producer.prefill(prefill_frames).inspect_err(|e| {
            error!("Audio source produced a bad batch during prefill: {}", e);
        })?;
    }

    let mut period = tick_period(producer);
    let mut deadline = Instant::now() + period;
    loop {
        // Wait for the next deadline; any message or a dropped sender means stop
        let wait = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        // Produce for the period that just elapsed, not the raw estimate
        if let Err(e) = producer.tick_for(period.as_secs_f64() * 1000.0) {
            error!("Audio source produced a bad batch, stopping: {}", e);
            return Err(e);
        }

        period = tick_period(producer);
        deadline += period;

        let now = Instant::now();
        if now > deadline + MAX_LAG {
            warn!(
                "Audio production fell {:.1}ms behind; skipping ahead",
                (now - deadline).as_secs_f64() * 1000.0
            );
            deadline = now + period;
        }
    }

    debug!("Audio production thread finished");
    Ok(())
}
