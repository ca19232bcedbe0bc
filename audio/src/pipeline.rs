//! Stream facade: queue, clock, driver, device, transport and production
//! thread wired together
//!
//! This is the public interface most callers want.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{AudioBackend, OutputDevice, StreamSpec};
use crate::clock::{ClockEstimator, PacingHandle};
use crate::config::AudioConfig;
use crate::diagnostics::{AudioStats, Diagnostics};
use crate::driver::OutputDriver;
use crate::error::{AudioError, Result};
use crate::producer::{Producer, ProducerThread, SampleSource, VolumeHandle};
use crate::queue::{QueueMonitor, SampleQueue};
use crate::transport::{Transport, TransportState};

/// A complete audio stream from a [`SampleSource`] to an [`OutputDevice`]
pub struct AudioPipeline<S: SampleSource, D: OutputDevice> {
    config: AudioConfig,
    spec: StreamSpec,
    device: D,
    transport: Transport,
    /// Parked producer while stopped
    producer: Option<Producer<S>>,
    /// Running production thread while playing
    thread: Option<ProducerThread<S>>,
    monitor: QueueMonitor,
    pacing: PacingHandle,
    volume: VolumeHandle,
    stats: Arc<AudioStats>,
}

impl<S: SampleSource, D: OutputDevice> AudioPipeline<S, D> {
    /// Build the stream and create the device, suspended
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid or the backend cannot create the
    /// device. Retrying means calling `new` again with a fresh backend.
    pub fn new<B>(config: AudioConfig, mut backend: B, source: S) -> Result<Self>
    where
        B: AudioBackend<Device = D>,
    {
        config.validate()?;
        let spec = backend.negotiate(&config)?;

        let stats = Arc::new(AudioStats::new());
        let queue = SampleQueue::new(config.capacity_frames(spec.block_size), stats.clone());
        let (queue_producer, queue_consumer) = queue.split();
        let monitor = queue_producer.monitor();

        let clock =
            ClockEstimator::for_stream(config.pacing_window, spec.block_size, spec.sample_rate);
        let pacing = clock.handle();

        let transport = Transport::new();
        let driver = OutputDriver::new(
            queue_consumer,
            clock,
            transport.handle(),
            stats.clone(),
            spec.block_size,
        );
        let device = backend.open(spec, driver)?;

        let mut producer = Producer::new(
            source,
            queue_producer,
            pacing.clone(),
            stats.clone(),
            spec.sample_rate,
        );
        producer.set_master_volume(config.master_volume);
        let volume = producer.volume_handle();

        debug!(
            "Audio pipeline ready: {}Hz, block {}, capacity {} frames",
            spec.sample_rate,
            spec.block_size,
            monitor.capacity()
        );

        Ok(Self {
            config,
            spec,
            device,
            transport,
            producer: Some(producer),
            thread: None,
            monitor,
            pacing,
            volume,
            stats,
        })
    }

    /// Start playback
    ///
    /// From `Stopped` this starts the source, requests a device resume and
    /// moves to `Starting`; the first device callback moves it to `Running`.
    /// In `Starting` or `Running` this does nothing.
    ///
    /// # Errors
    ///
    /// Fails if the production thread cannot start or the device refuses to
    /// resume. The transport is back in `Stopped` afterwards.
    pub fn play(&mut self) -> Result<()> {
        if !self.transport.play() {
            return Ok(());
        }

        let Some(producer) = self.producer.take() else {
            self.transport.stop();
            return Err(AudioError::ProducerPanicked);
        };
        let prefill = self.config.prefill_frames(self.spec.block_size);
        match ProducerThread::spawn(producer, prefill) {
            Ok(thread) => self.thread = Some(thread),
            Err(e) => {
                self.transport.stop();
                return Err(e);
            }
        }

        if let Err(e) = self.device.resume() {
            self.transport.stop();
            if let Err(fault) = self.halt_producer() {
                warn!("Audio production stopped with error: {}", fault);
            }
            return Err(e);
        }

        debug!("Audio playback starting");
        Ok(())
    }

    /// Stop playback from any state
    ///
    /// Suspends the device and halts the source. Frames already queued stay
    /// queued; a callback that is in flight finishes normally.
    ///
    /// # Errors
    ///
    /// Returns the fault that ended the production thread, if any, or a
    /// device error from suspending.
    pub fn stop(&mut self) -> Result<()> {
        let previous = self.transport.stop();
        let suspended = if previous == TransportState::Stopped {
            Ok(())
        } else {
            self.device.suspend()
        };
        let produced = self.halt_producer();

        if previous != TransportState::Stopped {
            debug!("Audio playback stopped (was {})", previous);
        }
        produced?;
        suspended
    }

    /// Surface a production fault that happened while playing
    ///
    /// If the production thread died, this stops the stream and returns its
    /// error. Call it once per frame or so from the control thread.
    pub fn check(&mut self) -> Result<()> {
        let died = self.thread.as_ref().is_some_and(|t| !t.is_alive());
        if died {
            self.stop()
        } else {
            Ok(())
        }
    }

    fn halt_producer(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let exit = thread.stop()?;
        self.producer = Some(exit.producer);
        exit.result
    }

    /// Current transport state
    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    /// Whether the device has confirmed playback
    pub fn running(&self) -> bool {
        self.transport.is_running()
    }

    /// Device sample rate
    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Negotiated stream shape
    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    /// Config the stream was built from
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Frames waiting in the queue
    pub fn remaining_frames(&self) -> usize {
        self.monitor.len()
    }

    /// Set the master volume (0.0 - 1.0)
    ///
    /// Applies from the next production tick, including while playing.
    /// Audio already queued keeps the gain it was produced with.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.volume.set(volume);
        self.config.master_volume = self.volume.get();
    }

    /// Current master volume
    pub fn master_volume(&self) -> f32 {
        self.volume.get()
    }

    /// Stream health snapshot
    pub fn diagnostics(&self) -> Diagnostics {
        self.stats.snapshot(
            self.monitor.len(),
            self.spec.sample_rate,
            self.pacing.pacing_ms(),
        )
    }

    /// The output device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The output device, mutably
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The parked source, available while stopped
    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.producer.as_mut().map(|p| p.source_mut())
    }
}

impl<S: SampleSource, D: OutputDevice> Drop for AudioPipeline<S, D> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Audio pipeline stopped with error: {}", e);
        }
    }
}
