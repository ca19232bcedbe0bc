//! emu-audio - real-time audio streaming for emulators
//!
//! Bridges an emulation loop that produces samples on its own approximate
//! cadence to an audio device that pulls fixed-size blocks on its own clock.
//!
//! # Architecture
//!
//! - [`ClockEstimator`] - rolling mean of the delay between device callbacks
//! - [`SampleQueue`] - bounded SPSC frame queue; overflow drops the oldest
//! - [`OutputDriver`] - device callback; pads underruns with silence
//! - [`Transport`] - `Stopped → Starting → Running` lifecycle
//! - [`AudioPipeline`] - all of the above plus a device and production thread
//!
//! # Usage
//!
//! ```ignore
//! let config = emu_audio::config::load();
//! let mut pipeline = AudioPipeline::new(config, CpalBackend::new(), engine_audio)?;
//! pipeline.play()?;
//! // ... each frame
//! pipeline.check()?;
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod frame;
#[cfg(test)]
mod integration;
pub mod pipeline;
pub mod producer;
pub mod queue;
pub mod transport;

pub use backend::{
    AudioBackend, CpalBackend, HeadlessBackend, ManualBackend, OutputDevice, StreamSpec,
};
pub use clock::{ClockEstimator, PacingHandle};
pub use config::AudioConfig;
pub use diagnostics::{AudioStats, Diagnostics};
pub use driver::{BlockReport, OutputDriver};
pub use error::{AudioError, Result};
pub use frame::{CHANNELS, Frame};
pub use pipeline::AudioPipeline;
pub use producer::{Producer, ProducerThread, SampleSource, TickReport, VolumeHandle};
pub use queue::{PushReport, QueueConsumer, QueueProducer, SampleQueue};
pub use transport::{Transport, TransportHandle, TransportState};
