//! Host audio backends
//!
//! A backend negotiates the stream shape with the host, then takes ownership
//! of the [`OutputDriver`] and hands back a device with suspend/resume.
//!
//! - [`CpalBackend`] - the platform's default output device via cpal
//! - [`HeadlessBackend`] - a timer thread standing in for hardware
//! - [`ManualBackend`] - the caller pumps callbacks (tests, embedding)

mod headless;
mod host;
mod manual;

pub use headless::{HeadlessBackend, HeadlessDevice};
pub use host::{CpalBackend, CpalDevice};
pub use manual::{ManualBackend, ManualDevice};

use crate::config::{AudioConfig, DEFAULT_SAMPLE_RATE};
use crate::driver::OutputDriver;
use crate::error::Result;
use crate::frame::CHANNELS;

/// Stream shape fixed at setup and never renegotiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    /// Device sample rate in Hz
    pub sample_rate: u32,
    /// Frames per device callback
    pub block_size: u32,
    /// Always [`CHANNELS`]
    pub channels: u16,
}

impl StreamSpec {
    /// Stream shape taken straight from the config, for backends without a device to ask
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            block_size: config.block_size,
            channels: CHANNELS,
        }
    }

    /// Duration of one block in milliseconds
    pub fn block_period_ms(&self) -> f64 {
        crate::clock::nominal_period_ms(self.block_size, self.sample_rate)
    }
}

/// A host audio subsystem that can create an output device
pub trait AudioBackend {
    /// Device type produced by [`AudioBackend::open`]
    type Device: OutputDevice;

    /// Settle sample rate and block size for `config`
    fn negotiate(&mut self, config: &AudioConfig) -> Result<StreamSpec>;

    /// Create the device and register `driver` as its callback
    ///
    /// The device starts suspended.
    fn open(self, spec: StreamSpec, driver: OutputDriver) -> Result<Self::Device>;
}

/// A created output device
///
/// `resume` is a request; the device acknowledges it asynchronously by
/// invoking the driver.
pub trait OutputDevice {
    /// Stream shape the device was created with
    fn spec(&self) -> StreamSpec;

    /// Ask the device to start pulling audio
    fn resume(&mut self) -> Result<()>;

    /// Ask the device to stop pulling audio
    fn suspend(&mut self) -> Result<()>;
}
