//! Device whose callbacks are invoked by the caller
//!
//! Used by tests and by embedders that already own an audio callback (for
//! example a browser worklet bridge) and just want the stream logic.

use super::{AudioBackend, OutputDevice, StreamSpec};
use crate::config::AudioConfig;
use crate::driver::{BlockReport, OutputDriver};
use crate::error::Result;
use crate::frame::Frame;

/// Backend producing a [`ManualDevice`]
#[derive(Debug, Default)]
pub struct ManualBackend;

impl ManualBackend {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for ManualBackend {
    type Device = ManualDevice;

    fn negotiate(&mut self, config: &AudioConfig) -> Result<StreamSpec> {
        Ok(StreamSpec::from_config(config))
    }

    fn open(self, spec: StreamSpec, driver: OutputDriver) -> Result<ManualDevice> {
        Ok(ManualDevice {
            spec,
            driver,
            resumed: false,
        })
    }
}

/// Device that renders a block each time [`ManualDevice::pump`] is called
pub struct ManualDevice {
    spec: StreamSpec,
    driver: OutputDriver,
    resumed: bool,
}

impl ManualDevice {
    /// Invoke the driver once, as the host would
    ///
    /// Returns `None` while suspended; a suspended device makes no callbacks.
    pub fn pump(&mut self) -> Option<BlockReport> {
        self.resumed.then(|| self.driver.render_block())
    }

    /// Invoke the driver into a caller-supplied buffer
    pub fn pump_into(&mut self, out: &mut [Frame]) -> Option<BlockReport> {
        self.resumed.then(|| self.driver.render(out))
    }

    /// The block rendered by the last [`ManualDevice::pump`]
    pub fn last_block(&self) -> &[Frame] {
        self.driver.last_block()
    }

    /// Whether a resume is in effect
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }
}

impl OutputDevice for ManualDevice {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn resume(&mut self) -> Result<()> {
        self.resumed = true;
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.resumed = false;
        Ok(())
    }
}
