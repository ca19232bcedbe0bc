//! Device without hardware: a timer thread pulls one block per block period
//! and throws it away. Keeps the stream's timing realistic on machines with
//! no sound card.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{AudioBackend, OutputDevice, StreamSpec};
use crate::config::AudioConfig;
use crate::driver::OutputDriver;
use crate::error::{AudioError, Result};

/// Backend whose device is a timer thread
#[derive(Debug, Default)]
pub struct HeadlessBackend;

impl HeadlessBackend {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for HeadlessBackend {
    type Device = HeadlessDevice;

    fn negotiate(&mut self, config: &AudioConfig) -> Result<StreamSpec> {
        Ok(StreamSpec::from_config(config))
    }

    fn open(self, spec: StreamSpec, mut driver: OutputDriver) -> Result<HeadlessDevice> {
        let (tx, rx) = mpsc::sync_channel::<()>(1);
        let resumed = Arc::new(AtomicBool::new(false));
        let resumed_clone = resumed.clone();
        let period = Duration::from_secs_f64(spec.block_period_ms().max(0.1) / 1000.0);

        let handle = thread::Builder::new()
            .name("audio-headless".into())
            .spawn(move || {
                debug!("Headless audio device started");
                let mut deadline = Instant::now() + period;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(wait) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    if resumed_clone.load(Ordering::Acquire) {
                        driver.render_block();
                    }
                    deadline += period;
                }
                debug!("Headless audio device finished");
            })
            .map_err(AudioError::Spawn)?;

        Ok(HeadlessDevice {
            spec,
            resumed,
            tx: Some(tx),
            handle: Some(handle),
        })
    }
}

/// Timer-driven device created by [`HeadlessBackend`]
pub struct HeadlessDevice {
    spec: StreamSpec,
    resumed: Arc<AtomicBool>,
    tx: Option<SyncSender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputDevice for HeadlessDevice {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn resume(&mut self) -> Result<()> {
        self.resumed.store(true, Ordering::Release);
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.resumed.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        // Disconnect first, then join; joining first would deadlock
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
