//! Output through the platform's default device (cpal)

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tracing::{debug, error, info, warn};

use super::{AudioBackend, OutputDevice, StreamSpec};
use crate::config::AudioConfig;
use crate::driver::OutputDriver;
use crate::error::{AudioError, Result};
use crate::frame::CHANNELS;

/// Backend for the host's default output device
pub struct CpalBackend {
    host: cpal::Host,
    /// Device and its default config, filled by `negotiate`
    selected: Option<(cpal::Device, cpal::SupportedStreamConfig)>,
}

impl CpalBackend {
    /// Use the platform's default host
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            selected: None,
        }
    }

    fn select(&mut self) -> Result<&(cpal::Device, cpal::SupportedStreamConfig)> {
        if self.selected.is_none() {
            let device = self
                .host
                .default_output_device()
                .ok_or(AudioError::NoDevice)?;
            let config = device.default_output_config().map_err(|e| {
                AudioError::Device(format!("Failed to get default output config: {}", e))
            })?;
            self.selected = Some((device, config));
        }
        self.selected.as_ref().ok_or(AudioError::NoDevice)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    type Device = CpalDevice;

    fn negotiate(&mut self, config: &AudioConfig) -> Result<StreamSpec> {
        let (device, supported) = self.select()?;

        let sample_rate = config.sample_rate.unwrap_or(supported.sample_rate().0);
        let block_size = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => {
                let clamped = config.block_size.clamp(*min, *max);
                if clamped != config.block_size {
                    warn!(
                        "Block size {} outside device range {}-{}, using {}",
                        config.block_size, min, max, clamped
                    );
                }
                clamped
            }
            cpal::SupportedBufferSize::Unknown => config.block_size,
        };

        info!(
            "Audio output: {} at {}Hz, {} frames per block",
            device.name().unwrap_or_else(|_| "<unnamed>".into()),
            sample_rate,
            block_size
        );

        Ok(StreamSpec {
            sample_rate,
            block_size,
            channels: CHANNELS,
        })
    }

    fn open(mut self, spec: StreamSpec, driver: OutputDriver) -> Result<CpalDevice> {
        let (device, supported) = self.select()?;
        let sample_format = supported.sample_format();

        let config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(spec.block_size),
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(device, &config, driver)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(device, &config, driver)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(device, &config, driver)?,
            other => {
                return Err(AudioError::UnsupportedFormat(format!("{:?}", other)));
            }
        };

        // Some hosts start streams immediately; the transport decides when to play
        if let Err(e) = stream.pause() {
            debug!("Could not pause freshly built stream: {}", e);
        }

        debug!("Audio stream built ({:?})", sample_format);
        Ok(CpalDevice { stream, spec })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut driver: OutputDriver,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                driver.render_interleaved(data, channels);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Device(format!("Failed to build audio stream: {}", e)))
}

/// A live cpal output stream
pub struct CpalDevice {
    /// The cpal stream (kept alive for the duration)
    stream: cpal::Stream,
    spec: StreamSpec,
}

impl OutputDevice for CpalDevice {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn resume(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::Device(format!("Failed to play audio stream: {}", e)))?;
        debug!("Audio stream resume requested");
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::Device(format!("Failed to pause audio stream: {}", e)))?;
        debug!("Audio stream suspended");
        Ok(())
    }
}
