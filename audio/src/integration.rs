//! End-to-end tests through [`AudioPipeline`]
//!
//! The production thread runs for real. Most tests play the role of the host
//! audio subsystem by pumping a manual device; the headless device covers
//! callbacks firing on their own thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::backend::{
    AudioBackend, HeadlessBackend, ManualBackend, ManualDevice, OutputDevice, StreamSpec,
};
use crate::config::AudioConfig;
use crate::driver::OutputDriver;
use crate::error::{AudioError, Result};
use crate::frame::Frame;
use crate::pipeline::AudioPipeline;
use crate::producer::SampleSource;
use crate::transport::TransportState;

/// Constant-amplitude source that can be told to go bad
struct Dc {
    rate: u32,
    level: f32,
    broken: Arc<AtomicBool>,
}

impl Dc {
    fn new(level: f32) -> (Self, Arc<AtomicBool>) {
        let broken = Arc::new(AtomicBool::new(false));
        (
            Self {
                rate: 0,
                level,
                broken: broken.clone(),
            },
            broken,
        )
    }
}

impl SampleSource for Dc {
    fn configure(&mut self, sample_rate: u32) {
        self.rate = sample_rate;
    }

    fn samples_for(&mut self, duration_ms: f64, out: &mut Vec<f32>) {
        if self.broken.load(Ordering::SeqCst) {
            // Odd leftover channel value
            out.push(self.level);
            return;
        }
        let frames = (self.rate as f64 * duration_ms / 1000.0) as usize;
        for _ in 0..frames {
            out.push(self.level);
            out.push(-self.level);
        }
    }
}

fn config() -> AudioConfig {
    AudioConfig {
        block_size: 64,
        buffer_scale: 4,
        sample_rate: Some(8_000),
        prefill_blocks: 2,
        ..Default::default()
    }
}

fn pipeline(level: f32) -> (AudioPipeline<Dc, ManualDevice>, Arc<AtomicBool>) {
    let (source, broken) = Dc::new(level);
    let pipeline = AudioPipeline::new(config(), ManualBackend::new(), source).unwrap();
    (pipeline, broken)
}

/// Wait until the queue holds at least `frames`
fn wait_for_frames(pipeline: &AudioPipeline<Dc, ManualDevice>, frames: usize) {
    let start = Instant::now();
    while pipeline.remaining_frames() < frames {
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "queue never reached {} frames",
            frames
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_new_pipeline_is_stopped_and_silent() {
    let (mut pipeline, _) = pipeline(0.5);
    assert_eq!(pipeline.state(), TransportState::Stopped);
    assert!(!pipeline.running());
    assert_eq!(pipeline.sample_rate(), 8_000);
    assert_eq!(pipeline.remaining_frames(), 0);
    // Suspended device makes no callbacks
    assert!(pipeline.device_mut().pump().is_none());
}

#[test]
fn test_play_acknowledged_by_first_callback() {
    let (mut pipeline, _) = pipeline(0.5);
    pipeline.play().unwrap();
    assert_eq!(pipeline.state(), TransportState::Starting);
    assert!(pipeline.device().is_resumed());

    // Second play while starting is a no-op
    pipeline.play().unwrap();
    assert_eq!(pipeline.state(), TransportState::Starting);

    pipeline.device_mut().pump().unwrap();
    assert_eq!(pipeline.state(), TransportState::Running);
    assert!(pipeline.running());

    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), TransportState::Stopped);
    assert!(!pipeline.device().is_resumed());
}

#[test]
fn test_produced_audio_reaches_device() {
    let (mut pipeline, _) = pipeline(0.25);
    pipeline.play().unwrap();
    wait_for_frames(&pipeline, 64);

    let report = pipeline.device_mut().pump().unwrap();
    assert_eq!(report.requested, 64);
    assert_eq!(report.filled, 64);
    assert!(
        pipeline
            .device()
            .last_block()
            .iter()
            .all(|f| *f == Frame::new(0.25, -0.25))
    );
    pipeline.stop().unwrap();
}

#[test]
fn test_queue_bounded_without_consumer() {
    let (mut pipeline, _) = pipeline(0.5);
    pipeline.play().unwrap();
    // Nobody pumps: the producer keeps going and the queue must stay capped
    std::thread::sleep(Duration::from_millis(60));
    let capacity = 64 * 4;
    assert!(pipeline.remaining_frames() <= capacity);
    pipeline.stop().unwrap();

    let diag = pipeline.diagnostics();
    assert!(diag.buffered_frames <= capacity);
    assert!(diag.buffered_seconds <= capacity as f64 / 8_000.0);
}

#[test]
fn test_underrun_is_silence_not_state_change() {
    let (mut pipeline, _) = pipeline(0.5);
    pipeline.play().unwrap();
    pipeline.stop().unwrap();
    // Drain whatever the prefill left
    pipeline.device_mut().resume().unwrap();
    while pipeline.device_mut().pump().is_some_and(|r| r.filled > 0) {}

    let mut out = [Frame::new(1.0, 1.0); 16];
    let report = pipeline.device_mut().pump_into(&mut out).unwrap();
    assert_eq!(report.filled, 0);
    assert!(out.iter().all(|f| f.is_silent()));
    assert!(pipeline.diagnostics().underruns >= 1);
    assert_eq!(pipeline.state(), TransportState::Stopped);
}

#[test]
fn test_stop_while_starting_then_restart() {
    let (mut pipeline, _) = pipeline(0.5);
    pipeline.play().unwrap();
    assert_eq!(pipeline.state(), TransportState::Starting);

    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), TransportState::Stopped);

    pipeline.play().unwrap();
    assert_eq!(pipeline.state(), TransportState::Starting);
    pipeline.device_mut().pump().unwrap();
    assert_eq!(pipeline.state(), TransportState::Running);
}

#[test]
fn test_stop_keeps_queued_frames() {
    let (mut pipeline, _) = pipeline(0.5);
    pipeline.play().unwrap();
    wait_for_frames(&pipeline, 128);
    pipeline.stop().unwrap();
    assert!(pipeline.remaining_frames() >= 128);
}

#[test]
fn test_malformed_source_surfaces_through_check() {
    let (mut pipeline, broken) = pipeline(0.5);
    pipeline.play().unwrap();
    broken.store(true, Ordering::SeqCst);

    let start = Instant::now();
    let err = loop {
        if let Err(e) = pipeline.check() {
            break e;
        }
        assert!(start.elapsed() < Duration::from_secs(2), "fault never surfaced");
        std::thread::sleep(Duration::from_millis(1));
    };
    assert!(matches!(err, AudioError::MisalignedBatch { samples: 1, .. }));
    assert_eq!(pipeline.state(), TransportState::Stopped);

    // The source comes back and playback can be retried once it is fixed
    broken.store(false, Ordering::SeqCst);
    assert!(pipeline.source_mut().is_some());
    pipeline.play().unwrap();
    pipeline.stop().unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let (source, _) = Dc::new(0.5);
    let config = AudioConfig {
        buffer_scale: 0,
        prefill_blocks: 0,
        ..config()
    };
    let result = AudioPipeline::new(config, ManualBackend::new(), source);
    assert!(matches!(result, Err(AudioError::InvalidConfig(_))));
}

struct FailingBackend;

impl AudioBackend for FailingBackend {
    type Device = ManualDevice;

    fn negotiate(&mut self, config: &AudioConfig) -> Result<StreamSpec> {
        Ok(StreamSpec::from_config(config))
    }

    fn open(self, _spec: StreamSpec, _driver: OutputDriver) -> Result<ManualDevice> {
        Err(AudioError::Device("device unplugged".into()))
    }
}

#[test]
fn test_device_creation_failure_is_distinct_error() {
    let (source, _) = Dc::new(0.5);
    let result = AudioPipeline::new(config(), FailingBackend, source);
    assert!(matches!(result, Err(AudioError::Device(_))));
}

#[test]
fn test_master_volume_scales_output() {
    let (mut pipeline, _) = pipeline(0.8);
    pipeline.set_master_volume(0.5);
    pipeline.play().unwrap();
    wait_for_frames(&pipeline, 64);

    pipeline.device_mut().pump().unwrap();
    let frame = pipeline.device().last_block()[0];
    assert!((frame.left - 0.4).abs() < 1e-6);
    assert!((frame.right + 0.4).abs() < 1e-6);
    pipeline.stop().unwrap();
}

#[test]
fn test_volume_change_applies_while_playing() {
    let (mut pipeline, _) = pipeline(0.8);
    pipeline.play().unwrap();
    wait_for_frames(&pipeline, 64);
    pipeline.device_mut().pump().unwrap();
    assert!((pipeline.device().last_block()[0].left - 0.8).abs() < 1e-6);

    pipeline.set_master_volume(0.5);
    assert_eq!(pipeline.master_volume(), 0.5);

    // Older frames drain first; newly produced ones carry the new gain
    let start = Instant::now();
    loop {
        assert!(start.elapsed() < Duration::from_secs(2), "gain never changed");
        if pipeline.device_mut().pump().is_some_and(|r| r.filled > 0)
            && (pipeline.device().last_block()[0].left - 0.4).abs() < 1e-6
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(pipeline.state(), TransportState::Running);
    pipeline.stop().unwrap();
}

#[test]
fn test_play_stop_races_live_callbacks() {
    let (source, _) = Dc::new(0.5);
    // 64-frame blocks at 64kHz: the timer thread calls back every millisecond
    let config = AudioConfig {
        block_size: 64,
        buffer_scale: 4,
        sample_rate: Some(64_000),
        ..Default::default()
    };
    let mut pipeline = AudioPipeline::new(config, HeadlessBackend::new(), source).unwrap();

    for round in 0..10 {
        pipeline.play().unwrap();
        let start = Instant::now();
        while !pipeline.running() {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "round {} never confirmed",
                round
            );
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(round % 3));
        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), TransportState::Stopped);
        assert!(pipeline.remaining_frames() <= 256);
    }

    // Stop straight after play, before the device can confirm
    for _ in 0..10 {
        pipeline.play().unwrap();
        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), TransportState::Stopped);
    }

    let diag = pipeline.diagnostics();
    assert!(diag.callbacks >= 10);
    assert!(diag.frames_produced > 0);
}

/// Device that refuses to resume
struct StuckDevice {
    spec: StreamSpec,
}

impl OutputDevice for StuckDevice {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn resume(&mut self) -> Result<()> {
        Err(AudioError::Device("resume refused".into()))
    }

    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }
}

struct StuckBackend;

impl AudioBackend for StuckBackend {
    type Device = StuckDevice;

    fn negotiate(&mut self, config: &AudioConfig) -> Result<StreamSpec> {
        Ok(StreamSpec::from_config(config))
    }

    fn open(self, spec: StreamSpec, _driver: OutputDriver) -> Result<StuckDevice> {
        Ok(StuckDevice { spec })
    }
}

#[test]
fn test_resume_failure_rolls_back() {
    let (source, broken) = Dc::new(0.5);
    // A bad prefill makes the production thread fault during the rollback too
    broken.store(true, Ordering::SeqCst);
    let mut pipeline = AudioPipeline::new(config(), StuckBackend, source).unwrap();

    let err = pipeline.play().unwrap_err();
    assert!(matches!(err, AudioError::Device(_)));
    assert_eq!(pipeline.state(), TransportState::Stopped);
    // Producer is parked again, so playback can be retried
    assert!(pipeline.source_mut().is_some());
    assert!(pipeline.stop().is_ok());
}
