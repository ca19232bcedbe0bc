//! emu-audio player
//!
//! Streams a generated pulse-wave arpeggio through an emu-audio pipeline,
//! driven by a 60Hz loop the way an emulator front end would drive it.
//!
//! # Usage
//!
//! ```bash
//! emu-audio-player
//! emu-audio-player --seconds 10 --block-size 512
//! emu-audio-player --headless --seconds 3
//! RUST_LOG=emu_audio=debug emu-audio-player
//! ```

mod tone;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use emu_audio::{
    AudioBackend, AudioConfig, AudioPipeline, CpalBackend, HeadlessBackend, OutputDevice,
};

use crate::tone::PulseTone;

/// Emulated frame period of the driving loop
const FRAME: Duration = Duration::from_micros(16_667);

#[derive(Parser)]
#[command(name = "emu-audio-player")]
#[command(author, version, about = "Play a test tune through an emu-audio stream")]
struct Args {
    /// Audio config file (default: platform config dir audio.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Frames per device callback
    #[arg(long)]
    block_size: Option<u32>,

    /// Device blocks of slack kept in the queue
    #[arg(long)]
    buffer_scale: Option<u32>,

    /// Requested sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Master volume (0.0-1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Base note of the arpeggio in Hz
    #[arg(long, default_value = "220")]
    frequency: f64,

    /// Seconds to play before exiting
    #[arg(long, default_value = "5")]
    seconds: u64,

    /// Pause playback for a second halfway through
    #[arg(long)]
    pause: bool,

    /// Use a timer thread instead of a sound card
    #[arg(long)]
    headless: bool,

    /// Write the effective config to the platform config dir and exit
    #[arg(long)]
    save_config: bool,
}

impl Args {
    fn audio_config(&self) -> Result<AudioConfig> {
        let mut config = match &self.config {
            Some(path) => emu_audio::config::load_from(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => emu_audio::config::load(),
        };
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(buffer_scale) = self.buffer_scale {
            config.buffer_scale = buffer_scale;
        }
        if self.sample_rate.is_some() {
            config.sample_rate = self.sample_rate;
        }
        if let Some(volume) = self.volume {
            config.master_volume = volume;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.audio_config()?;

    if args.save_config {
        emu_audio::config::save(&config).context("Failed to save audio config")?;
        match emu_audio::config::config_dir() {
            Some(dir) => info!("Saved audio config to {}", dir.join("audio.toml").display()),
            None => info!("No config directory on this platform; nothing saved"),
        }
        return Ok(());
    }

    let tone = PulseTone::new(args.frequency, 0.25);
    if args.headless {
        play(config, HeadlessBackend::new(), tone, &args)
    } else {
        play(config, CpalBackend::new(), tone, &args)
    }
}

fn play<B: AudioBackend>(
    config: AudioConfig,
    backend: B,
    tone: PulseTone,
    args: &Args,
) -> Result<()> {
    let mut pipeline =
        AudioPipeline::new(config, backend, tone).context("Failed to open audio output")?;
    info!(
        "Playing {}Hz arpeggio at {}Hz for {}s",
        args.frequency,
        pipeline.sample_rate(),
        args.seconds
    );

    pipeline.play()?;

    let total = Duration::from_secs(args.seconds);
    let pause_at = total / 2;
    let mut paused_until: Option<Instant> = None;
    let mut paused_once = false;

    let start = Instant::now();
    let mut next_frame = start;
    let mut next_report = start + Duration::from_secs(1);

    while start.elapsed() < total {
        next_frame += FRAME;
        std::thread::sleep(next_frame.saturating_duration_since(Instant::now()));

        pipeline.check().context("Audio stream failed")?;

        if args.pause && !paused_once && start.elapsed() >= pause_at {
            info!("Pausing");
            pipeline.stop()?;
            paused_once = true;
            paused_until = Some(Instant::now() + Duration::from_secs(1));
        }
        if paused_until.is_some_and(|t| Instant::now() >= t) {
            info!("Resuming");
            pipeline.play()?;
            paused_until = None;
        }

        if Instant::now() >= next_report {
            next_report += Duration::from_secs(1);
            report(&pipeline);
        }
    }

    pipeline.stop()?;
    report(&pipeline);
    Ok(())
}

fn report<D: OutputDevice>(pipeline: &AudioPipeline<PulseTone, D>) {
    let diag = pipeline.diagnostics();
    info!(
        "{}: buffered {} frames ({:.1}ms), pacing {:.2}ms, underruns {}, dropped {}",
        pipeline.state(),
        diag.buffered_frames,
        diag.buffered_seconds * 1000.0,
        diag.pacing_ms,
        diag.underruns,
        diag.dropped_frames
    );
}
