//! Audio configuration (`<config dir>/audio.toml`)
//!
//! Every field has a default, so a partial or missing file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clock::DEFAULT_PACING_WINDOW;
use crate::error::{AudioError, Result};

/// Sample rate used when neither the config nor the device specify one
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Frames per device callback (default: 1024)
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    /// Device blocks of slack the queue holds before dropping old audio (default: 4)
    #[serde(default = "default_buffer_scale")]
    pub buffer_scale: u32,
    /// Requested device sample rate; `None` uses the device default
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Callback deltas averaged by the pacing estimate (default: 64)
    #[serde(default = "default_pacing_window")]
    pub pacing_window: usize,
    /// Blocks generated up front when playback starts (default: 1)
    #[serde(default = "default_prefill_blocks")]
    pub prefill_blocks: u32,
    /// Gain applied to engine output (default: 1.0, range: 0.0-1.0)
    #[serde(default = "default_volume")]
    pub master_volume: f32,
}

fn default_block_size() -> u32 {
    1024
}
fn default_buffer_scale() -> u32 {
    4
}
fn default_pacing_window() -> usize {
    DEFAULT_PACING_WINDOW
}
fn default_prefill_blocks() -> u32 {
    1
}
fn default_volume() -> f32 {
    1.0
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            buffer_scale: default_buffer_scale(),
            sample_rate: None,
            pacing_window: default_pacing_window(),
            prefill_blocks: default_prefill_blocks(),
            master_volume: default_volume(),
        }
    }
}

impl AudioConfig {
    /// Check every value is in range
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(AudioError::InvalidConfig("block_size must be at least 1".into()));
        }
        if self.buffer_scale == 0 {
            return Err(AudioError::InvalidConfig("buffer_scale must be at least 1".into()));
        }
        if self.sample_rate == Some(0) {
            return Err(AudioError::InvalidConfig("sample_rate must be positive".into()));
        }
        if self.pacing_window == 0 {
            return Err(AudioError::InvalidConfig("pacing_window must be at least 1".into()));
        }
        if self.prefill_blocks > self.buffer_scale {
            return Err(AudioError::InvalidConfig(format!(
                "prefill_blocks ({}) exceeds buffer_scale ({})",
                self.prefill_blocks, self.buffer_scale
            )));
        }
        if !(0.0..=1.0).contains(&self.master_volume) {
            return Err(AudioError::InvalidConfig(format!(
                "master_volume {} outside 0.0-1.0",
                self.master_volume
            )));
        }
        Ok(())
    }

    /// Queue capacity for a stream with `block_size` frames per callback
    pub fn capacity_frames(&self, block_size: u32) -> usize {
        block_size as usize * self.buffer_scale as usize
    }

    /// Frames to generate before the first callback
    pub fn prefill_frames(&self, block_size: u32) -> usize {
        block_size as usize * self.prefill_blocks as usize
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\emu-audio\config`
/// On macOS: `~/Library/Application Support/io.emu-audio.emu-audio`
/// On Linux: `~/.config/emu-audio`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.emu-audio", "", "emu-audio")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Reads `audio.toml` from the platform's configuration directory.
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> AudioConfig {
    config_dir()
        .and_then(|dir| load_from(&dir.join("audio.toml")).ok())
        .unwrap_or_default()
}

/// Loads the configuration from a specific file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_from(path: &Path) -> Result<AudioConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| AudioError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| AudioError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves the configuration to disk.
///
/// Writes `audio.toml` to the platform's configuration directory,
/// creating the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file
/// cannot be written.
pub fn save(config: &AudioConfig) -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        save_to(config, &dir.join("audio.toml"))?;
    }
    Ok(())
}

/// Saves the configuration to a specific file.
pub fn save_to(config: &AudioConfig, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(path, content)
}
