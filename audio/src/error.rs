//! Error types for the audio subsystem
//!
//! Underruns and overflows are not errors: they are recovered locally and
//! only show up in [`crate::Diagnostics`]. Everything here is a genuine fault
//! that stops audio until the device is re-created.

use std::path::PathBuf;

/// Errors that are fatal to the audio subsystem (but not to the process)
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// The host has no output device
    #[error("no audio output device available")]
    NoDevice,

    /// Device query, stream creation, or suspend/resume failed
    #[error("audio device error: {0}")]
    Device(String),

    /// The device only offers a sample format we cannot write
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The engine produced a batch with the wrong channel layout
    #[error("expected {expected} channels, engine produced {actual}")]
    ChannelCount {
        /// Channels the stream is configured for
        expected: u16,
        /// Channels the engine reported
        actual: u16,
    },

    /// The batch length is not a whole number of frames
    #[error("{samples} samples is not a whole number of {channels}-channel frames")]
    MisalignedBatch {
        /// Interleaved sample count of the batch
        samples: usize,
        /// Channel count the batch was split by
        channels: u16,
    },

    /// NaN or infinity in the engine output
    #[error("sample {index} of engine batch is not finite")]
    NonFiniteSample {
        /// Index into the interleaved batch
        index: usize,
    },

    /// A configuration value is out of range
    #[error("invalid audio config: {0}")]
    InvalidConfig(String),

    /// Config file could not be read
    #[error("failed to read {}: {source}", path.display())]
    ConfigRead {
        /// File that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::AudioConfig`]
    #[error("failed to parse {}: {source}", path.display())]
    ConfigParse {
        /// File that was parsed
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// An audio thread could not be started
    #[error("failed to spawn audio thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The production thread panicked instead of returning
    #[error("audio production thread panicked")]
    ProducerPanicked,
}

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;
