//! Stereo frame type and engine batch validation

use crate::error::{AudioError, Result};

/// Channels per frame (left, right)
pub const CHANNELS: u16 = 2;

/// One sample per channel at a single instant
///
/// Amplitudes are normalized to [-1.0, 1.0].
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Frame {
    /// Left channel amplitude
    pub left: f32,
    /// Right channel amplitude
    pub right: f32,
}

impl Frame {
    /// Zero amplitude on both channels
    pub const SILENCE: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    /// Create a frame from a left/right pair
    #[inline]
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Same amplitude on both channels
    #[inline]
    pub const fn mono(value: f32) -> Self {
        Self::new(value, value)
    }

    /// Scale both channels by `gain`
    #[inline]
    pub fn scaled(self, gain: f32) -> Self {
        Self::new(self.left * gain, self.right * gain)
    }

    /// Whether both channels are exactly zero
    #[inline]
    pub fn is_silent(self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

impl From<(f32, f32)> for Frame {
    fn from((left, right): (f32, f32)) -> Self {
        Self::new(left, right)
    }
}

/// Convert an interleaved engine batch into frames, appending to `out`
///
/// The batch must be stereo, a whole number of frames long, and finite.
/// Finite samples outside [-1.0, 1.0] are clamped. On error nothing is
/// appended, so a half-converted batch is never observable.
pub fn frames_from_interleaved(
    samples: &[f32],
    channels: u16,
    out: &mut Vec<Frame>,
) -> Result<()> {
    if channels != CHANNELS {
        return Err(AudioError::ChannelCount {
            expected: CHANNELS,
            actual: channels,
        });
    }
    if samples.len() % CHANNELS as usize != 0 {
        return Err(AudioError::MisalignedBatch {
            samples: samples.len(),
            channels,
        });
    }
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(AudioError::NonFiniteSample { index });
    }

    out.reserve(samples.len() / 2);
    out.extend(
        samples
            .chunks_exact(2)
            .map(|pair| Frame::new(pair[0].clamp(-1.0, 1.0), pair[1].clamp(-1.0, 1.0))),
    );
    Ok(())
}
