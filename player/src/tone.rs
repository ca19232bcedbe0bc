//! Pulse-wave arpeggio standing in for an emulated sound chip

use emu_audio::SampleSource;

/// Semitone offsets cycled through by the arpeggio
const ARPEGGIO: [i32; 4] = [0, 4, 7, 12];

/// Square/pulse oscillator stepping through a major arpeggio
///
/// Left and right use slightly different duty cycles so the stereo path is
/// audible.
pub struct PulseTone {
    base_hz: f64,
    amplitude: f32,
    note_ms: f64,
    sample_rate: u32,
    phase: f64,
    elapsed_ms: f64,
}

impl PulseTone {
    pub fn new(base_hz: f64, amplitude: f32) -> Self {
        Self {
            base_hz,
            amplitude: amplitude.clamp(0.0, 1.0),
            note_ms: 125.0,
            sample_rate: 0,
            phase: 0.0,
            elapsed_ms: 0.0,
        }
    }

    /// Frequency of the note currently sounding
    pub fn current_hz(&self) -> f64 {
        let step = (self.elapsed_ms / self.note_ms) as usize % ARPEGGIO.len();
        self.base_hz * 2f64.powf(ARPEGGIO[step] as f64 / 12.0)
    }

    fn pulse(&self, duty: f64) -> f32 {
        if self.phase < duty {
            self.amplitude
        } else {
            -self.amplitude
        }
    }
}

impl SampleSource for PulseTone {
    fn configure(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    fn samples_for(&mut self, duration_ms: f64, out: &mut Vec<f32>) {
        if self.sample_rate == 0 || duration_ms <= 0.0 {
            return;
        }
        let rate = self.sample_rate as f64;
        let frames = (rate * duration_ms / 1000.0) as usize;
        let frame_ms = 1000.0 / rate;

        out.reserve(frames * 2);
        for _ in 0..frames {
            out.push(self.pulse(0.5));
            out.push(self.pulse(0.25));
            self.phase = (self.phase + self.current_hz() / rate).fract();
            self.elapsed_ms += frame_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_until_configured() {
        let mut tone = PulseTone::new(440.0, 0.5);
        let mut out = Vec::new();
        tone.samples_for(10.0, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_produces_duration_worth_of_frames() {
        let mut tone = PulseTone::new(440.0, 0.5);
        tone.configure(48_000);
        let mut out = Vec::new();
        tone.samples_for(15.0, &mut out);
        assert_eq!(out.len(), 720 * 2);
        assert!(out.iter().all(|s| s.abs() == 0.5));
    }

    #[test]
    fn test_duty_cycles_differ_per_channel() {
        let mut tone = PulseTone::new(64.0, 1.0);
        tone.configure(1024);
        let mut out = Vec::new();
        // One full 16-frame period
        tone.samples_for(15.625, &mut out);
        assert_eq!(out.len(), 32);
        let high = |channel: usize| {
            out.iter()
                .skip(channel)
                .step_by(2)
                .filter(|s| **s > 0.0)
                .count()
        };
        assert_eq!(high(0), 8);
        assert_eq!(high(1), 4);
    }

    #[test]
    fn test_arpeggio_advances() {
        let mut tone = PulseTone::new(220.0, 0.5);
        tone.configure(1_000);
        assert_eq!(tone.current_hz(), 220.0);

        let mut out = Vec::new();
        tone.samples_for(375.0, &mut out);
        // Fourth note is an octave up
        assert!((tone.current_hz() - 440.0).abs() < 1e-9);
    }
}
