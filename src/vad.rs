//! Energy-based voice activity detection
//!
//! Classifies a single frame as speech or silence by comparing its mean
//! absolute amplitude against a threshold. The threshold is a tunable
//! parameter because microphone sensitivity varies between setups.

use crate::audio::AudioFrame;
use tracing::trace;

/// Configuration for the energy detector
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Mean absolute amplitude above which a frame counts as speech
    /// (default: 500.0, tuned for signed 16-bit input)
    pub silence_threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 500.0,
        }
    }
}

/// Stateless speech/silence classifier over i16 PCM frames.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            threshold: config.silence_threshold,
        }
    }

    /// Whether the frame contains speech. Pure function of the samples.
    pub fn is_speech(&self, frame: &AudioFrame) -> bool {
        let energy = mean_abs_amplitude(&frame.samples);
        let speech = energy > self.threshold;
        trace!(energy, speech, "frame classified");
        speech
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// Mean absolute sample amplitude of a frame.
fn mean_abs_amplitude(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|&s| (s as i32).unsigned_abs() as u64).sum();
    sum as f32 / samples.len() as f32
}
