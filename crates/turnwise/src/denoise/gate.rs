use super::{DenoiseError, DenoiseResult, Denoiser};
use crate::pcm;
use bytes::Bytes;
use std::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseGateConfig {
    /// High-pass cut-off in Hz.
    pub high_pass_cutoff: f32,
    /// Samples with magnitude below this (full scale) are zeroed.
    pub gate_threshold: f32,
}

impl NoiseGateConfig {
    pub fn with_high_pass_cutoff(mut self, hz: f32) -> Self {
        self.high_pass_cutoff = hz;
        self
    }

    pub fn with_gate_threshold(mut self, threshold: f32) -> Self {
        self.gate_threshold = threshold;
        self
    }
}

impl Default for NoiseGateConfig {
    fn default() -> Self {
        Self {
            high_pass_cutoff: 80.0,
            gate_threshold: 0.005,
        }
    }
}

/// First-order high-pass filter followed by a hard noise gate.
///
/// Each frame is filtered independently and each interleaved channel on its own, so the
/// gate carries no state between frames.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    config: NoiseGateConfig,
    sample_rate: u32,
    channels: usize,
}

impl NoiseGate {
    pub fn new(config: NoiseGateConfig, sample_rate: u32, channels: u16) -> DenoiseResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(DenoiseError::Processing(format!(
                "invalid format: {sample_rate} Hz, {channels} channels"
            )));
        }
        if !(config.high_pass_cutoff.is_finite() && config.high_pass_cutoff > 0.0) {
            return Err(DenoiseError::Processing(format!(
                "high-pass cut-off must be positive, got {}",
                config.high_pass_cutoff
            )));
        }
        Ok(Self {
            config,
            sample_rate,
            channels: channels as usize,
        })
    }

    pub fn config(&self) -> NoiseGateConfig {
        self.config
    }

    fn alpha(&self) -> f32 {
        let rc = 1.0 / (2.0 * PI * self.config.high_pass_cutoff);
        let dt = 1.0 / self.sample_rate as f32;
        rc / (rc + dt)
    }

    fn filter(&self, samples: &mut [f32]) {
        let alpha = self.alpha();
        for channel in 0..self.channels {
            let mut prev_input = 0.0f32;
            let mut prev_output = 0.0f32;
            for sample in samples.iter_mut().skip(channel).step_by(self.channels) {
                let input = *sample;
                let output = alpha * (prev_output + input - prev_input);
                prev_input = input;
                prev_output = output;
                *sample = if output.abs() < self.config.gate_threshold {
                    0.0
                } else {
                    output
                };
            }
        }
    }
}

impl Denoiser for NoiseGate {
    fn name(&self) -> &str {
        "gate"
    }

    fn process(&self, frame: &Bytes) -> DenoiseResult<Bytes> {
        let mut samples = pcm::to_f32(frame);
        self.filter(&mut samples);

        let mut output = pcm::from_f32(&samples);
        // A dangling odd byte is carried over untouched.
        if frame.len() % pcm::SAMPLE_BYTES == 1 {
            output.push(frame[frame.len() - 1]);
        }
        Ok(Bytes::from(output))
    }
}
