use super::VadDetector;
use super::error::{VadError, VadResult};
use crate::pcm;

/// Levels (full-scale RMS) bracketing the energy-to-probability mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyVadConfig {
    /// RMS at or below which a frame scores 0.
    pub noise_floor: f32,
    /// RMS at or above which a frame scores 1.
    pub speech_level: f32,
}

impl EnergyVadConfig {
    pub fn with_noise_floor(mut self, level: f32) -> Self {
        self.noise_floor = level;
        self
    }

    pub fn with_speech_level(mut self, level: f32) -> Self {
        self.speech_level = level;
        self
    }

    pub fn validate(&self) -> VadResult<()> {
        if !(0.0..1.0).contains(&self.noise_floor) {
            return Err(VadError::InvalidInput(format!(
                "noise_floor must be in [0, 1), got {}",
                self.noise_floor
            )));
        }
        if !(self.speech_level > self.noise_floor && self.speech_level <= 1.0) {
            return Err(VadError::InvalidInput(format!(
                "speech_level must be in ({}, 1], got {}",
                self.noise_floor, self.speech_level
            )));
        }
        Ok(())
    }
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        Self {
            noise_floor: 0.005,
            speech_level: 0.1,
        }
    }
}

/// Stateless energy heuristic: frame RMS mapped linearly onto `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct EnergyVad {
    config: EnergyVadConfig,
}

impl EnergyVad {
    pub fn new(config: EnergyVadConfig) -> VadResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> EnergyVadConfig {
        self.config
    }

    fn probability(&self, rms: f32) -> f32 {
        let EnergyVadConfig {
            noise_floor,
            speech_level,
        } = self.config;
        ((rms - noise_floor) / (speech_level - noise_floor)).clamp(0.0, 1.0)
    }
}

impl VadDetector for EnergyVad {
    fn name(&self) -> &str {
        "energy"
    }

    fn detect(&self, frame: &[u8]) -> VadResult<f32> {
        Ok(self.probability(pcm::rms(frame)))
    }
}
