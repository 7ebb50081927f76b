use crate::error::ConfigError;
use crate::pcm::SAMPLE_BYTES;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How much silence an open turn keeps after the last speech frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingSilence {
    /// Every silent frame of an open turn is kept.
    #[default]
    KeepAll,
    /// Keep at most this much silence after the last speech frame.
    Budget(#[serde(with = "duration_ms")] Duration),
}

/// What to do with frames whose length differs from `frame_bytes()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameLengthPolicy {
    /// Zero-pad short frames and truncate long ones.
    #[default]
    Pad,
    /// Fail the frame with `PipelineError::FrameLength`.
    Reject,
    /// Classify the frame as silence without running denoise or VAD.
    Silence,
}

/// Clock used to stamp stream frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Monotonic time since the stream started, taken when the frame arrives.
    #[default]
    Arrival,
    /// Position in the audio, derived from the samples consumed so far.
    Media,
}

/// Pipeline configuration. Durations (de)serialize as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in one frame.
    pub frame_size: usize,
    pub vad_model: String,
    pub vad_threshold: f32,
    #[serde(with = "duration_ms")]
    pub silence_duration: Duration,
    #[serde(with = "duration_ms")]
    pub min_speech_duration: Duration,
    #[serde(with = "duration_ms")]
    pub max_speech_duration: Duration,
    pub enable_denoise: bool,
    pub denoise_model: String,
    pub trailing_silence: TrailingSilence,
    pub frame_length_policy: FrameLengthPolicy,
    pub timestamp_mode: TimestampMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_size: 512,
            vad_model: "energy".to_string(),
            vad_threshold: 0.5,
            silence_duration: Duration::from_millis(500),
            min_speech_duration: Duration::from_millis(100),
            max_speech_duration: Duration::from_secs(30),
            enable_denoise: true,
            denoise_model: "rnnoise".to_string(),
            trailing_silence: TrailingSilence::default(),
            frame_length_policy: FrameLengthPolicy::default(),
            timestamp_mode: TimestampMode::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn with_vad_model(mut self, model: impl Into<String>) -> Self {
        self.vad_model = model.into();
        self
    }

    pub fn with_vad_threshold(mut self, threshold: f32) -> Self {
        self.vad_threshold = threshold;
        self
    }

    pub fn with_silence_duration(mut self, duration: Duration) -> Self {
        self.silence_duration = duration;
        self
    }

    pub fn with_min_speech_duration(mut self, duration: Duration) -> Self {
        self.min_speech_duration = duration;
        self
    }

    pub fn with_max_speech_duration(mut self, duration: Duration) -> Self {
        self.max_speech_duration = duration;
        self
    }

    pub fn with_denoise(mut self, enabled: bool) -> Self {
        self.enable_denoise = enabled;
        self
    }

    pub fn with_denoise_model(mut self, model: impl Into<String>) -> Self {
        self.denoise_model = model.into();
        self
    }

    pub fn with_trailing_silence(mut self, policy: TrailingSilence) -> Self {
        self.trailing_silence = policy;
        self
    }

    pub fn with_frame_length_policy(mut self, policy: FrameLengthPolicy) -> Self {
        self.frame_length_policy = policy;
        self
    }

    pub fn with_timestamp_mode(mut self, mode: TimestampMode) -> Self {
        self.timestamp_mode = mode;
        self
    }

    /// Expected byte length of one frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_size * self.channels as usize * SAMPLE_BYTES
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * SAMPLE_BYTES
    }

    /// Playback duration of one full frame.
    pub fn frame_duration(&self) -> Duration {
        samples_to_duration(self.frame_size as u64, self.sample_rate)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::new("sample_rate", "must be greater than zero"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(ConfigError::new(
                "channels",
                format!("must be 1 or 2, got {}", self.channels),
            ));
        }
        if self.frame_size == 0 {
            return Err(ConfigError::new("frame_size", "must be greater than zero"));
        }
        if !(self.vad_threshold.is_finite() && (0.0..=1.0).contains(&self.vad_threshold)) {
            return Err(ConfigError::new(
                "vad_threshold",
                format!("must be within [0, 1], got {}", self.vad_threshold),
            ));
        }
        Ok(())
    }
}

pub(crate) fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = sample_rate as u64;
    Duration::from_secs(samples / rate) + Duration::from_nanos((samples % rate) * 1_000_000_000 / rate)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
