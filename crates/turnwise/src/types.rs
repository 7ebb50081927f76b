use crate::pcm;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// One fixed-size chunk of interleaved signed 16-bit little-endian PCM.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn from_samples(samples: &[i16]) -> Self {
        Self::new(pcm::from_i16(samples))
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Vec<u8>> for AudioFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for AudioFrame {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

/// Classification of a single frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VadDecision {
    pub is_speech: bool,
    /// Speech probability in `[0, 1]`.
    pub probability: f32,
    /// Monotonic offset from the pipeline or stream epoch.
    pub timestamp: Duration,
}

impl VadDecision {
    pub fn new(probability: f32, threshold: f32, timestamp: Duration) -> Self {
        Self {
            is_speech: probability >= threshold,
            probability,
            timestamp,
        }
    }

    pub fn silence(timestamp: Duration) -> Self {
        Self {
            is_speech: false,
            probability: 0.0,
            timestamp,
        }
    }
}

/// Why a turn ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEndReason {
    /// The user stopped speaking.
    Silence,
    /// The turn hit the configured maximum duration.
    MaxLength,
    /// Reserved for barge-in handling by the orchestration layer.
    Interrupt,
}

impl TurnEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Silence => "silence",
            Self::MaxLength => "max_length",
            Self::Interrupt => "interrupt",
        }
    }
}

impl fmt::Display for TurnEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed user turn. The audio is owned by the event; nothing in the pipeline keeps a
/// reference to it after emission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnEvent {
    pub audio: Bytes,
    pub start: Duration,
    pub end: Duration,
    pub duration: Duration,
    pub reason: TurnEndReason,
}

impl TurnEvent {
    pub fn new(audio: Bytes, start: Duration, end: Duration, reason: TurnEndReason) -> Self {
        Self {
            audio,
            start,
            end,
            duration: end.saturating_sub(start),
            reason,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TurnEventWire {
    audio: String,
    start_ms: u64,
    end_ms: u64,
    duration_ms: u64,
    reason: TurnEndReason,
}

impl Serialize for TurnEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Audio travels as base64 so events can go over JSON transports.
        TurnEventWire {
            audio: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &self.audio),
            start_ms: self.start.as_millis() as u64,
            end_ms: self.end.as_millis() as u64,
            duration_ms: self.duration.as_millis() as u64,
            reason: self.reason,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TurnEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = TurnEventWire::deserialize(deserializer)?;
        let audio = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &wire.audio)
            .map_err(serde::de::Error::custom)?;

        Ok(TurnEvent::new(
            Bytes::from(audio),
            Duration::from_millis(wire.start_ms),
            Duration::from_millis(wire.end_ms),
            wire.reason,
        ))
    }
}
