//! Measurement taxonomy and the recorder port the pipeline reports through.
//!
//! The pipeline never takes its session lock to record a measurement; recorders are
//! expected to be cheap and thread-safe (atomics or backend instruments).

use crate::types::TurnEndReason;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Processing stage a latency or error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Frame-length validation before any processing.
    Input,
    Denoise,
    Vad,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Denoise => "denoise",
            Stage::Vad => "vad",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for pipeline measurements.
pub trait MetricsRecorder: Send + Sync {
    fn record_stage_latency(&self, stage: Stage, elapsed: Duration);
    fn record_vad_decision(&self, is_speech: bool);
    /// Called once per speech onset.
    fn record_speech_segment(&self);
    fn record_turn(&self, duration: Duration, reason: TurnEndReason);
    fn record_stage_error(&self, stage: Stage);
}

/// Recorder that drops every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_stage_latency(&self, _stage: Stage, _elapsed: Duration) {}
    fn record_vad_decision(&self, _is_speech: bool) {}
    fn record_speech_segment(&self) {}
    fn record_turn(&self, _duration: Duration, _reason: TurnEndReason) {}
    fn record_stage_error(&self, _stage: Stage) {}
}

/// Point-in-time copy of [`RecordingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub vad_calls: u64,
    pub vad_latency: Duration,
    pub denoise_calls: u64,
    pub denoise_latency: Duration,
    pub speech_decisions: u64,
    pub silence_decisions: u64,
    pub speech_segments: u64,
    pub turns_silence: u64,
    pub turns_max_length: u64,
    pub turns_interrupt: u64,
    pub turn_duration: Duration,
    pub input_errors: u64,
    pub denoise_errors: u64,
    pub vad_errors: u64,
}

impl MetricsSnapshot {
    pub fn turns(&self) -> u64 {
        self.turns_silence + self.turns_max_length + self.turns_interrupt
    }

    pub fn errors(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Input => self.input_errors,
            Stage::Denoise => self.denoise_errors,
            Stage::Vad => self.vad_errors,
        }
    }
}

/// In-process recorder backed by atomic counters.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    vad_calls: AtomicU64,
    vad_latency_nanos: AtomicU64,
    denoise_calls: AtomicU64,
    denoise_latency_nanos: AtomicU64,
    speech_decisions: AtomicU64,
    silence_decisions: AtomicU64,
    speech_segments: AtomicU64,
    turns_silence: AtomicU64,
    turns_max_length: AtomicU64,
    turns_interrupt: AtomicU64,
    turn_duration_nanos: AtomicU64,
    input_errors: AtomicU64,
    denoise_errors: AtomicU64,
    vad_errors: AtomicU64,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            vad_calls: self.vad_calls.load(Ordering::Relaxed),
            vad_latency: Duration::from_nanos(self.vad_latency_nanos.load(Ordering::Relaxed)),
            denoise_calls: self.denoise_calls.load(Ordering::Relaxed),
            denoise_latency: Duration::from_nanos(
                self.denoise_latency_nanos.load(Ordering::Relaxed),
            ),
            speech_decisions: self.speech_decisions.load(Ordering::Relaxed),
            silence_decisions: self.silence_decisions.load(Ordering::Relaxed),
            speech_segments: self.speech_segments.load(Ordering::Relaxed),
            turns_silence: self.turns_silence.load(Ordering::Relaxed),
            turns_max_length: self.turns_max_length.load(Ordering::Relaxed),
            turns_interrupt: self.turns_interrupt.load(Ordering::Relaxed),
            turn_duration: Duration::from_nanos(self.turn_duration_nanos.load(Ordering::Relaxed)),
            input_errors: self.input_errors.load(Ordering::Relaxed),
            denoise_errors: self.denoise_errors.load(Ordering::Relaxed),
            vad_errors: self.vad_errors.load(Ordering::Relaxed),
        }
    }
}

fn nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

impl MetricsRecorder for RecordingMetrics {
    fn record_stage_latency(&self, stage: Stage, elapsed: Duration) {
        let (calls, total) = match stage {
            Stage::Vad => (&self.vad_calls, &self.vad_latency_nanos),
            Stage::Denoise => (&self.denoise_calls, &self.denoise_latency_nanos),
            Stage::Input => return,
        };
        calls.fetch_add(1, Ordering::Relaxed);
        total.fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    fn record_vad_decision(&self, is_speech: bool) {
        let counter = if is_speech {
            &self.speech_decisions
        } else {
            &self.silence_decisions
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_speech_segment(&self) {
        self.speech_segments.fetch_add(1, Ordering::Relaxed);
    }

    fn record_turn(&self, duration: Duration, reason: TurnEndReason) {
        let counter = match reason {
            TurnEndReason::Silence => &self.turns_silence,
            TurnEndReason::MaxLength => &self.turns_max_length,
            TurnEndReason::Interrupt => &self.turns_interrupt,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.turn_duration_nanos
            .fetch_add(nanos(duration), Ordering::Relaxed);
    }

    fn record_stage_error(&self, stage: Stage) {
        let counter = match stage {
            Stage::Input => &self.input_errors,
            Stage::Denoise => &self.denoise_errors,
            Stage::Vad => &self.vad_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
