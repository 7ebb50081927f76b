//! Turn-boundary state machine.
//!
//! The detector is driven one `(frame, decision)` pair at a time and uses the decision's
//! timestamp as its clock. A turn opens on the first speech frame and closes when either
//! enough silence has followed enough speech, or the turn has run for the maximum length.

use crate::config::{PipelineConfig, TrailingSilence};
use crate::types::{TurnEndReason, TurnEvent, VadDecision};
use bytes::Bytes;
use std::time::Duration;

/// Mutable per-stream state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionState {
    speaking: bool,
    speech_start: Option<Duration>,
    silence_start: Option<Duration>,
    buffer: Vec<u8>,
    trailing_silence_bytes: usize,
}

impl SessionState {
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn speech_start(&self) -> Option<Duration> {
        self.speech_start
    }

    pub fn silence_start(&self) -> Option<Duration> {
        self.silence_start
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&mut self) {
        self.speaking = false;
        self.speech_start = None;
        self.silence_start = None;
        self.buffer.clear();
        self.trailing_silence_bytes = 0;
    }
}

/// What a single frame did to the state machine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    /// The frame opened a new turn.
    pub speech_started: bool,
    /// The frame closed a turn.
    pub turn: Option<TurnEvent>,
}

#[derive(Debug, Clone)]
pub struct TurnDetector {
    silence_duration: Duration,
    min_speech_duration: Duration,
    max_speech_duration: Duration,
    /// Cap on silence bytes kept after the last speech frame. `None` keeps everything.
    trailing_budget: Option<usize>,
    state: SessionState,
}

impl TurnDetector {
    pub fn new(config: &PipelineConfig) -> Self {
        let trailing_budget = match config.trailing_silence {
            TrailingSilence::KeepAll => None,
            TrailingSilence::Budget(budget) => {
                let bytes = budget.as_nanos() * config.bytes_per_second() as u128 / 1_000_000_000;
                Some(usize::try_from(bytes).unwrap_or(usize::MAX))
            }
        };
        Self {
            silence_duration: config.silence_duration,
            min_speech_duration: config.min_speech_duration,
            max_speech_duration: config.max_speech_duration,
            trailing_budget,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state.speaking
    }

    pub fn buffered_bytes(&self) -> usize {
        self.state.buffer.len()
    }

    pub fn reset(&mut self) {
        self.state.clear();
    }

    /// Feed one classified frame.
    pub fn push(&mut self, frame: &[u8], decision: &VadDecision) -> FrameOutcome {
        let now = decision.timestamp;
        let mut outcome = FrameOutcome::default();

        if decision.is_speech {
            if !self.state.speaking {
                self.state.clear();
                self.state.speaking = true;
                self.state.speech_start = Some(now);
                outcome.speech_started = true;
            }
            self.state.buffer.extend_from_slice(frame);
            self.state.silence_start = Some(now);
            self.state.trailing_silence_bytes = 0;

            if self.speech_elapsed(now) >= self.max_speech_duration {
                outcome.turn = self.finish(now, TurnEndReason::MaxLength);
            }
            return outcome;
        }

        if !self.state.speaking {
            return outcome;
        }

        self.retain_silence(frame);

        let speech_elapsed = self.speech_elapsed(now);
        let silence_elapsed = now.saturating_sub(self.state.silence_start.unwrap_or(now));
        if speech_elapsed >= self.max_speech_duration {
            outcome.turn = self.finish(now, TurnEndReason::MaxLength);
        } else if silence_elapsed >= self.silence_duration
            && speech_elapsed >= self.min_speech_duration
        {
            outcome.turn = self.finish(now, TurnEndReason::Silence);
        }
        outcome
    }

    /// Close an open turn at `now`, e.g. on end of input.
    pub fn flush(&mut self, now: Duration) -> Option<TurnEvent> {
        if !self.state.speaking || self.state.buffer.is_empty() {
            self.state.clear();
            return None;
        }
        self.finish(now, TurnEndReason::Silence)
    }

    fn speech_elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.state.speech_start.unwrap_or(now))
    }

    fn retain_silence(&mut self, frame: &[u8]) {
        if let Some(budget) = self.trailing_budget {
            let retained = self.state.trailing_silence_bytes + frame.len();
            if retained > budget {
                return;
            }
            self.state.trailing_silence_bytes = retained;
        }
        self.state.buffer.extend_from_slice(frame);
    }

    fn finish(&mut self, now: Duration, reason: TurnEndReason) -> Option<TurnEvent> {
        let start = self.state.speech_start.unwrap_or(now);
        let audio = Bytes::from(std::mem::take(&mut self.state.buffer));
        self.state.clear();
        Some(TurnEvent::new(audio, start, now, reason))
    }
}
