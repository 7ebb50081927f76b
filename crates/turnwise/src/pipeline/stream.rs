use super::Pipeline;
use super::context::StreamContext;
use super::guard::StreamGuard;
use crate::config::{FrameLengthPolicy, PipelineConfig, TimestampMode, samples_to_duration};
use crate::error::{PipelineError, PipelineResult};
use crate::pcm::SAMPLE_BYTES;
use crate::types::{AudioFrame, TurnEvent};
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{Instrument, field};

/// Stamps stream frames according to the configured [`TimestampMode`].
struct StreamClock {
    mode: TimestampMode,
    started: Instant,
    sample_rate: u32,
    /// Per-channel samples consumed so far.
    samples: u64,
    /// Samples a frame advances the media clock by, when frames are normalized.
    fixed_advance: Option<u64>,
    bytes_per_sample: usize,
}

impl StreamClock {
    fn new(config: &PipelineConfig) -> Self {
        // Pad and Silence both buffer exactly one configured frame per input frame.
        let fixed_advance = (config.frame_length_policy != FrameLengthPolicy::Reject)
            .then_some(config.frame_size as u64);
        Self {
            mode: config.timestamp_mode,
            started: Instant::now(),
            sample_rate: config.sample_rate,
            samples: 0,
            fixed_advance,
            bytes_per_sample: config.channels as usize * SAMPLE_BYTES,
        }
    }

    fn stamp(&mut self, frame: &AudioFrame) -> Duration {
        let timestamp = match self.mode {
            TimestampMode::Arrival => self.started.elapsed(),
            TimestampMode::Media => samples_to_duration(self.samples, self.sample_rate),
        };
        let advance = self
            .fixed_advance
            .unwrap_or((frame.len() / self.bytes_per_sample) as u64);
        self.samples += advance;
        timestamp
    }

    /// Time to close a turn that is still open when input ends.
    fn end(&self) -> Duration {
        match self.mode {
            TimestampMode::Arrival => self.started.elapsed(),
            TimestampMode::Media => samples_to_duration(self.samples, self.sample_rate),
        }
    }
}

/// Counters reported on the stream span.
#[derive(Debug, Default)]
struct StreamStats {
    frames: u64,
    turns: u64,
}

impl Pipeline {
    /// Run turn detection over `frames`, sending each completed turn to `turns`.
    ///
    /// Frames are handled strictly in order. A frame that fails denoise or VAD is logged and
    /// skipped. When `frames` ends, an open turn is flushed with
    /// [`TurnEndReason::Silence`](crate::TurnEndReason::Silence) and `Ok(())` is returned.
    /// Cancelling `ctx` stops the loop without flushing. Sending waits for channel
    /// capacity; turns are never dropped.
    pub async fn process_stream<S>(
        &self,
        ctx: &StreamContext,
        frames: S,
        turns: mpsc::Sender<TurnEvent>,
    ) -> PipelineResult<()>
    where
        S: Stream<Item = AudioFrame>,
    {
        self.ensure_open()?;
        let _guard = StreamGuard::acquire(&self.streaming).ok_or(PipelineError::Concurrency)?;

        self.write_session().reset();
        info!(
            "Audio stream started (vad={}, denoiser={})",
            self.vad.name(),
            self.denoiser.name()
        );

        let span = tracing::info_span!(
            "pipeline.process_stream",
            vad = self.vad.name(),
            denoiser = self.denoiser.name(),
            sample_rate = self.config.sample_rate,
            frames = field::Empty,
            turns = field::Empty,
        );
        let mut stats = StreamStats::default();
        let result = self
            .run_stream(ctx, frames, &turns, &mut stats)
            .instrument(span.clone())
            .await;
        span.record("frames", stats.frames);
        span.record("turns", stats.turns);

        self.write_session().reset();
        match &result {
            Ok(()) => info!("Audio stream finished: input ended"),
            Err(err) => info!("Audio stream stopped: {err}"),
        }
        result
    }

    async fn run_stream<S>(
        &self,
        ctx: &StreamContext,
        frames: S,
        turns: &mpsc::Sender<TurnEvent>,
        stats: &mut StreamStats,
    ) -> PipelineResult<()>
    where
        S: Stream<Item = AudioFrame>,
    {
        let mut frames = std::pin::pin!(frames);
        let mut clock = StreamClock::new(&self.config);
        // Recurrent detector state lives here, never shared with `process_frame`.
        let mut vad = self.vad.session();

        loop {
            let next = tokio::select! {
                biased;
                cause = ctx.done() => return Err(cause),
                frame = frames.next() => frame,
            };
            let Some(frame) = next else {
                break;
            };
            self.ensure_open()?;
            stats.frames += 1;

            let timestamp = clock.stamp(&frame);
            let classified = match self.classify(&frame, timestamp, |audio| vad.detect(audio)) {
                Ok(classified) => classified,
                Err(err) => {
                    warn!("Skipping frame at {timestamp:?}: {err}");
                    continue;
                }
            };

            let outcome = self
                .write_session()
                .push(&classified.audio, &classified.decision);
            if outcome.speech_started {
                tracing::info_span!(
                    "turn.speech_started",
                    timestamp_ms = timestamp.as_millis() as u64,
                    probability = classified.decision.probability,
                )
                .in_scope(|| {
                    debug!(
                        "Speech started at {timestamp:?} (probability {:.2})",
                        classified.decision.probability
                    )
                });
                self.metrics.record_speech_segment();
            }
            if let Some(turn) = outcome.turn {
                self.emit(ctx, turns, turn).await?;
                stats.turns += 1;
            }
        }

        let flushed = self.write_session().flush(clock.end());
        if let Some(turn) = flushed {
            self.emit(ctx, turns, turn).await?;
            stats.turns += 1;
        }
        Ok(())
    }

    async fn emit(
        &self,
        ctx: &StreamContext,
        turns: &mpsc::Sender<TurnEvent>,
        turn: TurnEvent,
    ) -> PipelineResult<()> {
        let (duration, reason) = (turn.duration, turn.reason);
        debug!(
            "Turn ended ({reason}): {:?}, {} bytes",
            duration,
            turn.audio.len()
        );

        tokio::select! {
            biased;
            cause = ctx.done() => return Err(cause),
            sent = turns.send(turn) => sent.map_err(|_| PipelineError::TurnSinkClosed)?,
        }
        self.metrics.record_turn(duration, reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_timestamp_mode(TimestampMode::Media)
    }

    #[test]
    fn media_clock_advances_by_frame_size_when_normalizing() {
        let config = config().with_frame_length_policy(FrameLengthPolicy::Silence);
        let mut clock = StreamClock::new(&config);
        clock.stamp(&AudioFrame::new(vec![0u8; 101]));
        assert_eq!(clock.end(), Duration::from_millis(32));
    }

    #[test]
    fn media_clock_advances_by_frame_size_when_padding() {
        let mut clock = StreamClock::new(&config());
        assert_eq!(clock.stamp(&AudioFrame::new(vec![0u8; 10])), Duration::ZERO);
        assert_eq!(
            clock.stamp(&AudioFrame::new(vec![0u8; 1024])),
            Duration::from_millis(32)
        );
        assert_eq!(clock.end(), Duration::from_millis(64));
    }

    #[test]
    fn media_clock_counts_received_samples_when_rejecting() {
        let config = config()
            .with_channels(2)
            .with_frame_length_policy(FrameLengthPolicy::Reject);
        let mut clock = StreamClock::new(&config);
        // 160 stereo samples: 10 ms at 16 kHz.
        clock.stamp(&AudioFrame::new(vec![0u8; 640]));
        assert_eq!(clock.end(), Duration::from_millis(10));
    }
}
