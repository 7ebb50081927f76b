//! Frame orchestration: denoise, classify, and (for streams) turn detection.

mod context;
mod guard;
mod stream;

pub use context::StreamContext;

use crate::config::{FrameLengthPolicy, PipelineConfig};
use crate::denoise::{self, Denoiser, NoiseGate, NoiseGateConfig, Passthrough};
use crate::error::{ConfigError, PipelineError, PipelineResult, StageError};
use crate::metrics::{MetricsRecorder, NoopMetrics, Stage};
use crate::turn::TurnDetector;
use crate::types::{AudioFrame, VadDecision};
use crate::vad::{EnergyVad, VadDetector, VadResult};
use bytes::Bytes;
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::field;

/// Audio front end for one conversation.
///
/// `process_frame` may be called from any number of threads. `process_stream` runs at most
/// once at a time per pipeline; a concurrent second call fails with
/// [`PipelineError::Concurrency`].
pub struct Pipeline {
    config: PipelineConfig,
    vad: Arc<dyn VadDetector>,
    denoiser: Arc<dyn Denoiser>,
    metrics: Arc<dyn MetricsRecorder>,
    session: RwLock<TurnDetector>,
    streaming: AtomicBool,
    closed: AtomicBool,
    epoch: Instant,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("vad", &self.vad.name())
            .field("denoiser", &self.denoiser.name())
            .field("streaming", &self.is_streaming())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    vad: Option<Arc<dyn VadDetector>>,
    denoiser: Option<Arc<dyn Denoiser>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            vad: None,
            denoiser: None,
            metrics: None,
        }
    }

    /// Use this detector instead of resolving `vad_model`.
    pub fn vad(mut self, vad: Arc<dyn VadDetector>) -> Self {
        self.vad = Some(vad);
        self
    }

    /// Use this denoiser instead of resolving `denoise_model`. Ignored when
    /// `enable_denoise` is false.
    pub fn denoiser(mut self, denoiser: Arc<dyn Denoiser>) -> Self {
        self.denoiser = Some(denoiser);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> PipelineResult<Pipeline> {
        self.config.validate()?;

        let vad = match self.vad {
            Some(vad) => vad,
            None => resolve_vad(&self.config),
        };
        let denoiser: Arc<dyn Denoiser> = if !self.config.enable_denoise {
            Arc::new(Passthrough)
        } else {
            match self.denoiser {
                Some(denoiser) => denoiser,
                None => resolve_denoiser(&self.config)?,
            }
        };
        let metrics: Arc<dyn MetricsRecorder> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(NoopMetrics),
        };

        log::debug!(
            "Built pipeline: vad={}, denoiser={}, {} Hz x{}, {} samples/frame",
            vad.name(),
            denoiser.name(),
            self.config.sample_rate,
            self.config.channels,
            self.config.frame_size
        );

        Ok(Pipeline {
            session: RwLock::new(TurnDetector::new(&self.config)),
            config: self.config,
            vad,
            denoiser,
            metrics,
            streaming: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            epoch: Instant::now(),
        })
    }
}

fn resolve_vad(config: &PipelineConfig) -> Arc<dyn VadDetector> {
    match config.vad_model.as_str() {
        "energy" => {}
        "silero" => warn!(
            "The silero detector needs a model file and must be passed to PipelineBuilder::vad; \
             using the energy detector"
        ),
        other => warn!("Unknown VAD model '{other}', using the energy detector"),
    }
    Arc::new(EnergyVad::default())
}

fn resolve_denoiser(config: &PipelineConfig) -> PipelineResult<Arc<dyn Denoiser>> {
    let gate = || -> PipelineResult<Arc<dyn Denoiser>> {
        let gate = NoiseGate::new(NoiseGateConfig::default(), config.sample_rate, config.channels)
            .map_err(|err| ConfigError::new("denoise_model", err.to_string()))?;
        Ok(Arc::new(gate))
    };
    match config.denoise_model.as_str() {
        "passthrough" | "none" => Ok(Arc::new(Passthrough)),
        "gate" => gate(),
        other => {
            warn!("Denoise model '{other}' is not built in, using the noise gate");
            gate()
        }
    }
}

/// A frame after the length policy, denoise and VAD.
pub(crate) struct Classified {
    /// Audio to buffer into an open turn.
    pub(crate) audio: Bytes,
    pub(crate) decision: VadDecision,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Pipeline with the built-in detector and denoiser resolved from `config`.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        PipelineBuilder::new(config).build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn vad_name(&self) -> &str {
        self.vad.name()
    }

    pub fn denoiser_name(&self) -> &str {
        self.denoiser.name()
    }

    /// True while a turn is open in the current stream.
    pub fn is_speaking(&self) -> bool {
        self.read_session().is_speaking()
    }

    /// Bytes buffered for the open turn.
    pub fn buffered_bytes(&self) -> usize {
        self.read_session().buffered_bytes()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Denoise and classify one frame. Touches no session state, including the recurrent
    /// state of a running stream's detector; the timestamp is the offset from pipeline
    /// creation.
    pub fn process_frame(&self, frame: &AudioFrame) -> PipelineResult<VadDecision> {
        self.ensure_open()?;
        let timestamp = self.epoch.elapsed();
        self.classify(frame, timestamp, |audio| self.vad.detect(audio))
            .map(|c| c.decision)
    }

    /// Release the detector and denoiser. Later calls are no-ops.
    pub fn close(&self) -> PipelineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut errors = Vec::new();
        if let Err(err) = self.vad.close() {
            errors.push(format!("vad: {err}"));
        }
        if let Err(err) = self.denoiser.close() {
            errors.push(format!("denoiser: {err}"));
        }
        if errors.is_empty() {
            log::info!("Pipeline closed");
            Ok(())
        } else {
            Err(PipelineError::Close(errors.join("; ")))
        }
    }

    fn ensure_open(&self) -> PipelineResult<()> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        Ok(())
    }

    /// Apply the length policy, denoise, then score with `score`.
    pub(crate) fn classify(
        &self,
        frame: &AudioFrame,
        timestamp: Duration,
        score: impl FnOnce(&[u8]) -> VadResult<f32>,
    ) -> PipelineResult<Classified> {
        let span = tracing::debug_span!(
            "pipeline.frame",
            frame_size = frame.len(),
            sample_rate = self.config.sample_rate,
            is_speech = field::Empty,
            probability = field::Empty,
            total_latency_ms = field::Empty,
        );
        let _entered = span.enter();
        let frame_started = std::time::Instant::now();

        let expected = self.config.frame_bytes();
        let received = frame.data();

        let input = if received.len() == expected {
            received.clone()
        } else {
            match self.config.frame_length_policy {
                FrameLengthPolicy::Pad => fit(received, expected),
                FrameLengthPolicy::Reject => {
                    self.metrics.record_stage_error(Stage::Input);
                    return Err(PipelineError::FrameLength {
                        expected,
                        actual: received.len(),
                    });
                }
                FrameLengthPolicy::Silence => {
                    // Buffered as a full frame of silence so the turn stays sample-aligned.
                    self.metrics.record_vad_decision(false);
                    span.record("is_speech", false);
                    return Ok(Classified {
                        audio: Bytes::from(vec![0u8; expected]),
                        decision: VadDecision::silence(timestamp),
                    });
                }
            }
        };

        let started = std::time::Instant::now();
        let clean = denoise::apply(self.denoiser.as_ref(), &input).map_err(|err| {
            self.metrics.record_stage_error(Stage::Denoise);
            StageError::denoise(err)
        })?;
        if self.config.enable_denoise {
            self.metrics
                .record_stage_latency(Stage::Denoise, started.elapsed());
        }

        let started = std::time::Instant::now();
        let probability = score(&clean).map_err(|err| {
            self.metrics.record_stage_error(Stage::Vad);
            StageError::vad(err)
        })?;
        self.metrics.record_stage_latency(Stage::Vad, started.elapsed());

        let decision = VadDecision::new(
            probability.clamp(0.0, 1.0),
            self.config.vad_threshold,
            timestamp,
        );
        self.metrics.record_vad_decision(decision.is_speech);
        span.record("is_speech", decision.is_speech);
        span.record("probability", decision.probability);
        span.record(
            "total_latency_ms",
            frame_started.elapsed().as_secs_f64() * 1000.0,
        );

        Ok(Classified {
            audio: input,
            decision,
        })
    }

    fn read_session(&self) -> RwLockReadGuard<'_, TurnDetector> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, TurnDetector> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Zero-pad or truncate to `expected` bytes.
fn fit(frame: &Bytes, expected: usize) -> Bytes {
    if frame.len() >= expected {
        return frame.slice(..expected);
    }
    let mut padded = Vec::with_capacity(expected);
    padded.extend_from_slice(frame);
    padded.resize(expected, 0);
    Bytes::from(padded)
}
