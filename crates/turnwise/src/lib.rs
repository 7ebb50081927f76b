//! # Turnwise
//!
//! Real-time turn detection for voice agents.
//!
//! A [`Pipeline`] takes fixed-size frames of 16-bit little-endian PCM, optionally denoises
//! them, classifies each one as speech or silence, and runs a turn-taking state machine
//! that decides when the user has finished speaking. Each finished utterance is delivered
//! as a [`TurnEvent`] carrying its audio and timing.
//!
//! ## Components
//!
//! - [`vad`]: the [`VadDetector`] trait, the built-in energy detector and, with the
//!   `silero` feature, the Silero ONNX model.
//! - [`denoise`]: the [`Denoiser`] trait, a passthrough and a high-pass noise gate.
//! - [`turn`]: the [`TurnDetector`] state machine.
//! - [`pipeline`]: the orchestrator that ties them together, with single-stream
//!   enforcement and cancellation through [`StreamContext`].
//! - [`metrics`]: the [`MetricsRecorder`] port. `turnwise-telemetry` provides an
//!   OpenTelemetry implementation.
//!
//! ## Features
//!
//! - `silero`: Silero VAD via ONNX Runtime.
//! - `model-hf`: resolve model files from the HuggingFace Hub.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use turnwise::{AudioFrame, Pipeline, PipelineConfig, StreamContext, TurnEvent};
//! use tokio::sync::mpsc;
//!
//! async fn run(frames: Vec<AudioFrame>) -> Result<(), turnwise::PipelineError> {
//!     let config = PipelineConfig::default().with_silence_duration(Duration::from_millis(700));
//!     let pipeline = Pipeline::new(config)?;
//!     let (tx, mut rx) = mpsc::channel::<TurnEvent>(8);
//!
//!     let consumer = tokio::spawn(async move {
//!         while let Some(turn) = rx.recv().await {
//!             println!("turn of {:?} ended by {}", turn.duration, turn.reason);
//!         }
//!     });
//!
//!     let ctx = StreamContext::new().with_timeout(Duration::from_secs(60));
//!     pipeline
//!         .process_stream(&ctx, futures::stream::iter(frames), tx)
//!         .await?;
//!     let _ = consumer.await;
//!     pipeline.close()
//! }
//! ```

pub mod config;
pub mod denoise;
pub mod error;
pub mod metrics;
pub mod pcm;
pub mod pipeline;
pub mod turn;
mod types;
pub mod vad;

pub use config::{FrameLengthPolicy, PipelineConfig, TimestampMode, TrailingSilence};
pub use denoise::{DenoiseError, DenoiseResult, Denoiser, NoiseGate, NoiseGateConfig, Passthrough};
pub use error::{ConfigError, PipelineError, PipelineResult, StageError, StageFailure};
pub use metrics::{MetricsRecorder, MetricsSnapshot, NoopMetrics, RecordingMetrics, Stage};
pub use pipeline::{Pipeline, PipelineBuilder, StreamContext};
pub use turn::{FrameOutcome, SessionState, TurnDetector};
pub use types::{AudioFrame, TurnEndReason, TurnEvent, VadDecision};
pub use vad::{EnergyVad, EnergyVadConfig, VadDetector, VadError, VadResult, VadSession};

#[cfg(feature = "silero")]
pub use vad::{ModelSource, ModelSourceError, SileroVad};
