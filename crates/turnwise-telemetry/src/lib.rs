//! OpenTelemetry wiring for `turnwise` pipelines.
//!
//! [`start_telemetry`] installs a `tracing` subscriber (which also receives the pipeline's
//! `log` records) and builds a meter provider, optionally exporting metrics and the
//! pipeline's spans over OTLP/HTTP. The
//! returned [`TelemetryHandle`] hands out [`PipelineMeters`], a
//! [`turnwise::MetricsRecorder`] to pass to `PipelineBuilder::metrics`.

mod config;
mod exporter;
mod runner;

pub use config::{ExporterConfig, OtlpConfig, OtlpProtocol, TelemetryConfig};
pub use runner::{PipelineMeters, TelemetryError, TelemetryHandle, start_telemetry};
