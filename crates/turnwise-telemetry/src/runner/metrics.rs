use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::time::Duration;
use turnwise::{MetricsRecorder, Stage, TurnEndReason};

const STAGE_LATENCY_BUCKETS: [f64; 6] = [0.001, 0.005, 0.01, 0.02, 0.05, 0.1];
const TURN_DURATION_BUCKETS: [f64; 7] = [0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0];

struct Instruments {
    vad_latency: Histogram<f64>,
    denoise_latency: Histogram<f64>,
    turn_duration: Histogram<f64>,
    speech_segments_total: Counter<u64>,
    vad_decisions_total: Counter<u64>,
    errors_total: Counter<u64>,
}

impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            vad_latency: meter
                .f64_histogram("turnwise.vad.latency.seconds")
                .with_description("Time spent classifying one frame")
                .with_unit("s")
                .with_boundaries(STAGE_LATENCY_BUCKETS.to_vec())
                .build(),
            denoise_latency: meter
                .f64_histogram("turnwise.denoise.latency.seconds")
                .with_description("Time spent denoising one frame")
                .with_unit("s")
                .with_boundaries(STAGE_LATENCY_BUCKETS.to_vec())
                .build(),
            turn_duration: meter
                .f64_histogram("turnwise.turn.duration.seconds")
                .with_description("Length of completed user turns")
                .with_unit("s")
                .with_boundaries(TURN_DURATION_BUCKETS.to_vec())
                .build(),
            speech_segments_total: meter.u64_counter("turnwise.speech_segments.total").build(),
            vad_decisions_total: meter.u64_counter("turnwise.vad.decisions.total").build(),
            errors_total: meter.u64_counter("turnwise.pipeline.errors.total").build(),
        }
    }
}

/// [`MetricsRecorder`] backed by OpenTelemetry instruments.
pub struct PipelineMeters {
    instruments: Option<Instruments>,
}

impl PipelineMeters {
    pub fn new(provider: &SdkMeterProvider) -> Self {
        Self::from_meter(&provider.meter("turnwise"))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            instruments: Some(Instruments::new(meter)),
        }
    }

    /// Recorder that drops every measurement.
    pub fn disabled() -> Self {
        Self { instruments: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.instruments.is_some()
    }
}

impl std::fmt::Debug for PipelineMeters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMeters")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl MetricsRecorder for PipelineMeters {
    fn record_stage_latency(&self, stage: Stage, elapsed: Duration) {
        let Some(instruments) = &self.instruments else {
            return;
        };
        match stage {
            Stage::Vad => instruments.vad_latency.record(elapsed.as_secs_f64(), &[]),
            Stage::Denoise => instruments
                .denoise_latency
                .record(elapsed.as_secs_f64(), &[]),
            Stage::Input => {}
        }
    }

    fn record_vad_decision(&self, is_speech: bool) {
        if let Some(instruments) = &self.instruments {
            let result = if is_speech { "speech" } else { "silence" };
            instruments
                .vad_decisions_total
                .add(1, &[KeyValue::new("result", result)]);
        }
    }

    fn record_speech_segment(&self) {
        if let Some(instruments) = &self.instruments {
            instruments.speech_segments_total.add(1, &[]);
        }
    }

    fn record_turn(&self, duration: Duration, reason: TurnEndReason) {
        if let Some(instruments) = &self.instruments {
            instruments.turn_duration.record(
                duration.as_secs_f64(),
                &[KeyValue::new("end_reason", reason.as_str())],
            );
        }
    }

    fn record_stage_error(&self, stage: Stage) {
        if let Some(instruments) = &self.instruments {
            instruments
                .errors_total
                .add(1, &[KeyValue::new("stage", stage.as_str())]);
        }
    }
}
