mod error;
mod handle;
mod metrics;

use crate::config::TelemetryConfig;
use crate::exporter::{build_metric_exporter, build_span_exporter, resource_attributes};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::metrics::periodic_reader_with_async_runtime::PeriodicReader;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::trace::span_processor_with_async_runtime::BatchSpanProcessor;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::prelude::*;

pub use error::TelemetryError;
pub use handle::TelemetryHandle;
pub use metrics::PipelineMeters;

const TRACER_NAME: &str = "turnwise";

/// Install logging and build the meter and tracer providers described by `config`.
///
/// Must be called from within a Tokio runtime when an OTLP exporter is configured, since
/// the periodic reader and the span batcher run on it. Per-frame spans are emitted at
/// `debug`; raise the filter (`RUST_LOG=turnwise=debug`) to export them.
pub fn start_telemetry(config: TelemetryConfig) -> Result<TelemetryHandle, TelemetryError> {
    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes(resource_attributes(&config))
        .build();

    let tracer_provider = match &config.exporter.otlp {
        Some(otlp) if config.traces_enabled => {
            let span_exporter = build_span_exporter(otlp)?;
            let processor = BatchSpanProcessor::builder(span_exporter, runtime::Tokio).build();
            Some(
                SdkTracerProvider::builder()
                    .with_resource(resource.clone())
                    .with_span_processor(processor)
                    .build(),
            )
        }
        _ => None,
    };

    if config.install_tracing_subscriber {
        install_subscriber(tracer_provider.as_ref());
    }

    let meter_provider = if config.metrics_enabled {
        let mut builder = SdkMeterProvider::builder().with_resource(resource);
        if let Some(otlp) = &config.exporter.otlp {
            let metric_exporter = build_metric_exporter(otlp)?;
            let reader = PeriodicReader::builder(metric_exporter, runtime::Tokio)
                .with_interval(config.export_interval)
                .build();
            builder = builder.with_reader(reader);
        }
        Some(builder.build())
    } else {
        None
    };

    let meters = match &meter_provider {
        Some(provider) => PipelineMeters::new(provider),
        None => PipelineMeters::disabled(),
    };

    tracing::info!(
        service = %config.service_name,
        metrics = config.metrics_enabled,
        traces = tracer_provider.is_some(),
        otlp = config.exporter.otlp.is_some(),
        "Telemetry started"
    );

    Ok(TelemetryHandle {
        tracer_provider,
        meter_provider,
        meters: Arc::new(meters),
    })
}

// `log` records from the pipeline reach this subscriber through the tracing-log bridge
// that `try_init` installs.
fn install_subscriber(tracer_provider: Option<&SdkTracerProvider>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let otel_layer = tracer_provider.map(|provider| {
        tracing_opentelemetry::layer()
            .with_tracer(provider.tracer(TRACER_NAME))
            .with_filter(filter.clone())
    });
    let subscriber = tracing_subscriber::Registry::default()
        .with(otel_layer)
        .with(tracing_subscriber::fmt::layer().with_filter(filter));
    if subscriber.try_init().is_err() {
        eprintln!("[turnwise-telemetry] tracing subscriber already set; keeping the existing one");
    }
}
