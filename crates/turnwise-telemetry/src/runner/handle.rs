use super::metrics::PipelineMeters;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Keeps the providers alive and shuts them down gracefully.
pub struct TelemetryHandle {
    pub(crate) tracer_provider: Option<SdkTracerProvider>,
    pub(crate) meter_provider: Option<SdkMeterProvider>,
    pub(crate) meters: Arc<PipelineMeters>,
}

impl TelemetryHandle {
    /// Recorder to hand to `PipelineBuilder::metrics`. Records nothing when metrics are
    /// disabled.
    pub fn meters(&self) -> Arc<PipelineMeters> {
        Arc::clone(&self.meters)
    }

    pub fn meter_provider(&self) -> Option<&SdkMeterProvider> {
        self.meter_provider.as_ref()
    }

    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.tracer_provider.as_ref()
    }

    /// Flush pending spans and metrics and stop exporting.
    pub async fn shutdown(self) {
        const OTEL_TIMEOUT: Duration = Duration::from_secs(2);

        if let Some(tracer_provider) = self.tracer_provider {
            let _ = timeout(
                OTEL_TIMEOUT,
                tokio::task::spawn_blocking(move || {
                    let _ = tracer_provider.force_flush();
                    let _ = tracer_provider.shutdown();
                }),
            )
            .await;
        }

        if let Some(meter_provider) = self.meter_provider {
            let _ = timeout(
                OTEL_TIMEOUT,
                tokio::task::spawn_blocking(move || {
                    let _ = meter_provider.force_flush();
                    let _ = meter_provider.shutdown();
                }),
            )
            .await;
        }
    }
}
