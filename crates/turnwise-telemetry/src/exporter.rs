use crate::config::{OtlpConfig, OtlpProtocol, TelemetryConfig};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{
    ExporterBuildError, MetricExporter, SpanExporter, WithExportConfig, WithHttpConfig,
};
use opentelemetry_sdk::metrics::Temporality;

const METRICS_PATH: &str = "/v1/metrics";
const TRACES_PATH: &str = "/v1/traces";

pub(crate) fn build_metric_exporter(
    config: &OtlpConfig,
) -> Result<MetricExporter, ExporterBuildError> {
    let builder = MetricExporter::builder()
        .with_http()
        .with_temporality(Temporality::default());
    with_otlp_config(builder, config, METRICS_PATH).build()
}

pub(crate) fn build_span_exporter(
    config: &OtlpConfig,
) -> Result<SpanExporter, ExporterBuildError> {
    let builder = SpanExporter::builder().with_http();
    with_otlp_config(builder, config, TRACES_PATH).build()
}

fn with_otlp_config<B>(builder: B, config: &OtlpConfig, signal_path: &str) -> B
where
    B: WithExportConfig + WithHttpConfig,
{
    let mut builder = builder.with_protocol(match config.protocol {
        OtlpProtocol::HttpBinary => opentelemetry_otlp::Protocol::HttpBinary,
        OtlpProtocol::HttpJson => opentelemetry_otlp::Protocol::HttpJson,
    });
    if let Some(endpoint) = resolve_endpoint(config, signal_path) {
        builder = builder.with_endpoint(endpoint);
    }
    if !config.headers.is_empty() {
        builder = builder.with_headers(config.headers.clone());
    }
    builder
}

/// Point the configured endpoint at `signal_path`, replacing any signal path already on it.
fn resolve_endpoint(config: &OtlpConfig, signal_path: &str) -> Option<String> {
    config.endpoint.as_ref().map(|endpoint| {
        let base = endpoint.trim_end_matches('/');
        let base = [METRICS_PATH, TRACES_PATH]
            .iter()
            .find_map(|path| base.strip_suffix(path))
            .unwrap_or(base);
        format!("{base}{signal_path}")
    })
}

pub(crate) fn resource_attributes(config: &TelemetryConfig) -> Vec<KeyValue> {
    let mut attributes = Vec::new();

    if let Some(version) = &config.service_version {
        attributes.push(KeyValue::new("service.version", version.clone()));
    }

    if let Some(environment) = &config.environment {
        attributes.push(KeyValue::new("deployment.environment", environment.clone()));
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_signal_path_to_base_endpoint() {
        let config = OtlpConfig::new("http://collector:4318/");
        assert_eq!(
            resolve_endpoint(&config, METRICS_PATH).as_deref(),
            Some("http://collector:4318/v1/metrics")
        );
        assert_eq!(
            resolve_endpoint(&config, TRACES_PATH).as_deref(),
            Some("http://collector:4318/v1/traces")
        );
    }

    #[test]
    fn replaces_explicit_signal_path() {
        let config = OtlpConfig::new("https://otel.example.com/v1/metrics");
        assert_eq!(
            resolve_endpoint(&config, METRICS_PATH).as_deref(),
            Some("https://otel.example.com/v1/metrics")
        );
        assert_eq!(
            resolve_endpoint(&config, TRACES_PATH).as_deref(),
            Some("https://otel.example.com/v1/traces")
        );
        assert!(resolve_endpoint(&OtlpConfig::default(), METRICS_PATH).is_none());
    }

    #[test]
    fn builds_json_exporters_with_headers() {
        let config = OtlpConfig::new("http://localhost:4318")
            .with_protocol(OtlpProtocol::HttpJson)
            .with_header("authorization", "Bearer test");
        assert!(build_metric_exporter(&config).is_ok());
        assert!(build_span_exporter(&config).is_ok());
    }

    #[test]
    fn resource_attributes_include_optional_fields() {
        let config = TelemetryConfig::new("voice-gateway")
            .with_service_version("1.4.0")
            .with_environment("staging");
        let keys: Vec<_> = resource_attributes(&config)
            .into_iter()
            .map(|kv| kv.key.to_string())
            .collect();
        assert_eq!(keys, vec!["service.version", "deployment.environment"]);
    }
}
