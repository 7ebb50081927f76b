use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: Option<String>,
    pub environment: Option<String>,
    pub exporter: ExporterConfig,
    pub metrics_enabled: bool,
    /// Export pipeline spans over OTLP. Needs an OTLP exporter and the tracing subscriber.
    pub traces_enabled: bool,
    pub install_tracing_subscriber: bool,
    /// How often metrics are pushed to the OTLP endpoint.
    pub export_interval: Duration,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            environment: None,
            exporter: ExporterConfig::default(),
            metrics_enabled: true,
            traces_enabled: true,
            install_tracing_subscriber: true,
            export_interval: Duration::from_secs(60),
        }
    }

    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_otlp(mut self, otlp: OtlpConfig) -> Self {
        self.exporter.otlp = Some(otlp);
        self
    }

    pub fn with_export_interval(mut self, interval: Duration) -> Self {
        self.export_interval = interval;
        self
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("turnwise")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExporterConfig {
    pub otlp: Option<OtlpConfig>,
}

#[derive(Debug, Clone)]
pub struct OtlpConfig {
    /// Collector base URL; `/v1/metrics` or `/v1/traces` is appended unless a signal path is
    /// already present.
    pub endpoint: Option<String>,
    pub protocol: OtlpProtocol,
    pub headers: HashMap<String, String>,
}

impl OtlpConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    pub fn with_protocol(mut self, protocol: OtlpProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            protocol: OtlpProtocol::HttpBinary,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpProtocol {
    HttpBinary,
    HttpJson,
}
