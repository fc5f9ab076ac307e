#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Telemetry for the canopy gateway
//!
//! Structured logging is always on via the `tracing` ecosystem. When
//! telemetry is enabled, an OpenTelemetry meter provider backed by a
//! Prometheus registry is installed so the server can expose `/metrics`.

pub mod metrics;

pub use metrics::{ToolCallMetrics, ToolCallOutcome};

use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;

/// Guard that ensures proper cleanup of telemetry resources on drop
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
    registry: Option<prometheus::Registry>,
}

impl TelemetryGuard {
    /// The Prometheus registry backing the meter provider, when enabled
    pub fn registry(&self) -> Option<prometheus::Registry> {
        self.registry.clone()
    }

    /// Force flush all pending metrics immediately
    pub fn force_flush(&self) -> anyhow::Result<()> {
        if let Some(ref provider) = self.meter_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush metrics: {e}"))?;
        }
        Ok(())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to shutdown meter provider: {e}");
            }
        }
    }
}

/// Initialize logging and, optionally, metric export
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init(otel_enabled: bool, log_filter: &str) -> anyhow::Result<TelemetryGuard> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();

    if !otel_enabled {
        return Ok(TelemetryGuard {
            meter_provider: None,
            registry: None,
        });
    }

    let registry = prometheus::Registry::new();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build prometheus exporter: {e}"))?;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name("canopy")
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(exporter)
        .build();
    global::set_meter_provider(provider.clone());

    tracing::info!("telemetry enabled, metrics exposed in prometheus format");

    Ok(TelemetryGuard {
        meter_provider: Some(provider),
        registry: Some(registry),
    })
}

/// Render the registry contents in the Prometheus text exposition format
pub fn encode_prometheus(registry: &prometheus::Registry) -> anyhow::Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| anyhow::anyhow!("failed to encode metrics: {e}"))?;
    Ok(String::from_utf8(buffer)?)
}
