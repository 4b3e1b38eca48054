use opentelemetry::global;
use opentelemetry::trace::TraceError;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_JAEGER_AGENT: &str = "localhost:6831";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install Jaeger pipeline: {0}")]
    Jaeger(#[from] TraceError),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub jaeger_endpoint: Option<String>,
    pub enable_jaeger: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "order-service".to_string(),
            log_level: "info".to_string(),
            jaeger_endpoint: None,
            enable_jaeger: false,
        }
    }
}

impl TelemetryConfig {
    /// Read `RUST_LOG`, `ENABLE_JAEGER` and `JAEGER_ENDPOINT` for the given service.
    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enable_jaeger = lookup("ENABLE_JAEGER")
            .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        Self {
            service_name: service_name.to_string(),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            jaeger_endpoint: lookup("JAEGER_ENDPOINT").filter(|endpoint| !endpoint.is_empty()),
            enable_jaeger,
        }
    }

    /// Jaeger agent address, when export is enabled.
    fn jaeger_agent(&self) -> Option<&str> {
        self.enable_jaeger
            .then(|| self.jaeger_endpoint.as_deref().unwrap_or(DEFAULT_JAEGER_AGENT))
    }
}

/// Install the global subscriber: `EnvFilter` (falling back to the configured
/// level), JSON log lines, and Jaeger export when enabled.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let json_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .json();

    let jaeger_layer = match config.jaeger_agent() {
        Some(agent) => {
            let tracer = opentelemetry_jaeger::new_agent_pipeline()
                .with_service_name(&config.service_name)
                .with_endpoint(agent)
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };
    let jaeger = jaeger_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(jaeger_layer)
        .try_init()?;

    tracing::info!(service = %config.service_name, jaeger, "Telemetry initialized");
    Ok(())
}

/// Plain JSON logging for short-lived tools. A subscriber that is already
/// installed is left in place.
pub fn init_basic_telemetry(service_name: &str, log_level: &str) {
    let config = TelemetryConfig {
        service_name: service_name.to_string(),
        log_level: log_level.to_string(),
        ..Default::default()
    };

    let _ = init_telemetry(config);
}

/// Flush pending spans
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "order-service");
        assert_eq!(config.log_level, "info");
        assert!(config.jaeger_agent().is_none());
    }

    #[test]
    fn test_jaeger_agent_defaults_when_enabled() {
        let config = TelemetryConfig::from_lookup("order-service", lookup(&[("ENABLE_JAEGER", "true")]));
        assert_eq!(config.jaeger_agent(), Some(DEFAULT_JAEGER_AGENT));

        let config = TelemetryConfig::from_lookup(
            "order-service",
            lookup(&[("ENABLE_JAEGER", "1"), ("JAEGER_ENDPOINT", "jaeger:6831")]),
        );
        assert_eq!(config.jaeger_agent(), Some("jaeger:6831"));
    }

    #[test]
    fn test_jaeger_disabled_ignores_endpoint() {
        let config = TelemetryConfig::from_lookup(
            "order-publisher",
            lookup(&[("ENABLE_JAEGER", "nope"), ("JAEGER_ENDPOINT", "jaeger:6831"), ("RUST_LOG", "debug")]),
        );
        assert_eq!(config.service_name, "order-publisher");
        assert_eq!(config.log_level, "debug");
        assert!(config.jaeger_agent().is_none());
    }

    #[test]
    fn test_init_basic_telemetry() {
        // A second global subscriber is rejected, which must not panic
        init_basic_telemetry("order-publisher", "debug");
        init_basic_telemetry("order-publisher", "debug");
    }
}
