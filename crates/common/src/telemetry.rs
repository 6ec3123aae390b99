use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for telemetry initialization
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
}

/// Initialize tracing for the listener.
///
/// Installs an `EnvFilter` (from `RUST_LOG` when set, otherwise the
/// configured level) and a JSON fmt layer with span context. The
/// embedding agent owns any exporter pipeline beyond stdout.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_span_list(true)
        .with_current_span(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_creation() {
        let config = TelemetryConfig {
            service_name: "lorawan-listener".to_string(),
            log_level: "info".to_string(),
        };

        assert_eq!(config.service_name, "lorawan-listener");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_init_is_idempotent_enough_for_tests() {
        let config = TelemetryConfig {
            service_name: "test".to_string(),
            log_level: "debug".to_string(),
        };

        // First init may succeed or fail depending on test ordering;
        // a second init must not panic either way.
        let _ = init_telemetry(&config);
        let _ = init_telemetry(&config);
    }
}
