//! Tracing initialization
//!
//! `RUST_LOG` overrides the default filter. Logs go to stderr so command
//! output on stdout stays parseable. Production deployments use the JSON
//! format.

use docshield_core::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "docshield=debug,info";

#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub log_format: LogFormat,
}

impl TelemetryOptions {
    pub fn new(service_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: environment.into(),
            log_format: LogFormat::Compact,
        }
    }

    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into())
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(options: &TelemetryOptions) -> Result<(), Box<dyn std::error::Error>> {
    let registry = tracing_subscriber::registry().with(env_filter());

    match options.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(
        service.name = %options.service_name,
        service.version = %options.service_version,
        deployment.environment = %options.environment,
        host.name = %hostname,
        log_format = ?options.log_format,
        "Telemetry initialized"
    );
    Ok(())
}

/// Flush hook for process exit. The fmt layer writes synchronously, so there
/// is nothing to drain.
pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
