//! Logging and optional OpenTelemetry trace export
//!
//! Logs go to stderr through `tracing-subscriber`, so they never mix with
//! the command output and assistant notes on stdout. When an OTLP endpoint
//! is configured, the `apply_fix` / `llm_call` / `tool_call` spans are also
//! exported to it.
//!
//! ```text
//! makeitpass → fmt layer (stderr)
//!            → OTLP (gRPC) → OTel Collector → Tempo / Jaeger
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for a given `-v` count
///
/// `RUST_LOG` takes precedence when set.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,makeitpass=info",
        1 => "info,makeitpass=debug",
        _ => "debug,makeitpass=trace",
    }
}

/// Initialize the tracing subsystem
///
/// This sets up:
/// - Console logging on stderr
/// - OpenTelemetry trace export when `otlp_endpoint` is given
///
/// # Arguments
/// * `service_name` - Name for the service in traces
/// * `verbosity` - Number of `-v` flags
/// * `otlp_endpoint` - Optional OTLP collector URL
pub fn init_tracing(
    service_name: &str,
    verbosity: u8,
    otlp_endpoint: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                    vec![
                        KeyValue::new("service.name", service_name.to_string()),
                        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ],
                )))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    if let Some(endpoint) = otlp_endpoint {
        tracing::info!(
            service = service_name,
            endpoint = endpoint,
            "OpenTelemetry tracing initialized"
        );
    }

    Ok(())
}

/// Flush pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_by_verbosity() {
        assert_eq!(default_filter(0), "warn,makeitpass=info");
        assert_eq!(default_filter(1), "info,makeitpass=debug");
        assert_eq!(default_filter(7), "debug,makeitpass=trace");
    }
}
