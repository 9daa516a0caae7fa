//! Tracing setup for the notification server.
//!
//! The log filter comes from `RUST_LOG` and defaults to
//! `info,waddle_notify=debug,waddle_notify_server=debug`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const DEFAULT_FILTER: &str = "info,waddle_notify=debug,waddle_notify_server=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize tracing in the requested output format.
pub fn init_with_format(format: LogFormat) -> InitResult {
    match format {
        LogFormat::Compact => init(),
        LogFormat::Pretty => init_local(),
        LogFormat::Json => init_json(),
    }
}

/// Initialize compact console logging.
pub fn init() -> InitResult {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("Telemetry initialized");
    Ok(())
}

/// Initialize telemetry for local development.
///
/// Multi-line, colored output.
pub fn init_local() -> InitResult {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("Local telemetry initialized");
    Ok(())
}

/// Initialize JSON logging for log collectors.
pub fn init_json() -> InitResult {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .json()
        .with_current_span(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("JSON telemetry initialized");
    Ok(())
}

/// Flush and shut down telemetry.
pub fn shutdown() {
    tracing::info!("Telemetry shutdown complete");
}
