//! Subscriber setup for the binary.
//!
//! Async flows emit `tracing` events; the repository layer uses the `log`
//! macros, which are forwarded into the same subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LogFormat;
use crate::error::ScoutError;

/// `RUST_LOG` wins; otherwise `info` for everything.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), ScoutError> {
    tracing_log::LogTracer::init().map_err(|e| ScoutError::Logging(e.to_string()))?;

    let registry = Registry::default().with(env_filter());
    let result = match format {
        LogFormat::Fmt => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr).with_target(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true),
            ),
        ),
    };
    result.map_err(|e| ScoutError::Logging(e.to_string()))?;

    tracing::debug!(?format, "Logging initialized");
    Ok(())
}
