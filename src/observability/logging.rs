//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, text format for development
//! - `RUST_LOG` wins when set; otherwise the configured level is used
//! - A bad level is reported on stderr and logging falls back to `info`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

const FALLBACK_LEVEL: &str = "info";

/// Build the filter for `level`. `Err` carries the fallback and the reason.
pub fn build_filter(level: &str) -> Result<EnvFilter, (EnvFilter, String)> {
    EnvFilter::try_new(level).map_err(|e| (EnvFilter::new(FALLBACK_LEVEL), e.to_string()))
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &ObservabilityConfig) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level).unwrap_or_else(|(fallback, reason)| {
            eprintln!("unable to parse level {}: {}", config.log_level, reason);
            fallback
        }),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
