//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Pick pretty or JSON output from config
//! - Honor `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Initialization is fallible so tests can call it repeatedly

use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}
