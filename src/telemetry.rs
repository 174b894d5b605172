//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` overrides `config.filter`. Safe to call more than once; later
/// calls are no-ops.
pub fn init(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(false)
        .try_init();
}
