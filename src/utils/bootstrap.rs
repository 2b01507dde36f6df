//! Bootstrap utilities for services embedding the guild store.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the GUILDS_LOG environment variable.
///
/// Defaults to "info" level if GUILDS_LOG is not set. Returns false if a
/// global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
