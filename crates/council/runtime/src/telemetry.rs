//! Tracing subscriber setup

use council_types::{GovernanceError, GovernanceResult, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> GovernanceResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| GovernanceError::Config(format!("invalid log filter: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| GovernanceError::Config(e.to_string()))
}
