//! `tracing` subscriber bootstrap.

use stakeflow_types::{Result, StakeflowError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber, filtered by `RUST_LOG` (default `info`).
///
/// # Errors
/// `Configuration` if a global subscriber is already installed.
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| StakeflowError::Configuration(format!("tracing subscriber: {e}")))
}
