//! Structured logging setup.
//!
//! A thin wrapper around `tracing-subscriber`'s JSON formatter, configured by
//! a single filter directive string (the same one the rest of the config
//! layer assembles from defaults, environment and CLI flags).

use eyre::WrapErr as _;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `filter_directives` is a standard `tracing-subscriber` filter string (for
/// example `"info"` or `"rct_merkle_forest=debug,tower_http=info"`); an
/// invalid directive falls back to `"info"` rather than failing startup.
///
/// # Errors
/// Returns an error if a global subscriber has already been installed.
pub fn init(filter_directives: &str) -> eyre::Result<()> {
    let filter = EnvFilter::try_new(filter_directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| eyre::eyre!(err))
        .wrap_err("failed to install the global tracing subscriber")
}
